//! The twin connector.
//!
//! Every managed container is mirrored as a `Container:<id>` feature of the root thing, with
//! `name` and `state` properties. The mirror is filled once per connection by the client's init
//! hook and kept current from the container event bus.

use std::sync::Arc;

use async_trait::async_trait;
use edgebox_core::{
    config::ThingsConfig,
    container::{Container, ContainerManager},
    events::{ContainerEvent, ContainerEventKind, EventsManager},
    registry::TwinConnector,
};
use edgebox_twin::{
    client::{ClientConfiguration, InitHook, RumqttConnection, TwinClient},
    model::{Feature, Thing},
    TwinResult,
};
use futures::FutureExt;
use serde_json::json;
use tokio::sync::{broadcast::error::RecvError, Mutex};
use tokio_util::sync::CancellationToken;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Prefix of the feature ids mirroring containers.
pub const CONTAINER_FEATURE_PREFIX: &str = "Container:";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Connects the daemon to its remote twin and mirrors its containers there.
pub struct TwinManager {
    config: ClientConfiguration,
    containers: Option<Arc<dyn ContainerManager>>,
    events: Option<Arc<EventsManager>>,
    session: Mutex<Option<Session>>,
}

struct Session {
    client: Arc<TwinClient>,
    cancel: CancellationToken,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl TwinManager {
    /// Creates a disconnected manager.
    pub fn new(config: ClientConfiguration) -> Self {
        Self {
            config,
            containers: None,
            events: None,
            session: Mutex::new(None),
        }
    }

    /// Mirrors the containers of `containers`.
    pub fn with_containers(mut self, containers: Arc<dyn ContainerManager>) -> Self {
        self.containers = Some(containers);
        self
    }

    /// Follows container changes on `events`.
    pub fn with_events(mut self, events: Arc<EventsManager>) -> Self {
        self.events = Some(events);
        self
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfiguration {
        &self.config
    }

    /// The client of the current session.
    pub async fn client(&self) -> Option<Arc<TwinClient>> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|session| session.client.clone())
    }

    fn init_hook(&self) -> InitHook {
        let containers = self.containers.clone();
        Arc::new(move |root: Arc<Thing>| {
            let containers = containers.clone();
            async move {
                if let Some(containers) = containers {
                    mirror_containers(&root, &containers.list().await).await?;
                }
                Ok::<(), anyhow::Error>(())
            }
            .boxed()
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl TwinConnector for TwinManager {
    async fn connect(&self) -> anyhow::Result<()> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            tracing::debug!("twin connection already established");
            return Ok(());
        }

        let (connection, events) = RumqttConnection::connect(&self.config)?;
        let client = Arc::new(
            TwinClient::new(self.config.clone(), connection).with_init_hook(self.init_hook()),
        );
        let cancel = CancellationToken::new();

        tokio::spawn(client.clone().run(events, cancel.clone()));

        if let Some(bus) = &self.events {
            tokio::spawn(follow_events(
                client.clone(),
                bus.clone(),
                self.containers.clone(),
                cancel.clone(),
            ));
        }

        tracing::info!("connecting to twin broker {}", self.config.broker_url);
        *session = Some(Session { client, cancel });
        Ok(())
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        let Some(session) = self.session.lock().await.take() else {
            return Ok(());
        };

        session.cancel.cancel();
        session.client.disconnect().await?;
        tracing::info!("disconnected from twin broker {}", self.config.broker_url);
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Maps the daemon's things settings onto the client configuration.
pub fn client_configuration(config: &ThingsConfig) -> ClientConfiguration {
    ClientConfiguration {
        broker_url: config.conn_broker_url.clone(),
        client_id: config.conn_client_id.clone(),
        device_name: config.conn_device_name.clone(),
        username: config.conn_username.clone(),
        password: config.conn_password.clone(),
        root_ca: config.conn_root_ca.clone(),
        client_cert: config.conn_client_cert.clone(),
        client_key: config.conn_client_key.clone(),
        keep_alive: config.keep_alive(),
        disconnect_timeout: config.disconnect_timeout(),
        connect_timeout: config.connect_timeout(),
        acknowledge_timeout: config.acknowledge_timeout(),
        subscribe_timeout: config.subscribe_timeout(),
        unsubscribe_timeout: config.unsubscribe_timeout(),
    }
}

/// The feature mirroring `container`.
pub fn container_feature(container: &Container) -> Feature {
    Feature::new(container_feature_id(&container.id))
        .with_property("name", json!(container.name))
        .with_property("state", json!(container.state.status))
}

/// The id of the feature mirroring the container `id`.
pub fn container_feature_id(id: &str) -> String {
    format!("{CONTAINER_FEATURE_PREFIX}{id}")
}

/// Writes one feature per container to `root` and removes features of containers that are gone.
pub async fn mirror_containers(root: &Thing, containers: &[Container]) -> TwinResult<()> {
    for feature in root.features() {
        let Some(id) = feature.id.strip_prefix(CONTAINER_FEATURE_PREFIX) else {
            continue;
        };
        if !containers.iter().any(|container| container.id == id) {
            root.remove_feature(&feature.id).await?;
        }
    }

    for container in containers {
        root.set_feature(container_feature(container)).await?;
    }
    Ok(())
}

/// Applies one container event to the mirror on `root`.
pub async fn mirror_event(root: &Thing, event: &ContainerEvent) -> TwinResult<()> {
    match event.kind {
        ContainerEventKind::Removed => {
            let id = container_feature_id(&event.container.id);
            if root.feature(&id).is_some() {
                root.remove_feature(&id).await?;
            }
            Ok(())
        }
        _ => root.set_feature(container_feature(&event.container)).await,
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn follow_events(
    client: Arc<TwinClient>,
    bus: Arc<EventsManager>,
    containers: Option<Arc<dyn ContainerManager>>,
    cancel: CancellationToken,
) {
    let mut events = bus.subscribe();
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = events.recv() => received,
        };

        // Until the handshake completes the init hook covers every change.
        let Some(root) = client.root_thing().await else {
            continue;
        };

        let result = match received {
            Ok(event) => mirror_event(&root, &event).await,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("container mirror lagged by {} events, resyncing", skipped);
                match &containers {
                    Some(containers) => mirror_containers(&root, &containers.list().await).await,
                    None => Ok(()),
                }
            }
            Err(RecvError::Closed) => break,
        };

        if let Err(e) = result {
            tracing::warn!("failed to update container mirror: {}", e);
        }
    }
    tracing::debug!("container mirror stopped");
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use edgebox_core::container::ContainerStatus;
    use edgebox_twin::model::NamespacedId;

    use super::*;

    fn container(id: &str, status: ContainerStatus) -> Container {
        let mut container = Container::new(id, format!("{id}-name"));
        container.state.status = status;
        container
    }

    fn root() -> Thing {
        Thing::new(NamespacedId::new("gw", "edge:containers"))
    }

    #[test]
    fn test_things_config_maps_to_client_configuration() -> anyhow::Result<()> {
        let things = ThingsConfig {
            conn_broker_url: "ssl://broker:8883".to_string(),
            conn_device_name: "edge:box".to_string(),
            conn_connect_timeout: 5000,
            ..ThingsConfig::default()
        };

        let config = client_configuration(&things);
        assert_eq!(config.broker_url, "ssl://broker:8883");
        assert_eq!(config.device_name, "edge:box");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert!(config.is_secure()?);
        Ok(())
    }

    #[test]
    fn test_container_feature_carries_name_and_state() {
        let feature = container_feature(&container("c1", ContainerStatus::Running));
        assert_eq!(feature.id, "Container:c1");
        assert_eq!(feature.property("name"), Some(&json!("c1-name")));
        assert_eq!(feature.property("state"), Some(&json!("running")));
    }

    #[test_log::test(tokio::test)]
    async fn test_mirror_follows_container_lifecycle() -> anyhow::Result<()> {
        let root = root();

        let created = container("c1", ContainerStatus::Created);
        mirror_event(&root, &ContainerEvent::new(ContainerEventKind::Created, created)).await?;
        let started = container("c1", ContainerStatus::Running);
        let event = ContainerEvent::new(ContainerEventKind::Started, started.clone());
        mirror_event(&root, &event).await?;

        let feature = root.feature("Container:c1").expect("feature is mirrored");
        assert_eq!(feature.property("state"), Some(&json!("running")));

        mirror_event(&root, &ContainerEvent::new(ContainerEventKind::Removed, started)).await?;
        assert!(root.feature("Container:c1").is_none());

        // Removing an unknown container is a no-op.
        let unknown = container("c2", ContainerStatus::Stopped);
        mirror_event(&root, &ContainerEvent::new(ContainerEventKind::Removed, unknown)).await?;
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_mirror_containers_replaces_stale_features() -> anyhow::Result<()> {
        let root = root()
            .with_feature(Feature::new("Container:gone"))
            .with_feature(Feature::new("Other"));

        mirror_containers(
            &root,
            &[
                container("a", ContainerStatus::Running),
                container("b", ContainerStatus::Exited),
            ],
        )
        .await?;

        let mut ids: Vec<String> = root.features().into_iter().map(|f| f.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["Container:a", "Container:b", "Other"]);
        Ok(())
    }
}
