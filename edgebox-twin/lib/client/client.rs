use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::{
    model::{ChangeKind, NamespacedId, Publisher, Thing, ThingRegistry},
    protocol::{outbox_path_of, Envelope, Headers, PathKind, ThingError, Topic},
    TwinError, TwinResult,
};

use super::{
    command_subscription, ClientConfiguration, CommandTopic, MqttConnection, MqttEvent, QoS,
    Route, Routes, TOPIC_BOOTSTRAP_REQUEST, TOPIC_BOOTSTRAP_RESPONSE,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Called with the root thing after the first handshake of every connection.
pub type InitHook = Arc<dyn Fn(Arc<Thing>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// The gateway identity returned by the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// The gateway device id, `namespace:name`.
    pub device_id: String,

    /// The tenant.
    pub tenant_id: String,

    /// The policy applied to things of this device.
    #[serde(default)]
    pub policy_id: String,
}

/// Connects the local thing registry to the twin.
pub struct TwinClient {
    config: ClientConfiguration,
    connection: Arc<dyn MqttConnection>,
    registry: Arc<ThingRegistry>,
    identity: Mutex<Identity>,
    routes: RwLock<Routes>,
    init_hook: Option<InitHook>,
}

#[derive(Default)]
struct Identity {
    device: Option<DeviceInfo>,
    root: Option<Arc<Thing>>,
    command_filter: Option<String>,
    epoch: u64,
    notified_epoch: Option<u64>,
}

/// Publishes the local changes of a thing on the device's event topic.
struct EventPublisher {
    connection: Arc<dyn MqttConnection>,
    topic: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl TwinClient {
    /// Creates a client over an established connection.
    pub fn new(config: ClientConfiguration, connection: Arc<dyn MqttConnection>) -> Self {
        Self {
            config,
            connection,
            registry: Arc::new(ThingRegistry::new()),
            identity: Mutex::new(Identity::default()),
            routes: RwLock::new(Routes::new()),
            init_hook: None,
        }
    }

    /// Uses `registry` instead of a private one.
    pub fn with_registry(mut self, registry: Arc<ThingRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the hook run after the first handshake of every connection.
    pub fn with_init_hook(mut self, hook: InitHook) -> Self {
        self.init_hook = Some(hook);
        self
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfiguration {
        &self.config
    }

    /// The thing registry.
    pub fn registry(&self) -> &Arc<ThingRegistry> {
        &self.registry
    }

    /// The gateway identity, once the handshake completed.
    pub async fn device(&self) -> Option<DeviceInfo> {
        self.identity.lock().await.device.clone()
    }

    /// The root thing, once the handshake completed.
    pub async fn root_thing(&self) -> Option<Arc<Thing>> {
        self.identity.lock().await.root.clone()
    }

    /// Dispatches connection events until the stream ends or `cancel` fires.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<MqttEvent>, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle(event).await;
        }
        tracing::debug!("twin client dispatch stopped");
    }

    /// Handles one connection event.
    pub async fn handle(&self, event: MqttEvent) {
        match event {
            MqttEvent::Connected => {
                if let Err(e) = self.on_connected().await {
                    tracing::error!("failed to request gateway identity: {e}");
                }
            }
            MqttEvent::Message { topic, payload } => self.on_message(&topic, &payload).await,
            MqttEvent::Disconnected => tracing::info!("twin connection lost, waiting for reconnect"),
        }
    }

    /// Publishes telemetry of the root thing at QoS 1.
    pub async fn send_telemetry(&self, envelope: &Envelope) -> TwinResult<()> {
        self.send_device_message("t", envelope).await
    }

    /// Publishes an event of the root thing at QoS 1.
    pub async fn send_event(&self, envelope: &Envelope) -> TwinResult<()> {
        self.send_device_message("e", envelope).await
    }

    /// Closes the connection.
    pub async fn disconnect(&self) -> TwinResult<()> {
        self.connection.disconnect().await
    }

    async fn on_connected(&self) -> TwinResult<()> {
        let mut identity = self.identity.lock().await;
        identity.device = None;
        identity.epoch += 1;

        self.connection
            .subscribe(TOPIC_BOOTSTRAP_RESPONSE, QoS::AtLeastOnce)
            .await?;
        self.connection
            .publish(TOPIC_BOOTSTRAP_REQUEST, QoS::AtLeastOnce, Vec::new())
            .await?;

        tracing::debug!("requested gateway identity (epoch {})", identity.epoch);
        Ok(())
    }

    async fn on_message(&self, topic: &str, payload: &[u8]) {
        let route = self
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .resolve(topic)
            .cloned();

        let result = match route {
            Some(Route::Bootstrap) => self.on_bootstrap(payload).await,
            Some(Route::Event(kind)) => self.on_event(kind, payload).await,
            Some(Route::ErrorsResponse) => {
                tracing::warn!(
                    "twin reported an error: {}",
                    String::from_utf8_lossy(payload)
                );
                Ok(())
            }
            Some(Route::Command) => self.on_command(topic, payload).await,
            None => {
                tracing::debug!("ignoring message on {topic}");
                Ok(())
            }
        };

        if let Err(e) = result {
            tracing::warn!("failed to handle message on {topic}: {e}");
        }
    }

    async fn on_bootstrap(&self, payload: &[u8]) -> TwinResult<()> {
        let device: DeviceInfo = serde_json::from_slice(payload)?;
        let root_id: NamespacedId =
            format!("{}:{}", device.device_id, self.config.device_name).parse()?;

        let mut identity = self.identity.lock().await;
        let filter = command_subscription(&root_id.to_string());

        if let Some(old) = identity.command_filter.take() {
            if old != filter {
                tracing::info!("gateway identity changed, dropping {old}");
                if let Err(e) = self.connection.unsubscribe(&old).await {
                    tracing::warn!("failed to unsubscribe {old}: {e}");
                }
                self.routes
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove_prefixed(old.trim_end_matches('#'));
            }
        }

        let root = match self.registry.get(&root_id) {
            Some(root) => root,
            None => {
                let mut thing = Thing::new(root_id.clone());
                match device.policy_id.parse::<NamespacedId>() {
                    Ok(policy_id) => thing = thing.with_policy_id(policy_id),
                    Err(_) => tracing::warn!("ignoring invalid policy id {:?}", device.policy_id),
                }
                self.registry.add(thing)
            }
        };
        root.set_publisher(Arc::new(EventPublisher {
            connection: self.connection.clone(),
            topic: format!("e/{}/{}", device.tenant_id, root_id),
        }));

        {
            let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
            routes.remove_prefixed(filter.trim_end_matches('#'));
            routes.add_thing(&root_id.to_string());
        }
        self.connection.subscribe(&filter, QoS::AtLeastOnce).await?;

        tracing::info!("twin handshake complete for {root_id} (tenant {})", device.tenant_id);
        identity.device = Some(device);
        identity.root = Some(root.clone());
        identity.command_filter = Some(filter);

        let notify = identity.notified_epoch != Some(identity.epoch);
        identity.notified_epoch = Some(identity.epoch);
        drop(identity);

        if let (true, Some(hook)) = (notify, &self.init_hook) {
            match tokio::time::timeout(self.config.connect_timeout, hook(root)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("twin init hook failed: {e}"),
                Err(_) => tracing::warn!(
                    "twin init hook did not finish within {:?}",
                    self.config.connect_timeout
                ),
            }
        }

        Ok(())
    }

    async fn on_event(&self, kind: ChangeKind, payload: &[u8]) -> TwinResult<()> {
        let envelope: Envelope = serde_json::from_slice(payload)?;
        let topic: Topic = envelope.topic.parse()?;

        tracing::trace!("twin event {kind:?} on {}{}", envelope.topic, envelope.path);
        self.registry
            .apply_event(&topic.thing_id(), kind, &envelope.path, envelope.value)
            .await
    }

    async fn on_command(&self, topic: &str, payload: &[u8]) -> TwinResult<()> {
        let command = CommandTopic::parse(topic)
            .ok_or_else(|| TwinError::InvalidTopic(topic.to_string()))?;

        let request: Envelope = match serde_json::from_slice(payload) {
            Ok(request) => request,
            Err(e) => {
                if !command.request_id.is_empty() {
                    let error = ThingError::parameter_invalid(format!("invalid envelope: {e}"));
                    self.respond_error(&command, &Envelope::default(), error).await?;
                }
                return Ok(());
            }
        };

        let one_way = command.request_id.is_empty() || !request.headers.response_required();
        match self.dispatch(&request).await {
            _ if one_way => Ok(()),
            Ok(body) => self.respond(&command, &request, body).await,
            Err(error) => self.respond_error(&command, &request, error).await,
        }
    }

    async fn dispatch(&self, request: &Envelope) -> Result<Option<Value>, ThingError> {
        request.validate()?;

        let topic: Topic = request
            .topic
            .parse()
            .map_err(|_| ThingError::parameter_invalid(format!("invalid topic {}", request.topic)))?;
        let thing_id = topic.thing_id();
        let thing = self
            .registry
            .get(&thing_id)
            .ok_or_else(|| ThingError::subject_not_found(format!("thing {thing_id} not found")))?;

        let (feature, subject) = match PathKind::parse(&request.path) {
            Some(PathKind::Message {
                feature,
                inbox: true,
                subject,
            }) => (feature, subject),
            _ => {
                return Err(ThingError::parameter_invalid(format!(
                    "invalid path {}",
                    request.path
                )))
            }
        };

        let handler = match &feature {
            Some(feature) => {
                if thing.feature(feature).is_none() {
                    return Err(ThingError::subject_not_found(format!(
                        "feature {feature} of thing {thing_id} not found"
                    )));
                }
                thing.feature_operations_handler(feature)
            }
            None => thing.operations_handler(),
        }
        .ok_or_else(|| {
            ThingError::subject_not_found(format!("no operations handler for {subject}"))
        })?;

        tracing::debug!("invoking operation {subject} on {thing_id}");
        handler(subject, request.value.clone())
            .await
            .map_err(into_thing_error)
    }

    async fn respond(
        &self,
        command: &CommandTopic,
        request: &Envelope,
        body: Option<Value>,
    ) -> TwinResult<()> {
        let status = if body.is_some() { 200 } else { 204 };
        self.publish_response(command, request, status, body).await
    }

    async fn respond_error(
        &self,
        command: &CommandTopic,
        request: &Envelope,
        error: ThingError,
    ) -> TwinResult<()> {
        tracing::debug!("answering {} with {error}", command.request_id);
        let status = error.status;
        self.publish_response(command, request, status, Some(serde_json::to_value(&error)?))
            .await
    }

    async fn publish_response(
        &self,
        command: &CommandTopic,
        request: &Envelope,
        status: u16,
        body: Option<Value>,
    ) -> TwinResult<()> {
        let mut headers = Headers::new();
        if let Some(correlation_id) = request.headers.correlation_id() {
            headers = headers.with_correlation_id(correlation_id);
        }

        let mut response =
            Envelope::new(&*request.topic, headers, outbox_path_of(&request.path)).with_status(status);
        if let Some(body) = body {
            response = response.with_value(body);
        }

        self.connection
            .publish(
                &command.response_topic(status),
                QoS::AtLeastOnce,
                serde_json::to_vec(&response)?,
            )
            .await
    }

    async fn send_device_message(&self, kind: &str, envelope: &Envelope) -> TwinResult<()> {
        let topic = {
            let identity = self.identity.lock().await;
            match (&identity.device, &identity.root) {
                (Some(device), Some(root)) => format!("{kind}/{}/{}", device.tenant_id, root.id()),
                _ => return Err(TwinError::NotBootstrapped),
            }
        };

        self.connection
            .publish(&topic, QoS::AtLeastOnce, serde_json::to_vec(envelope)?)
            .await
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl Publisher for EventPublisher {
    async fn publish(&self, envelope: Envelope) -> TwinResult<()> {
        self.connection
            .publish(&self.topic, QoS::AtLeastOnce, serde_json::to_vec(&envelope)?)
            .await
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn into_thing_error(error: anyhow::Error) -> ThingError {
    let error = match error.downcast::<ThingError>() {
        Ok(error) => return error,
        Err(error) => error,
    };

    match error.downcast::<TwinError>() {
        Ok(TwinError::ThingError(error)) => error,
        Ok(other) => ThingError::execution_failed(other.to_string()),
        Err(error) => ThingError::execution_failed(error.to_string()),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex as StdMutex,
    };

    use futures::FutureExt;
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct RecordingConnection {
        subscribed: StdMutex<Vec<String>>,
        unsubscribed: StdMutex<Vec<String>>,
        published: StdMutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl MqttConnection for RecordingConnection {
        async fn subscribe(&self, filter: &str, _qos: QoS) -> TwinResult<()> {
            self.subscribed.lock().unwrap().push(filter.to_string());
            Ok(())
        }

        async fn unsubscribe(&self, filter: &str) -> TwinResult<()> {
            self.unsubscribed.lock().unwrap().push(filter.to_string());
            Ok(())
        }

        async fn publish(&self, topic: &str, _qos: QoS, payload: Vec<u8>) -> TwinResult<()> {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload));
            Ok(())
        }

        async fn disconnect(&self) -> TwinResult<()> {
            Ok(())
        }
    }

    impl RecordingConnection {
        fn published_on(&self, prefix: &str) -> Vec<(String, Vec<u8>)> {
            self.published
                .lock()
                .unwrap()
                .iter()
                .filter(|(topic, _)| topic.starts_with(prefix))
                .cloned()
                .collect()
        }

        fn responses(&self) -> Vec<(String, Envelope)> {
            self.published_on("command//")
                .into_iter()
                .map(|(topic, payload)| (topic, serde_json::from_slice(&payload).unwrap()))
                .collect()
        }
    }

    fn client(device_name: &str) -> (TwinClient, Arc<RecordingConnection>) {
        let connection = Arc::new(RecordingConnection::default());
        let config = ClientConfiguration::builder()
            .device_name(device_name)
            .build();
        (TwinClient::new(config, connection.clone()), connection)
    }

    fn bootstrap_message(device_id: &str) -> MqttEvent {
        MqttEvent::Message {
            topic: TOPIC_BOOTSTRAP_RESPONSE.to_string(),
            payload: serde_json::to_vec(&json!({
                "deviceId": device_id,
                "tenantId": "t1",
                "policyId": "ns:p"
            }))
            .unwrap(),
        }
    }

    fn command(request_id: &str, envelope: &Envelope) -> MqttEvent {
        MqttEvent::Message {
            topic: format!("command//ns:name/req/{request_id}/do"),
            payload: serde_json::to_vec(envelope).unwrap(),
        }
    }

    fn do_request() -> Envelope {
        Envelope::new(
            "ns/name/things/live/messages/do",
            Headers::new().with_correlation_id("x"),
            "/inbox/messages/do",
        )
        .with_value(json!({}))
    }

    async fn bootstrapped(device_id: &str, device_name: &str) -> (TwinClient, Arc<RecordingConnection>) {
        let (client, connection) = client(device_name);
        client.handle(MqttEvent::Connected).await;
        client.handle(bootstrap_message(device_id)).await;
        (client, connection)
    }

    #[test_log::test(tokio::test)]
    async fn test_bootstrap_builds_root_thing_and_subscribes() -> anyhow::Result<()> {
        let (client, connection) = client("d");

        client.handle(MqttEvent::Connected).await;
        assert_eq!(
            connection.subscribed.lock().unwrap().clone(),
            vec![TOPIC_BOOTSTRAP_RESPONSE.to_string()]
        );
        let requests = connection.published_on(TOPIC_BOOTSTRAP_REQUEST);
        assert_eq!(requests.len(), 1);
        assert!(requests[0].1.is_empty());
        assert!(client.device().await.is_none());

        client.handle(bootstrap_message("ns:gw")).await;

        let root = client.root_thing().await.expect("root thing");
        assert_eq!(root.id().to_string(), "ns:gw:d");
        assert_eq!(root.policy_id().map(|p| p.to_string()), Some("ns:p".to_string()));
        assert!(root.is_local());
        assert!(connection
            .subscribed
            .lock()
            .unwrap()
            .contains(&"command//ns:gw:d/req/#".to_string()));
        assert_eq!(client.device().await.map(|d| d.tenant_id), Some("t1".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_init_hook_runs_once_per_connection() -> anyhow::Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let (client, _connection) = client("d");
        let client = client.with_init_hook(Arc::new(move |_root: Arc<Thing>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, anyhow::Error>(()) }.boxed()
        }));

        client.handle(MqttEvent::Connected).await;
        client.handle(bootstrap_message("ns:gw")).await;
        client.handle(bootstrap_message("ns:gw")).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        client.handle(MqttEvent::Disconnected).await;
        client.handle(MqttEvent::Connected).await;
        client.handle(bootstrap_message("ns:gw")).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_changed_device_drops_old_command_subscription() -> anyhow::Result<()> {
        let (client, connection) = bootstrapped("ns:gw", "d").await;

        client.handle(MqttEvent::Connected).await;
        client.handle(bootstrap_message("ns:gw2")).await;

        assert_eq!(
            connection.unsubscribed.lock().unwrap().clone(),
            vec!["command//ns:gw:d/req/#".to_string()]
        );
        assert_eq!(
            client.root_thing().await.map(|t| t.id().to_string()),
            Some("ns:gw2:d".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_command_without_operations_handler_is_not_found() -> anyhow::Result<()> {
        let (client, connection) = bootstrapped("ns", "name").await;

        client.handle(command("r1", &do_request())).await;

        let responses = connection.responses();
        assert_eq!(responses.len(), 1);
        let (topic, response) = &responses[0];
        assert_eq!(topic, "command//ns:name/res/r1/404");
        assert_eq!(response.status, Some(404));
        assert_eq!(response.headers.correlation_id(), Some("x"));
        assert_eq!(response.path, "/outbox/messages/do");
        let body = response.value.clone().expect("error body");
        assert_eq!(body["error"], json!("messages:subject.notfound"));
        assert_eq!(body["status"], json!(404));
        assert!(body["message"].is_string());
        Ok(())
    }

    #[tokio::test]
    async fn test_command_results_map_to_statuses() -> anyhow::Result<()> {
        let (client, connection) = bootstrapped("ns", "name").await;
        let root = client.root_thing().await.expect("root thing");
        root.set_operations_handler(Arc::new(|operation: String, value: Option<Value>| {
            async move {
                match value.as_ref().and_then(|v| v.get("mode")).and_then(Value::as_str) {
                    Some("echo") => Ok(Some(json!({ "operation": operation }))),
                    Some("typed") => Err(ThingError::new("things:custom", 409, "conflict").into()),
                    Some("fail") => Err(anyhow::anyhow!("boom")),
                    _ => Ok(None),
                }
            }
            .boxed()
        }));

        for (request_id, mode) in [("r1", "echo"), ("r2", "none"), ("r3", "typed"), ("r4", "fail")] {
            let request = do_request().with_value(json!({ "mode": mode }));
            client.handle(command(request_id, &request)).await;
        }

        let responses = connection.responses();
        let topics: Vec<&str> = responses.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(
            topics,
            vec![
                "command//ns:name/res/r1/200",
                "command//ns:name/res/r2/204",
                "command//ns:name/res/r3/409",
                "command//ns:name/res/r4/500",
            ]
        );
        assert_eq!(responses[0].1.value, Some(json!({ "operation": "do" })));
        assert_eq!(responses[0].1.headers.content_type(), Some("application/json"));
        assert_eq!(responses[1].1.value, None);
        assert_eq!(responses[1].1.headers.content_type(), None);
        assert_eq!(
            responses[3].1.value.as_ref().map(|v| v["error"].clone()),
            Some(json!("messages:execution.failed"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_one_way_commands_are_never_answered() -> anyhow::Result<()> {
        let (client, connection) = bootstrapped("ns", "name").await;

        client.handle(command("", &do_request())).await;

        let mut no_response = do_request();
        no_response.headers = no_response.headers.with_response_required(false);
        client.handle(command("r1", &no_response)).await;

        assert!(connection.responses().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_command_is_rejected() -> anyhow::Result<()> {
        let (client, connection) = bootstrapped("ns", "name").await;

        let mut missing_content_type = do_request();
        missing_content_type.headers.remove("content-type");
        client.handle(command("r1", &missing_content_type)).await;

        client
            .handle(MqttEvent::Message {
                topic: "command//ns:name/req/r2/do".to_string(),
                payload: b"not json".to_vec(),
            })
            .await;

        let topics: Vec<String> = connection.responses().into_iter().map(|(t, _)| t).collect();
        assert_eq!(
            topics,
            vec![
                "command//ns:name/res/r1/400".to_string(),
                "command//ns:name/res/r2/400".to_string()
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_twin_events_update_registry_without_publishing() -> anyhow::Result<()> {
        let (client, connection) = bootstrapped("ns:gw", "d").await;
        let before = connection.published.lock().unwrap().len();

        let event = Envelope::new(
            "ns/gw:d/things/twin/events/modified",
            Headers::new().with_correlation_id("e1"),
            "/attributes/site",
        )
        .with_value(json!("north"));
        client
            .handle(MqttEvent::Message {
                topic: "command//ns:gw:d/req//modified".to_string(),
                payload: serde_json::to_vec(&event)?,
            })
            .await;

        let root = client.root_thing().await.expect("root thing");
        assert_eq!(root.attribute("site"), Some(json!("north")));
        assert_eq!(connection.published.lock().unwrap().len(), before);
        Ok(())
    }

    #[tokio::test]
    async fn test_local_changes_and_events_use_device_topics() -> anyhow::Result<()> {
        let (client, connection) = client("d");
        assert!(matches!(
            client.send_telemetry(&Envelope::default()).await,
            Err(TwinError::NotBootstrapped)
        ));

        client.handle(MqttEvent::Connected).await;
        client.handle(bootstrap_message("ns:gw")).await;
        let root = client.root_thing().await.expect("root thing");

        root.set_attribute("site", json!("north")).await?;
        client.send_telemetry(&Envelope::default()).await?;

        assert_eq!(connection.published_on("e/t1/ns:gw:d").len(), 1);
        assert_eq!(connection.published_on("t/t1/ns:gw:d").len(), 1);
        Ok(())
    }
}
