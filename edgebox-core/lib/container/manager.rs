//! Container lifecycle management.

use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::{
    events::{ContainerEvent, ContainerEventKind, EventsManager},
    network::{NetworkManager, NetworkMetrics},
    EdgeboxError, EdgeboxResult,
};

use super::{Container, ContainerRuntime, ContainerStatus, ContainerStore, NetworkMode};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Grace period given to a container task before it is killed.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Owns the set of containers and drives their lifecycle.
#[async_trait]
pub trait ContainerManager: Send + Sync {
    /// All containers in creation order.
    async fn list(&self) -> Vec<Container>;

    /// One container by id.
    async fn get(&self, id: &str) -> EdgeboxResult<Container>;

    /// Registers a new container in the created state and prepares its sandbox.
    async fn create(&self, container: Container) -> EdgeboxResult<Container>;

    /// Connects and starts a container, re-creating its sandbox after a stop.
    async fn start(&self, id: &str) -> EdgeboxResult<Container>;

    /// Stops a container and releases its network resources.
    async fn stop(&self, id: &str, timeout: Option<Duration>) -> EdgeboxResult<Container>;

    /// Removes a container, stopping it first when `force` is set.
    async fn remove(&self, id: &str, force: bool) -> EdgeboxResult<()>;

    /// Network counters of a running container.
    async fn metrics(&self, id: &str) -> EdgeboxResult<NetworkMetrics>;

    /// Loads persisted containers.
    async fn load(&self) -> EdgeboxResult<()>;

    /// Re-adopts running containers and initializes networking.
    async fn restore(&self) -> EdgeboxResult<()>;

    /// Stops every running container and the network manager.
    async fn dispose(&self) -> EdgeboxResult<()>;
}

/// A [`ContainerManager`] persisting containers as JSON files.
pub struct FileContainerManager {
    store: ContainerStore,
    stop_timeout: Duration,
    net: Arc<dyn NetworkManager>,
    runtime: Option<Arc<dyn ContainerRuntime>>,
    events: Option<Arc<EventsManager>>,
    containers: RwLock<HashMap<String, Container>>,
    op_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FileContainerManager {
    /// Creates a manager storing containers under `meta_path`.
    pub fn new(meta_path: impl Into<PathBuf>, net: Arc<dyn NetworkManager>) -> Self {
        Self {
            store: ContainerStore::new(meta_path.into()),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            net,
            runtime: None,
            events: None,
            containers: RwLock::new(HashMap::new()),
            op_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the grace period used when stopping containers.
    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    /// Sets the runtime that runs container tasks.
    pub fn with_runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Sets the bus lifecycle events are published on.
    pub fn with_events(mut self, events: Arc<EventsManager>) -> Self {
        self.events = Some(events);
        self
    }

    async fn op_lock(&self, id: &str) -> Arc<Mutex<()>> {
        self.op_locks
            .lock()
            .await
            .entry(id.to_string())
            .or_default()
            .clone()
    }

    async fn commit(&self, container: Container, kind: ContainerEventKind) -> EdgeboxResult<()> {
        self.persist(container.clone()).await?;
        self.publish(kind, container);
        Ok(())
    }

    async fn persist(&self, container: Container) -> EdgeboxResult<()> {
        self.store.save(&container).await?;
        self.containers
            .write()
            .await
            .insert(container.id.clone(), container);
        Ok(())
    }

    fn publish(&self, kind: ContainerEventKind, container: Container) {
        if let Some(events) = &self.events {
            events.publish(ContainerEvent::new(kind, container));
        }
    }

    async fn stop_locked(&self, mut container: Container, timeout: Duration) -> EdgeboxResult<Container> {
        if !container.is_running() {
            return Err(EdgeboxError::InvalidContainerState(
                container.id.clone(),
                container.state.status.to_string(),
            ));
        }

        if let Some(runtime) = &self.runtime {
            runtime.stop_task(&container, timeout).await?;
        }

        if let Err(e) = self.net.release_network_resources(&mut container).await {
            tracing::warn!("failed to release network of {}: {}", container.id, e);
        }

        container.state.status = ContainerStatus::Stopped;
        container.state.pid = None;
        container.state.finished_at = Some(Utc::now());

        self.commit(container.clone(), ContainerEventKind::Stopped)
            .await?;
        tracing::info!("stopped container {}", container.id);

        Ok(container)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ContainerManager for FileContainerManager {
    async fn list(&self) -> Vec<Container> {
        let mut containers: Vec<Container> =
            self.containers.read().await.values().cloned().collect();
        containers.sort_by(|a, b| a.created.cmp(&b.created));
        containers
    }

    async fn get(&self, id: &str) -> EdgeboxResult<Container> {
        self.containers
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| EdgeboxError::ContainerNotFound(id.to_string()))
    }

    async fn create(&self, mut container: Container) -> EdgeboxResult<Container> {
        let lock = self.op_lock(&container.id).await;
        let _guard = lock.lock().await;

        if self.containers.read().await.contains_key(&container.id) {
            return Err(EdgeboxError::ContainerExists(container.id));
        }

        container.state = Default::default();
        container.network_settings = None;
        container.created = Utc::now();

        let peers = self.list().await;
        self.net.manage(&mut container, &peers).await?;

        self.commit(container.clone(), ContainerEventKind::Created)
            .await?;
        tracing::info!("created container {} ({})", container.name, container.id);

        Ok(container)
    }

    async fn start(&self, id: &str) -> EdgeboxResult<Container> {
        let lock = self.op_lock(id).await;
        let _guard = lock.lock().await;

        let mut container = self.get(id).await?;
        if container.is_running() {
            return Err(EdgeboxError::InvalidContainerState(
                id.to_string(),
                container.state.status.to_string(),
            ));
        }

        if container.network_settings.is_none() {
            let peers = self.list().await;
            self.net.manage(&mut container, &peers).await?;
        }

        let started: EdgeboxResult<Option<u32>> = async {
            if container.network_mode() != NetworkMode::None {
                self.net.connect(&mut container).await?;
            }
            match &self.runtime {
                Some(runtime) => runtime.start_task(&container).await.map(Some),
                None => Ok(None),
            }
        }
        .await;

        let pid = match started {
            Ok(pid) => pid,
            Err(e) => {
                if let Err(release) = self.net.release_network_resources(&mut container).await {
                    tracing::warn!("failed to release network of {}: {}", id, release);
                }
                self.persist(container).await?;
                return Err(e);
            }
        };

        container.state.status = ContainerStatus::Running;
        container.state.pid = pid;
        container.state.started_at = Some(Utc::now());
        container.state.finished_at = None;

        self.commit(container.clone(), ContainerEventKind::Started)
            .await?;
        tracing::info!("started container {}", id);

        Ok(container)
    }

    async fn stop(&self, id: &str, timeout: Option<Duration>) -> EdgeboxResult<Container> {
        let lock = self.op_lock(id).await;
        let _guard = lock.lock().await;

        let container = self.get(id).await?;
        self.stop_locked(container, timeout.unwrap_or(self.stop_timeout))
            .await
    }

    async fn remove(&self, id: &str, force: bool) -> EdgeboxResult<()> {
        let lock = self.op_lock(id).await;
        let _guard = lock.lock().await;

        let mut container = self.get(id).await?;
        if container.is_running() {
            if !force {
                return Err(EdgeboxError::InvalidContainerState(
                    id.to_string(),
                    container.state.status.to_string(),
                ));
            }
            container = self.stop_locked(container, self.stop_timeout).await?;
        }

        if container.network_settings.is_some() {
            if let Err(e) = self.net.release_network_resources(&mut container).await {
                tracing::warn!("failed to release network of {}: {}", id, e);
            }
        }

        self.store.remove(id).await?;
        self.containers.write().await.remove(id);
        self.op_locks.lock().await.remove(id);
        self.publish(ContainerEventKind::Removed, container);
        tracing::info!("removed container {}", id);

        Ok(())
    }

    async fn metrics(&self, id: &str) -> EdgeboxResult<NetworkMetrics> {
        let container = self.get(id).await?;
        Ok(self.net.metrics(&container).await?)
    }

    async fn load(&self) -> EdgeboxResult<()> {
        let containers = self.store.load_all().await?;
        tracing::info!("loaded {} container(s)", containers.len());

        let mut map = self.containers.write().await;
        map.clear();
        map.extend(containers.into_iter().map(|c| (c.id.clone(), c)));
        Ok(())
    }

    async fn restore(&self) -> EdgeboxResult<()> {
        let mut running = Vec::new();
        for mut container in self.list().await {
            if !container.is_running() {
                // The sandbox of a stopped container is not re-adopted.
                if container.network_settings.take().is_some() {
                    tracing::debug!("clearing network settings of {}", container.id);
                    self.persist(container).await?;
                }
                continue;
            }

            let alive = match &self.runtime {
                Some(runtime) => runtime.is_running(&container).await.unwrap_or_else(|e| {
                    tracing::warn!("failed to query task of {}: {}", container.id, e);
                    false
                }),
                None => true,
            };

            if alive {
                running.push(container);
                continue;
            }

            tracing::info!("container {} exited while the daemon was down", container.id);
            container.state.status = ContainerStatus::Exited;
            container.state.pid = None;
            container.state.finished_at = Some(Utc::now());
            container.network_settings = None;
            self.persist(container).await?;
        }

        self.net.restore(&running).await?;
        self.net.initialize().await?;
        tracing::info!("restored {} running container(s)", running.len());

        Ok(())
    }

    async fn dispose(&self) -> EdgeboxResult<()> {
        for container in self.list().await {
            if !container.is_running() {
                continue;
            }

            let lock = self.op_lock(&container.id).await;
            let _guard = lock.lock().await;
            let id = container.id.clone();
            if let Err(e) = self.stop_locked(container, self.stop_timeout).await {
                tracing::error!("failed to stop container {}: {}", id, e);
            }
        }

        self.net.dispose().await?;
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Mutex as StdMutex,
    };

    use tempfile::TempDir;

    use super::*;
    use crate::network::{
        controller::tests::RecordingDriver, BridgeConfig, LocalNetworkManager, NetworkConfig,
        NetworkError, NetworkResult, NetworkType, SystemInterfaces,
    };

    /// Records network calls and fakes the settings a real manager would write.
    #[derive(Default)]
    struct FakeNetwork {
        calls: StdMutex<Vec<String>>,
        fail_connect: AtomicBool,
    }

    impl FakeNetwork {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &str, id: &str) {
            self.calls.lock().unwrap().push(format!("{} {}", call, id));
        }
    }

    #[async_trait]
    impl NetworkManager for FakeNetwork {
        async fn initialize(&self) -> NetworkResult<()> {
            self.record("initialize", "");
            Ok(())
        }

        async fn restore(&self, containers: &[Container]) -> NetworkResult<()> {
            for container in containers {
                self.record("restore", &container.id);
            }
            Ok(())
        }

        async fn manage(&self, container: &mut Container, _peers: &[Container]) -> NetworkResult<()> {
            self.record("manage", &container.id);
            container.network_settings = Some(Default::default());
            Ok(())
        }

        async fn connect(&self, container: &mut Container) -> NetworkResult<()> {
            self.record("connect", &container.id);
            if self.fail_connect.load(Ordering::SeqCst) {
                return Err(NetworkError::AddressPoolExhausted("bridge".to_string()));
            }
            Ok(())
        }

        async fn disconnect(&self, container: &mut Container, _force: bool) -> NetworkResult<()> {
            self.record("disconnect", &container.id);
            Ok(())
        }

        async fn release_network_resources(&self, container: &mut Container) -> NetworkResult<()> {
            self.record("release", &container.id);
            container.network_settings = None;
            Ok(())
        }

        async fn metrics(&self, _container: &Container) -> NetworkResult<NetworkMetrics> {
            Ok(NetworkMetrics { rx: 1, tx: 2 })
        }

        async fn dispose(&self) -> NetworkResult<()> {
            self.record("dispose", "");
            Ok(())
        }
    }

    struct DeadRuntime;

    #[async_trait]
    impl ContainerRuntime for DeadRuntime {
        async fn start_task(&self, _container: &Container) -> EdgeboxResult<u32> {
            Ok(42)
        }

        async fn stop_task(&self, _container: &Container, _timeout: Duration) -> EdgeboxResult<()> {
            Ok(())
        }

        async fn is_running(&self, _container: &Container) -> EdgeboxResult<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_lifecycle_publishes_events() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let net = Arc::new(FakeNetwork::default());
        let events = Arc::new(EventsManager::default());
        let mut receiver = events.subscribe();
        let manager = FileContainerManager::new(dir.path(), net.clone())
            .with_runtime(Arc::new(DeadRuntime))
            .with_events(events);

        manager.create(Container::new("c1", "web")).await?;
        assert!(matches!(
            manager.create(Container::new("c1", "web")).await,
            Err(EdgeboxError::ContainerExists(_))
        ));

        let started = manager.start("c1").await?;
        assert!(started.is_running());
        assert_eq!(started.state.pid, Some(42));
        assert!(matches!(
            manager.remove("c1", false).await,
            Err(EdgeboxError::InvalidContainerState(_, _))
        ));

        assert_eq!(manager.metrics("c1").await?, NetworkMetrics { rx: 1, tx: 2 });

        let stopped = manager.stop("c1", None).await?;
        assert_eq!(stopped.state.status, ContainerStatus::Stopped);
        assert!(stopped.network_settings.is_none());

        manager.remove("c1", false).await?;
        assert!(manager.list().await.is_empty());

        let kinds: Vec<ContainerEventKind> = std::iter::from_fn(|| receiver.try_recv().ok())
            .map(|event| event.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                ContainerEventKind::Created,
                ContainerEventKind::Started,
                ContainerEventKind::Stopped,
                ContainerEventKind::Removed,
            ]
        );
        assert_eq!(
            net.calls(),
            vec!["manage c1", "connect c1", "release c1"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_connect_releases_network() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let net = Arc::new(FakeNetwork::default());
        net.fail_connect.store(true, Ordering::SeqCst);
        let manager = FileContainerManager::new(dir.path(), net.clone());

        manager.create(Container::new("c1", "web")).await?;
        assert!(manager.start("c1").await.is_err());

        let container = manager.get("c1").await?;
        assert!(!container.is_running());
        assert!(container.network_settings.is_none());
        assert_eq!(net.calls().last().map(String::as_str), Some("release c1"));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_connect_persists_released_network() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let net = Arc::new(FakeNetwork::default());
        net.fail_connect.store(true, Ordering::SeqCst);
        {
            let manager = FileContainerManager::new(dir.path(), net.clone());
            manager.create(Container::new("c1", "web")).await?;
            assert!(manager.start("c1").await.is_err());
        }

        let manager = FileContainerManager::new(dir.path(), net.clone());
        manager.load().await?;
        assert!(manager.get("c1").await?.network_settings.is_none());

        net.fail_connect.store(false, Ordering::SeqCst);
        manager.start("c1").await?;
        assert_eq!(
            net.calls().iter().filter(|call| *call == "manage c1").count(),
            2
        );
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_created_container_starts_after_restart() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let driver = Arc::new(RecordingDriver::default());
        let network = |dir: &TempDir| {
            let config = NetworkConfig::new(
                NetworkType::Bridge,
                dir.path().join("network"),
                dir.path().join("exec"),
                BridgeConfig::default(),
            )
            .with_netns_dir(dir.path().join("netns"));
            Arc::new(LocalNetworkManager::new(
                config,
                driver.clone(),
                Arc::new(SystemInterfaces),
            ))
        };
        let meta = dir.path().join("containers");

        {
            let manager = FileContainerManager::new(&meta, network(&dir));
            manager.restore().await?;
            let created = manager.create(Container::new("c1", "web")).await?;
            assert!(created.network_settings.is_some());
            manager.dispose().await?;
        }

        let manager = FileContainerManager::new(&meta, network(&dir));
        manager.load().await?;
        manager.restore().await?;
        assert!(manager.get("c1").await?.network_settings.is_none());

        let started = manager.start("c1").await?;
        assert!(started.is_running());
        let settings = started.network_settings.unwrap();
        assert!(!settings.networks["bridge"].ip_address.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_none_mode_skips_connect() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let net = Arc::new(FakeNetwork::default());
        let manager = FileContainerManager::new(dir.path(), net.clone());

        manager
            .create(Container::new("c1", "batch").with_network_mode(NetworkMode::None))
            .await?;
        manager.start("c1").await?;
        assert_eq!(net.calls(), vec!["manage c1"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_restore_and_dispose() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let net = Arc::new(FakeNetwork::default());
        {
            let manager = FileContainerManager::new(dir.path(), net.clone());
            manager.create(Container::new("c1", "web")).await?;
            manager.create(Container::new("c2", "db")).await?;
            manager.create(Container::new("c3", "idle")).await?;
            manager.start("c1").await?;
            manager.start("c2").await?;
        }

        let manager = FileContainerManager::new(dir.path(), net.clone());
        manager.load().await?;
        assert_eq!(manager.list().await.len(), 3);

        manager.restore().await?;
        let calls = net.calls();
        assert!(calls.contains(&"restore c1".to_string()));
        assert!(calls.contains(&"restore c2".to_string()));
        assert!(!calls.contains(&"restore c3".to_string()));
        assert_eq!(calls.last().map(String::as_str), Some("initialize "));

        manager.dispose().await?;
        assert!(manager.list().await.iter().all(|c| !c.is_running()));
        assert_eq!(net.calls().last().map(String::as_str), Some("dispose "));
        Ok(())
    }

    #[tokio::test]
    async fn test_restore_marks_dead_tasks_exited() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let net = Arc::new(FakeNetwork::default());
        {
            let manager = FileContainerManager::new(dir.path(), net.clone());
            manager.create(Container::new("c1", "web")).await?;
            manager.start("c1").await?;
        }

        let manager =
            FileContainerManager::new(dir.path(), net.clone()).with_runtime(Arc::new(DeadRuntime));
        manager.load().await?;
        manager.restore().await?;

        let container = manager.get("c1").await?;
        assert_eq!(container.state.status, ContainerStatus::Exited);
        assert!(!net.calls().contains(&"restore c1".to_string()));
        Ok(())
    }
}
