//! The network controller: the owner of networks, sandboxes and endpoints.
//!
//! State is kept in memory behind a single lock and persisted to `state.json` under the
//! controller's meta directory after every change. On creation the controller re-adopts the
//! sandboxes of running containers and removes everything else.

mod files;
mod ipam;
mod link;
mod state;

use std::{
    collections::HashMap,
    net::Ipv4Addr,
    path::{Path, PathBuf},
    sync::Arc,
};

use ipnetwork::Ipv4Network;
use tokio::{fs, sync::Mutex};
use uuid::Uuid;

use super::{NetworkError, NetworkResult, NetworkType, SandboxOption};

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use link::*;
pub use state::{BridgeRecord, EndpointRecord, NetworkRecord, SandboxConfig, SandboxRecord};

pub(crate) use ipam::{first_host, is_global_unicast};

use state::ControllerState;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// File the controller persists its state to.
pub const STATE_FILENAME: &str = "state.json";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The network controller.
pub struct NetworkController {
    id: String,
    state_path: PathBuf,
    netns_dir: PathBuf,
    driver: Arc<dyn LinkDriver>,
    state: Mutex<ControllerState>,
}

/// Parameters of a new network.
#[derive(Debug, Clone)]
pub struct NetworkCreate {
    /// Network name.
    pub name: String,

    /// Driver type.
    pub net_type: NetworkType,

    /// Whether the network survives a daemon restart.
    pub persist: bool,

    /// Whether IPv6 is enabled.
    pub enable_ipv6: bool,

    /// Bridge settings, required for bridge networks.
    pub bridge: Option<BridgeRecord>,
}

/// Parameters of a new endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointCreate {
    /// Exclude the endpoint from service discovery.
    pub anonymous: bool,

    /// Disable name resolution for the endpoint.
    pub disable_resolution: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl NetworkController {
    /// Creates the controller, loading persisted state from `meta_dir`.
    ///
    /// Sandboxes named in `active_sandboxes` are kept and their options refreshed; all other
    /// sandboxes and their endpoints are torn down.
    pub async fn new(
        meta_dir: impl Into<PathBuf>,
        netns_dir: impl Into<PathBuf>,
        driver: Arc<dyn LinkDriver>,
        active_sandboxes: &HashMap<String, Vec<SandboxOption>>,
    ) -> NetworkResult<Self> {
        let meta_dir = meta_dir.into();
        fs::create_dir_all(&meta_dir).await?;

        let state_path = meta_dir.join(STATE_FILENAME);
        let mut state = match ControllerState::load(&state_path).await? {
            Some(state) => state,
            None => ControllerState::new(Uuid::new_v4().simple().to_string()),
        };

        let controller = Self {
            id: state.id.clone(),
            state_path,
            netns_dir: netns_dir.into(),
            driver,
            state: Mutex::new(ControllerState::default()),
        };

        let stale: Vec<String> = state
            .sandboxes
            .keys()
            .filter(|id| !active_sandboxes.contains_key(*id))
            .cloned()
            .collect();
        for id in stale {
            tracing::info!("removing stale sandbox {}", id);
            if let Err(e) = controller.remove_sandbox(&mut state, &id).await {
                tracing::warn!("failed to clean up stale sandbox {}: {}", id, e);
                state.sandboxes.remove(&id);
            }
        }

        for (id, options) in active_sandboxes {
            match state.sandboxes.get_mut(id) {
                Some(sandbox) => {
                    tracing::debug!("re-adopting sandbox {} of {}", id, sandbox.container_id);
                    sandbox.config = SandboxConfig::from_options(options);
                }
                None => tracing::warn!("active sandbox {} is unknown to the controller", id),
            }
        }

        let orphans: Vec<String> = state
            .endpoints
            .values()
            .filter(|endpoint| {
                endpoint
                    .sandbox_id
                    .as_ref()
                    .is_some_and(|sandbox| !state.sandboxes.contains_key(sandbox))
                    || !state.networks.contains_key(&endpoint.network_id)
            })
            .map(|endpoint| endpoint.id.clone())
            .collect();
        for id in orphans {
            if let Some(endpoint) = state.endpoints.remove(&id) {
                if let Some(host_interface) = &endpoint.host_interface {
                    if let Err(e) = controller.driver.detach(host_interface).await {
                        tracing::warn!("failed to detach orphaned endpoint {}: {}", id, e);
                    }
                }
            }
        }
        for sandbox in state.sandboxes.values_mut() {
            let endpoints = &state.endpoints;
            sandbox.endpoints.retain(|id| endpoints.contains_key(id));
        }

        state.save(&controller.state_path).await?;
        *controller.state.lock().await = state;

        Ok(controller)
    }

    /// The controller id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Looks up a network by name.
    pub async fn network_by_name(&self, name: &str) -> Option<NetworkRecord> {
        self.state.lock().await.network_by_name(name).cloned()
    }

    /// Looks up a network by id.
    pub async fn network(&self, id: &str) -> Option<NetworkRecord> {
        self.state.lock().await.networks.get(id).cloned()
    }

    /// All networks.
    pub async fn networks(&self) -> Vec<NetworkRecord> {
        self.state.lock().await.networks.values().cloned().collect()
    }

    /// Creates a network. Bridge networks bring up their bridge interface.
    pub async fn new_network(&self, create: NetworkCreate) -> NetworkResult<NetworkRecord> {
        let mut state = self.state.lock().await;
        if state.network_by_name(&create.name).is_some() {
            return Err(NetworkError::NetworkExists(create.name));
        }

        if create.net_type == NetworkType::Bridge {
            let bridge = create.bridge.as_ref().ok_or_else(|| {
                NetworkError::InvalidAddress(format!("bridge network {} has no pool", create.name))
            })?;
            let address = Ipv4Network::new(bridge.gateway, bridge.pool.prefix())
                .map_err(|e| NetworkError::InvalidAddress(e.to_string()))?;

            self.driver
                .create_bridge(&BridgeLink {
                    name: bridge.interface.clone(),
                    address,
                    mtu: bridge.mtu,
                    ip_forward: bridge
                        .options
                        .is_enabled(crate::network::OPTION_ENABLE_IP_FORWARDING),
                    masquerade: bridge.masquerade
                        && bridge
                            .options
                            .is_enabled(crate::network::OPTION_ENABLE_IP_TABLES),
                })
                .await?;
        }

        let network = NetworkRecord {
            id: Uuid::new_v4().simple().to_string(),
            name: create.name,
            net_type: create.net_type,
            enable_ipv6: create.enable_ipv6,
            persist: create.persist,
            bridge: create.bridge,
        };

        tracing::info!("created {} network {} ({})", network.net_type_str(), network.name, network.id);
        state.networks.insert(network.id.clone(), network.clone());
        state.save(&self.state_path).await?;

        Ok(network)
    }

    /// Deletes a network that has no endpoints. Bridge networks remove their interface.
    pub async fn delete_network(&self, id: &str) -> NetworkResult<()> {
        let mut state = self.state.lock().await;
        let network = state
            .networks
            .get(id)
            .cloned()
            .ok_or_else(|| NetworkError::NetworkNotFound(id.to_string()))?;

        if state.endpoints.values().any(|endpoint| endpoint.network_id == id) {
            return Err(NetworkError::ActiveEndpoints(network.name));
        }

        if let Some(bridge) = &network.bridge {
            self.driver.delete_link(&bridge.interface).await?;
        }

        state.networks.remove(id);
        state.save(&self.state_path).await?;
        tracing::info!("deleted network {} ({})", network.name, id);

        Ok(())
    }

    /// Creates a sandbox for a container and writes its hosts and resolv.conf files.
    pub async fn new_sandbox(
        &self,
        container_id: &str,
        options: &[SandboxOption],
    ) -> NetworkResult<SandboxRecord> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.sandbox_by_container(container_id) {
            return Err(NetworkError::SandboxExists(
                container_id.to_string(),
                existing.id.clone(),
            ));
        }

        let config = SandboxConfig::from_options(options);
        let id = format!(
            "{}{}",
            Uuid::new_v4().simple(),
            Uuid::new_v4().simple()
        );
        let key = (!config.use_default_sandbox).then(|| self.netns_dir.join(&id[..12]));

        if let Some(key) = &key {
            self.driver.create_namespace(key).await?;
        }

        if let Err(e) = files::write_sandbox_files(&config, None).await {
            if let Some(key) = &key {
                if let Err(cleanup) = self.driver.delete_namespace(key).await {
                    tracing::warn!("failed to delete namespace {}: {}", key.display(), cleanup);
                }
            }
            return Err(e);
        }

        let sandbox = SandboxRecord {
            id,
            container_id: container_id.to_string(),
            key,
            config,
            endpoints: Vec::new(),
        };

        state.sandboxes.insert(sandbox.id.clone(), sandbox.clone());
        state.save(&self.state_path).await?;
        tracing::debug!("created sandbox {} for container {}", sandbox.id, container_id);

        Ok(sandbox)
    }

    /// Looks up a sandbox by id.
    pub async fn sandbox(&self, id: &str) -> Option<SandboxRecord> {
        self.state.lock().await.sandboxes.get(id).cloned()
    }

    /// Looks up the sandbox of a container.
    pub async fn sandbox_by_container(&self, container_id: &str) -> Option<SandboxRecord> {
        self.state
            .lock()
            .await
            .sandbox_by_container(container_id)
            .cloned()
    }

    /// Deletes a sandbox, leaving and deleting its endpoints and removing its namespace.
    pub async fn delete_sandbox(&self, id: &str) -> NetworkResult<()> {
        let mut state = self.state.lock().await;
        self.remove_sandbox(&mut state, id).await?;
        state.save(&self.state_path).await
    }

    /// Creates an endpoint on a network. Bridge endpoints get an address, a MAC address and a
    /// host interface name.
    pub async fn create_endpoint(
        &self,
        network_id: &str,
        name: &str,
        create: EndpointCreate,
    ) -> NetworkResult<EndpointRecord> {
        let mut state = self.state.lock().await;
        let network = state
            .networks
            .get(network_id)
            .cloned()
            .ok_or_else(|| NetworkError::NetworkNotFound(network_id.to_string()))?;

        let id = Uuid::new_v4().simple().to_string();
        let mut endpoint = EndpointRecord {
            id: id.clone(),
            name: name.to_string(),
            network_id: network_id.to_string(),
            sandbox_id: None,
            address: None,
            gateway: None,
            mac: None,
            host_interface: None,
            anonymous: create.anonymous,
            disable_resolution: create.disable_resolution,
        };

        if let Some(bridge) = &network.bridge {
            let used = state.used_addresses(network_id);
            let ip = ipam::allocate(bridge.pool, bridge.gateway, &used)
                .ok_or_else(|| NetworkError::AddressPoolExhausted(network.name.clone()))?;
            endpoint.address = Some(
                Ipv4Network::new(ip, bridge.pool.prefix())
                    .map_err(|e| NetworkError::InvalidAddress(e.to_string()))?,
            );
            endpoint.gateway = Some(bridge.gateway);
            endpoint.mac = Some(ipam::mac_for(ip));
            endpoint.host_interface = Some(format!("veth{}", &id[..7]));
        }

        state.endpoints.insert(id, endpoint.clone());
        state.save(&self.state_path).await?;
        tracing::debug!("created endpoint {} on network {}", endpoint.name, network.name);

        Ok(endpoint)
    }

    /// Looks up an endpoint by id.
    pub async fn endpoint(&self, id: &str) -> Option<EndpointRecord> {
        self.state.lock().await.endpoints.get(id).cloned()
    }

    /// Looks up an endpoint by network and name.
    pub async fn endpoint_by_name(&self, network_id: &str, name: &str) -> Option<EndpointRecord> {
        self.state
            .lock()
            .await
            .endpoints
            .values()
            .find(|endpoint| endpoint.network_id == network_id && endpoint.name == name)
            .cloned()
    }

    /// Deletes an endpoint. A joined endpoint is refused unless `force` is set, in which case it
    /// leaves its sandbox first.
    pub async fn delete_endpoint(&self, id: &str, force: bool) -> NetworkResult<()> {
        let mut state = self.state.lock().await;
        let endpoint = state
            .endpoints
            .get(id)
            .cloned()
            .ok_or_else(|| NetworkError::EndpointNotFound(id.to_string()))?;

        if let Some(sandbox_id) = &endpoint.sandbox_id {
            if !force {
                return Err(NetworkError::EndpointInUse(id.to_string(), sandbox_id.clone()));
            }
            self.detach_endpoint(&mut state, id, sandbox_id).await?;
        }

        state.endpoints.remove(id);
        state.save(&self.state_path).await
    }

    /// Joins an endpoint to a sandbox.
    pub async fn join(&self, endpoint_id: &str, sandbox_id: &str) -> NetworkResult<EndpointRecord> {
        let mut state = self.state.lock().await;
        let endpoint = state
            .endpoints
            .get(endpoint_id)
            .cloned()
            .ok_or_else(|| NetworkError::EndpointNotFound(endpoint_id.to_string()))?;
        let sandbox = state
            .sandboxes
            .get(sandbox_id)
            .cloned()
            .ok_or_else(|| NetworkError::SandboxNotFound(sandbox_id.to_string()))?;

        if let Some(joined) = &endpoint.sandbox_id {
            return Err(NetworkError::EndpointAlreadyJoined(
                endpoint_id.to_string(),
                joined.clone(),
            ));
        }

        let network = state
            .networks
            .get(&endpoint.network_id)
            .cloned()
            .ok_or_else(|| NetworkError::NetworkNotFound(endpoint.network_id.clone()))?;

        if let (Some(bridge), Some(key)) = (&network.bridge, &sandbox.key) {
            let veth = veth_for(bridge, &endpoint, key)?;
            self.driver.attach(&veth).await?;
        }

        if let Err(e) = files::write_sandbox_files(&sandbox.config, endpoint.ip()).await {
            if let Some(host_interface) = &endpoint.host_interface {
                if let Err(cleanup) = self.driver.detach(host_interface).await {
                    tracing::warn!("failed to detach {}: {}", host_interface, cleanup);
                }
            }
            return Err(e);
        }

        let joined = {
            let record = state
                .endpoints
                .get_mut(endpoint_id)
                .ok_or_else(|| NetworkError::EndpointNotFound(endpoint_id.to_string()))?;
            record.sandbox_id = Some(sandbox_id.to_string());
            record.clone()
        };
        if let Some(sandbox) = state.sandboxes.get_mut(sandbox_id) {
            sandbox.endpoints.push(endpoint_id.to_string());
        }

        state.save(&self.state_path).await?;
        tracing::debug!("endpoint {} joined sandbox {}", endpoint_id, sandbox_id);

        Ok(joined)
    }

    /// Makes an endpoint leave a sandbox.
    pub async fn leave(&self, endpoint_id: &str, sandbox_id: &str) -> NetworkResult<()> {
        let mut state = self.state.lock().await;
        self.detach_endpoint(&mut state, endpoint_id, sandbox_id)
            .await?;
        state.save(&self.state_path).await
    }

    /// Interface counters of every bridge endpoint joined to the sandbox.
    pub async fn statistics(&self, sandbox_id: &str) -> NetworkResult<Vec<InterfaceStatistics>> {
        let state = self.state.lock().await;
        let sandbox = state
            .sandboxes
            .get(sandbox_id)
            .ok_or_else(|| NetworkError::SandboxNotFound(sandbox_id.to_string()))?;

        let mut statistics = Vec::new();
        for endpoint_id in &sandbox.endpoints {
            let host_interface = state
                .endpoints
                .get(endpoint_id)
                .and_then(|endpoint| endpoint.host_interface.as_deref());
            if let Some(host_interface) = host_interface {
                statistics.push(self.driver.statistics(host_interface).await?);
            }
        }

        Ok(statistics)
    }

    /// Persists the state one last time.
    pub async fn stop(&self) -> NetworkResult<()> {
        self.state.lock().await.save(&self.state_path).await?;
        tracing::debug!("network controller {} stopped", self.id);
        Ok(())
    }

    async fn detach_endpoint(
        &self,
        state: &mut ControllerState,
        endpoint_id: &str,
        sandbox_id: &str,
    ) -> NetworkResult<()> {
        let endpoint = state
            .endpoints
            .get(endpoint_id)
            .cloned()
            .ok_or_else(|| NetworkError::EndpointNotFound(endpoint_id.to_string()))?;

        if endpoint.sandbox_id.as_deref() != Some(sandbox_id) {
            return Err(NetworkError::NotConnected(
                sandbox_id.to_string(),
                endpoint.network_id.clone(),
            ));
        }

        if let Some(host_interface) = &endpoint.host_interface {
            self.driver.detach(host_interface).await?;
        }

        if let Some(sandbox) = state.sandboxes.get_mut(sandbox_id) {
            sandbox.endpoints.retain(|id| id != endpoint_id);
            if let Err(e) = files::write_sandbox_files(&sandbox.config, None).await {
                tracing::warn!("failed to rewrite files of sandbox {}: {}", sandbox_id, e);
            }
        }
        if let Some(record) = state.endpoints.get_mut(endpoint_id) {
            record.sandbox_id = None;
        }

        Ok(())
    }

    async fn remove_sandbox(&self, state: &mut ControllerState, id: &str) -> NetworkResult<()> {
        let sandbox = state
            .sandboxes
            .get(id)
            .cloned()
            .ok_or_else(|| NetworkError::SandboxNotFound(id.to_string()))?;

        for endpoint_id in &sandbox.endpoints {
            if let Some(endpoint) = state.endpoints.remove(endpoint_id) {
                if let Some(host_interface) = &endpoint.host_interface {
                    self.driver.detach(host_interface).await?;
                }
            }
        }

        if let Some(key) = &sandbox.key {
            self.driver.delete_namespace(key).await?;
        }

        state.sandboxes.remove(id);
        tracing::debug!("deleted sandbox {} of container {}", id, sandbox.container_id);
        Ok(())
    }
}

impl NetworkRecord {
    fn net_type_str(&self) -> &'static str {
        match self.net_type {
            NetworkType::Bridge => "bridge",
            NetworkType::Host => "host",
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn veth_for(bridge: &BridgeRecord, endpoint: &EndpointRecord, key: &Path) -> NetworkResult<VethLink> {
    let missing = || NetworkError::InvalidAddress(format!("endpoint {} has no address", endpoint.id));
    Ok(VethLink {
        bridge: bridge.interface.clone(),
        host_interface: endpoint.host_interface.clone().ok_or_else(missing)?,
        namespace: key.to_path_buf(),
        address: endpoint.address.ok_or_else(missing)?,
        mac: endpoint.mac.clone().ok_or_else(missing)?,
        gateway: endpoint.gateway.unwrap_or(Ipv4Addr::UNSPECIFIED),
        mtu: bridge.mtu,
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex as StdMutex;

    use tempfile::TempDir;

    use super::*;
    use crate::network::{DriverOptions, DEFAULT_MTU};

    /// A link driver that records calls and keeps links in memory.
    #[derive(Default)]
    pub(crate) struct RecordingDriver {
        pub(crate) links: StdMutex<HashMap<String, Option<Ipv4Network>>>,
        pub(crate) namespaces: StdMutex<Vec<PathBuf>>,
        pub(crate) calls: StdMutex<Vec<String>>,
        pub(crate) fail_attach: std::sync::atomic::AtomicBool,
        pub(crate) fail_delete_namespace: std::sync::atomic::AtomicBool,
    }

    impl RecordingDriver {
        pub(crate) fn with_link(self, name: &str, address: Option<Ipv4Network>) -> Self {
            self.links.lock().unwrap().insert(name.to_string(), address);
            self
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait::async_trait]
    impl LinkDriver for RecordingDriver {
        async fn link_exists(&self, name: &str) -> NetworkResult<bool> {
            Ok(self.links.lock().unwrap().contains_key(name))
        }

        async fn link_ipv4(&self, name: &str) -> NetworkResult<Option<Ipv4Network>> {
            Ok(self.links.lock().unwrap().get(name).copied().flatten())
        }

        async fn create_bridge(&self, bridge: &BridgeLink) -> NetworkResult<()> {
            self.record(format!("create_bridge {} {}", bridge.name, bridge.address));
            self.links
                .lock()
                .unwrap()
                .insert(bridge.name.clone(), Some(bridge.address));
            Ok(())
        }

        async fn delete_link(&self, name: &str) -> NetworkResult<()> {
            self.record(format!("delete_link {}", name));
            self.links.lock().unwrap().remove(name);
            Ok(())
        }

        async fn create_namespace(&self, key: &Path) -> NetworkResult<()> {
            self.record(format!("create_namespace {}", key.display()));
            self.namespaces.lock().unwrap().push(key.to_path_buf());
            Ok(())
        }

        async fn delete_namespace(&self, key: &Path) -> NetworkResult<()> {
            self.record(format!("delete_namespace {}", key.display()));
            if self
                .fail_delete_namespace
                .load(std::sync::atomic::Ordering::SeqCst)
            {
                return Err(NetworkError::DriverError(format!(
                    "cannot delete {}",
                    key.display()
                )));
            }
            self.namespaces.lock().unwrap().retain(|k| k != key);
            Ok(())
        }

        async fn attach(&self, veth: &VethLink) -> NetworkResult<()> {
            self.record(format!("attach {} {}", veth.host_interface, veth.address));
            if self.fail_attach.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(NetworkError::DriverError(format!(
                    "cannot attach {}",
                    veth.host_interface
                )));
            }
            self.links
                .lock()
                .unwrap()
                .insert(veth.host_interface.clone(), None);
            Ok(())
        }

        async fn detach(&self, host_interface: &str) -> NetworkResult<()> {
            self.record(format!("detach {}", host_interface));
            self.links.lock().unwrap().remove(host_interface);
            Ok(())
        }

        async fn statistics(&self, _host_interface: &str) -> NetworkResult<InterfaceStatistics> {
            Ok(InterfaceStatistics {
                rx_bytes: 10,
                tx_bytes: 20,
                ..Default::default()
            })
        }
    }

    fn bridge_create(pool: &str) -> NetworkCreate {
        let pool: Ipv4Network = pool.parse().unwrap();
        NetworkCreate {
            name: "bridge".to_string(),
            net_type: NetworkType::Bridge,
            persist: true,
            enable_ipv6: false,
            bridge: Some(BridgeRecord {
                interface: "edgebox0".to_string(),
                pool,
                gateway: first_host(pool).unwrap(),
                mtu: DEFAULT_MTU,
                masquerade: true,
                options: DriverOptions {
                    generic: Default::default(),
                    mtu: DEFAULT_MTU,
                },
            }),
        }
    }

    async fn controller(
        dir: &TempDir,
        driver: Arc<RecordingDriver>,
        active: &HashMap<String, Vec<SandboxOption>>,
    ) -> NetworkResult<NetworkController> {
        NetworkController::new(
            dir.path().join("network"),
            dir.path().join("netns"),
            driver,
            active,
        )
        .await
    }

    #[tokio::test]
    async fn test_endpoint_lifecycle() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let driver = Arc::new(RecordingDriver::default());
        let controller = controller(&dir, driver.clone(), &HashMap::new()).await?;

        let network = controller.new_network(bridge_create("172.17.0.0/16")).await?;
        assert!(driver.link_exists("edgebox0").await?);

        let hosts = dir.path().join("hosts");
        let sandbox = controller
            .new_sandbox(
                "c1",
                &[
                    SandboxOption::Hostname("web".to_string()),
                    SandboxOption::HostsPath(hosts.clone()),
                    SandboxOption::UseExternalKey,
                ],
            )
            .await?;
        assert!(sandbox.key.is_some());

        let endpoint = controller
            .create_endpoint(&network.id, "c1-ep", EndpointCreate::default())
            .await?;
        assert_eq!(endpoint.ip(), Some(Ipv4Addr::new(172, 17, 0, 2)));
        assert_eq!(endpoint.mac.as_deref(), Some("02:42:ac:11:00:02"));

        controller.join(&endpoint.id, &sandbox.id).await?;
        assert!(std::fs::read_to_string(&hosts)?.contains("172.17.0.2\tweb"));
        assert!(matches!(
            controller.join(&endpoint.id, &sandbox.id).await,
            Err(NetworkError::EndpointAlreadyJoined(_, _))
        ));
        assert!(matches!(
            controller.delete_network(&network.id).await,
            Err(NetworkError::ActiveEndpoints(_))
        ));
        assert!(matches!(
            controller.delete_endpoint(&endpoint.id, false).await,
            Err(NetworkError::EndpointInUse(_, _))
        ));

        let statistics = controller.statistics(&sandbox.id).await?;
        assert_eq!(statistics.len(), 1);

        controller.leave(&endpoint.id, &sandbox.id).await?;
        assert!(!std::fs::read_to_string(&hosts)?.contains("web"));
        controller.delete_endpoint(&endpoint.id, false).await?;
        controller.delete_sandbox(&sandbox.id).await?;
        controller.delete_network(&network.id).await?;
        assert!(!driver.link_exists("edgebox0").await?);

        Ok(())
    }

    #[tokio::test]
    async fn test_addresses_are_reused_after_delete() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let driver = Arc::new(RecordingDriver::default());
        let controller = controller(&dir, driver, &HashMap::new()).await?;
        let network = controller.new_network(bridge_create("10.0.0.0/30")).await?;

        let first = controller
            .create_endpoint(&network.id, "a", EndpointCreate::default())
            .await?;
        assert_eq!(first.ip(), Some(Ipv4Addr::new(10, 0, 0, 2)));
        assert!(matches!(
            controller
                .create_endpoint(&network.id, "b", EndpointCreate::default())
                .await,
            Err(NetworkError::AddressPoolExhausted(_))
        ));

        controller.delete_endpoint(&first.id, false).await?;
        let again = controller
            .create_endpoint(&network.id, "b", EndpointCreate::default())
            .await?;
        assert_eq!(again.ip(), first.ip());
        Ok(())
    }

    #[tokio::test]
    async fn test_one_sandbox_per_container() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let controller =
            controller(&dir, Arc::new(RecordingDriver::default()), &HashMap::new()).await?;

        controller
            .new_sandbox("c1", &[SandboxOption::UseDefaultSandbox])
            .await?;
        assert!(matches!(
            controller
                .new_sandbox("c1", &[SandboxOption::UseDefaultSandbox])
                .await,
            Err(NetworkError::SandboxExists(_, _))
        ));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_sandbox_files_keep_original_error() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let driver = Arc::new(RecordingDriver::default());
        driver
            .fail_delete_namespace
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let controller = controller(&dir, driver.clone(), &HashMap::new()).await?;

        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "")?;
        let created = controller
            .new_sandbox(
                "c1",
                &[
                    SandboxOption::UseExternalKey,
                    SandboxOption::HostsPath(blocker.join("hosts")),
                ],
            )
            .await;

        assert!(matches!(created, Err(NetworkError::IoError(_))));
        assert!(driver
            .calls()
            .iter()
            .any(|call| call.starts_with("delete_namespace")));
        assert!(controller.sandbox_by_container("c1").await.is_none());
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_restart_keeps_active_and_removes_stale() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let driver = Arc::new(RecordingDriver::default());

        let (keep, stale) = {
            let controller = controller(&dir, driver.clone(), &HashMap::new()).await?;
            controller.new_network(bridge_create("172.17.0.0/16")).await?;
            let keep = controller
                .new_sandbox("c1", &[SandboxOption::UseExternalKey])
                .await?;
            let stale = controller
                .new_sandbox("c2", &[SandboxOption::UseExternalKey])
                .await?;
            controller.stop().await?;
            (keep, stale)
        };

        let mut active = HashMap::new();
        active.insert(
            keep.id.clone(),
            vec![SandboxOption::Hostname("renamed".to_string())],
        );
        let controller = controller(&dir, driver.clone(), &active).await?;

        assert!(controller.network_by_name("bridge").await.is_some());
        let kept = controller.sandbox(&keep.id).await.unwrap();
        assert_eq!(kept.config.hostname, "renamed");
        assert!(controller.sandbox(&stale.id).await.is_none());
        assert!(driver
            .calls()
            .contains(&format!("delete_namespace {}", stale.key.unwrap().display())));
        Ok(())
    }

    #[tokio::test]
    async fn test_non_persistent_networks_are_not_saved() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let driver = Arc::new(RecordingDriver::default());
        {
            let controller = controller(&dir, driver.clone(), &HashMap::new()).await?;
            controller
                .new_network(NetworkCreate {
                    name: "host".to_string(),
                    net_type: NetworkType::Host,
                    persist: false,
                    enable_ipv6: false,
                    bridge: None,
                })
                .await?;
            controller.stop().await?;
        }

        let controller = controller(&dir, driver, &HashMap::new()).await?;
        assert!(controller.network_by_name("host").await.is_none());
        Ok(())
    }
}
