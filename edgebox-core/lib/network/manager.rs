//! The container network manager.

use std::{
    collections::HashMap,
    net::Ipv4Addr,
    os::unix::fs::PermissionsExt,
    sync::Arc,
};

use async_trait::async_trait;
use edgebox_utils::{
    ensure_dir_with_mode, DEFAULT_BRIDGE_NETWORK, DEFAULT_HOST_NETWORK, HOSTNAME_FILENAME,
    HOSTS_FILENAME, RESOLV_CONF_FILENAME,
};
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use tokio::{
    fs,
    sync::{OnceCell, RwLock},
};

use crate::container::{Container, EndpointSettings, NetworkMode, NetworkSettings};

use super::{
    build_sandbox_options,
    controller::{
        first_host, is_global_unicast, BridgeRecord, EndpointCreate, LinkDriver,
        NetworkController, NetworkCreate,
    },
    os_hostname, InterfaceLookup, NetworkConfig, NetworkError, NetworkResult, NetworkType,
    SandboxOption, DEFAULT_BRIDGE_POOL,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const EXEC_DIR_MODE: u32 = 0o777;

const META_DIR_MODE: u32 = 0o755;

const HOSTNAME_FILE_MODE: u32 = 0o644;

const ENDPOINT_SUFFIX: &str = "-ep";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Received and transmitted bytes of a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkMetrics {
    /// Bytes received.
    pub rx: u64,

    /// Bytes transmitted.
    pub tx: u64,
}

/// Manages the network presence of containers.
///
/// Operations on one container are serialized by the caller; operations on different containers
/// may run concurrently.
#[async_trait]
pub trait NetworkManager: Send + Sync {
    /// Creates the default host and bridge networks. Runs once, after [`restore`].
    ///
    /// [`restore`]: NetworkManager::restore
    async fn initialize(&self) -> NetworkResult<()>;

    /// Creates the controller, re-adopting the sandboxes of the given running containers.
    async fn restore(&self, containers: &[Container]) -> NetworkResult<()>;

    /// Creates the container's network files and a fresh sandbox.
    async fn manage(&self, container: &mut Container, peers: &[Container]) -> NetworkResult<()>;

    /// Attaches the container's sandbox to the network named by its mode.
    async fn connect(&self, container: &mut Container) -> NetworkResult<()>;

    /// Detaches the container from the network named by its mode.
    async fn disconnect(&self, container: &mut Container, force: bool) -> NetworkResult<()>;

    /// Releases every endpoint and the sandbox of the container.
    async fn release_network_resources(&self, container: &mut Container) -> NetworkResult<()>;

    /// Sums received and transmitted bytes over the container's interfaces.
    async fn metrics(&self, container: &Container) -> NetworkResult<NetworkMetrics>;

    /// Stops the controller.
    async fn dispose(&self) -> NetworkResult<()>;
}

/// The [`NetworkManager`] backed by the in-process [`NetworkController`].
pub struct LocalNetworkManager {
    config: NetworkConfig,
    driver: Arc<dyn LinkDriver>,
    interfaces: Arc<dyn InterfaceLookup>,
    controller: OnceCell<Arc<NetworkController>>,
    active_sandboxes: RwLock<HashMap<String, Vec<SandboxOption>>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LocalNetworkManager {
    /// Creates a manager. The controller is created by [`NetworkManager::restore`].
    pub fn new(
        config: NetworkConfig,
        driver: Arc<dyn LinkDriver>,
        interfaces: Arc<dyn InterfaceLookup>,
    ) -> Self {
        Self {
            config,
            driver,
            interfaces,
            controller: OnceCell::new(),
            active_sandboxes: RwLock::new(HashMap::new()),
        }
    }

    /// The manager's configuration.
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// The sandboxes re-adopted during restore, keyed by sandbox id.
    pub async fn active_sandboxes(&self) -> HashMap<String, Vec<SandboxOption>> {
        self.active_sandboxes.read().await.clone()
    }

    fn controller(&self) -> NetworkResult<&Arc<NetworkController>> {
        self.controller
            .get()
            .ok_or(NetworkError::ControllerNotInitialized)
    }

    async fn ensure_host_network(&self, controller: &NetworkController) -> NetworkResult<()> {
        if controller
            .network_by_name(DEFAULT_HOST_NETWORK)
            .await
            .is_some()
        {
            return Ok(());
        }

        controller
            .new_network(NetworkCreate {
                name: DEFAULT_HOST_NETWORK.to_string(),
                net_type: NetworkType::Host,
                persist: true,
                enable_ipv6: false,
                bridge: None,
            })
            .await?;
        Ok(())
    }

    async fn recreate_bridge_network(&self, controller: &NetworkController) -> NetworkResult<()> {
        let bridge = self.config.get_default_bridge();

        for name in [bridge.name.as_str(), DEFAULT_BRIDGE_NETWORK] {
            if let Some(network) = controller.network_by_name(name).await {
                tracing::info!("removing existing network {} ({})", network.name, network.id);
                controller.delete_network(&network.id).await?;
            }
        }

        let elected = self.driver.link_ipv4(&bridge.name).await?;
        self.driver.delete_link(&bridge.name).await?;

        if *self.config.get_net_type() == NetworkType::Host {
            tracing::info!("default network type is host, not creating the bridge network");
            return Ok(());
        }

        let record = self.bridge_record(elected)?;
        tracing::info!(
            "creating bridge network on {} with pool {} and gateway {}",
            record.interface,
            record.pool,
            record.gateway
        );

        controller
            .new_network(NetworkCreate {
                name: DEFAULT_BRIDGE_NETWORK.to_string(),
                net_type: NetworkType::Bridge,
                persist: true,
                enable_ipv6: bridge.enable_ipv6,
                bridge: Some(record),
            })
            .await?;

        Ok(())
    }

    /// Elects pool and gateway: the configured fixed CIDR, then the configured address, then the
    /// address found on the interface, then the default pool.
    fn bridge_record(&self, elected: Option<Ipv4Network>) -> NetworkResult<BridgeRecord> {
        let bridge = self.config.get_default_bridge();

        let configured_ipv4 = bridge.ipv4.as_deref().map(parse_network).transpose()?;
        let host_address = configured_ipv4.or(elected);
        let pool = match bridge.fixed_cidr4.as_deref().map(parse_network).transpose()? {
            Some(pool) => pool,
            None => match host_address {
                Some(address) => address,
                None => parse_network(DEFAULT_BRIDGE_POOL)?,
            },
        };
        let pool = Ipv4Network::new(pool.network(), pool.prefix())
            .map_err(|e| NetworkError::InvalidAddress(e.to_string()))?;

        let gateway = match bridge.gateway4.as_deref() {
            Some(gateway) => gateway
                .parse::<Ipv4Addr>()
                .map_err(|e| NetworkError::InvalidAddress(format!("{}: {}", gateway, e)))?,
            None => host_address
                .map(|address| address.ip())
                .filter(|ip| is_global_unicast(*ip) && *ip != pool.network())
                .or_else(|| first_host(pool))
                .ok_or_else(|| NetworkError::InvalidAddress(format!("pool {} is empty", pool)))?,
        };

        Ok(BridgeRecord {
            interface: bridge.name.clone(),
            pool,
            gateway,
            mtu: bridge.mtu,
            masquerade: bridge.ip_masquerade,
            options: self.config.driver_options(),
        })
    }

    async fn write_hostname_file(&self, container: &Container) -> NetworkResult<()> {
        let path = self
            .config
            .container_dir(&container.id)
            .join(HOSTNAME_FILENAME);
        fs::write(&path, format!("{}\n", container.host_name)).await?;
        fs::set_permissions(&path, std::fs::Permissions::from_mode(HOSTNAME_FILE_MODE)).await?;
        Ok(())
    }

    async fn sandbox_id_of(&self, container: &Container) -> NetworkResult<String> {
        if let Some(settings) = &container.network_settings {
            if !settings.sandbox_id.is_empty() {
                return Ok(settings.sandbox_id.clone());
            }
        }

        self.controller()?
            .sandbox_by_container(&container.id)
            .await
            .map(|sandbox| sandbox.id)
            .ok_or_else(|| NetworkError::SandboxNotFound(container.id.clone()))
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl NetworkManager for LocalNetworkManager {
    async fn initialize(&self) -> NetworkResult<()> {
        let controller = self.controller()?;
        self.ensure_host_network(controller).await?;

        if !self.active_sandboxes.read().await.is_empty() {
            let bridge = self.config.get_default_bridge();
            match controller.network_by_name(DEFAULT_BRIDGE_NETWORK).await {
                Some(network) if self.driver.link_exists(&bridge.name).await? => {
                    tracing::info!("keeping bridge network {} for restored sandboxes", network.id);
                    return Ok(());
                }
                Some(_) => {
                    tracing::warn!(
                        "bridge interface {} is missing, recreating the bridge network",
                        bridge.name
                    );
                }
                None => {
                    tracing::warn!("no bridge network found for restored sandboxes, recreating it");
                }
            }
        }

        self.recreate_bridge_network(controller).await
    }

    async fn restore(&self, containers: &[Container]) -> NetworkResult<()> {
        let mut active = HashMap::new();
        for container in containers {
            let Some(settings) = container
                .network_settings
                .as_ref()
                .filter(|settings| !settings.sandbox_id.is_empty())
            else {
                tracing::warn!(
                    "container {} has no sandbox, not restoring its network",
                    container.id
                );
                continue;
            };

            match build_sandbox_options(container, containers, &self.config, &*self.interfaces) {
                Ok(options) => {
                    active.insert(settings.sandbox_id.clone(), options);
                }
                Err(e) => {
                    tracing::warn!(
                        "skipping sandbox {} of container {}: {}",
                        settings.sandbox_id,
                        container.id,
                        e
                    );
                }
            }
        }

        ensure_dir_with_mode(&self.config.controller_meta_dir(), META_DIR_MODE)?;
        ensure_dir_with_mode(&self.config.controller_exec_dir(), EXEC_DIR_MODE)?;

        let controller = NetworkController::new(
            self.config.controller_meta_dir(),
            self.config.get_netns_dir().clone(),
            self.driver.clone(),
            &active,
        )
        .await?;

        tracing::info!(
            "network controller {} restored {} sandbox(es)",
            controller.id(),
            active.len()
        );

        *self.active_sandboxes.write().await = active;
        self.controller
            .set(Arc::new(controller))
            .map_err(|_| NetworkError::DriverError("network controller already created".into()))
    }

    async fn manage(&self, container: &mut Container, peers: &[Container]) -> NetworkResult<()> {
        let controller = self.controller()?;

        if container.network_mode() == NetworkMode::Host {
            container.host_name = os_hostname()?;
        }

        let dir = self.config.container_dir(&container.id);
        ensure_dir_with_mode(&dir, META_DIR_MODE)?;
        self.write_hostname_file(container).await?;

        container.hostname_path = Some(dir.join(HOSTNAME_FILENAME));
        container.resolv_conf_path = Some(dir.join(RESOLV_CONF_FILENAME));
        container.hosts_path = Some(dir.join(HOSTS_FILENAME));

        if let Some(stale) = controller.sandbox_by_container(&container.id).await {
            tracing::debug!("deleting stale sandbox {} of {}", stale.id, container.id);
            controller.delete_sandbox(&stale.id).await?;
        }

        let options = build_sandbox_options(container, peers, &self.config, &*self.interfaces)?;
        let sandbox = controller.new_sandbox(&container.id, &options).await?;

        let settings = container
            .network_settings
            .get_or_insert_with(NetworkSettings::default);
        settings.sandbox_id = sandbox.id.clone();
        settings.sandbox_key = sandbox
            .key
            .as_ref()
            .map(|key| key.display().to_string())
            .unwrap_or_default();
        settings.network_controller_id = controller.id().to_string();

        tracing::info!("container {} sandboxed in {}", container.id, sandbox.id);
        Ok(())
    }

    async fn connect(&self, container: &mut Container) -> NetworkResult<()> {
        let controller = self.controller()?;
        let mode = container.network_mode().as_str();

        let network = controller
            .network_by_name(mode)
            .await
            .ok_or_else(|| NetworkError::NetworkNotFound(mode.to_string()))?;
        let sandbox_id = self.sandbox_id_of(container).await?;
        let sandbox = controller
            .sandbox(&sandbox_id)
            .await
            .ok_or_else(|| NetworkError::SandboxNotFound(container.id.clone()))?;

        let stale = container
            .network_settings
            .as_ref()
            .and_then(|settings| settings.networks.get(mode))
            .map(|endpoint| endpoint.id.clone())
            .filter(|id| !id.is_empty());
        if let Some(stale) = stale {
            if controller.endpoint(&stale).await.is_some() {
                tracing::debug!("deleting stale endpoint {} of {}", stale, container.id);
                controller.delete_endpoint(&stale, true).await?;
            }
        }

        let name = format!("{}{}", container.id, ENDPOINT_SUFFIX);
        if let Some(leftover) = controller.endpoint_by_name(&network.id, &name).await {
            controller.delete_endpoint(&leftover.id, true).await?;
        }

        let endpoint = controller
            .create_endpoint(
                &network.id,
                &name,
                EndpointCreate {
                    anonymous: true,
                    disable_resolution: true,
                },
            )
            .await?;

        let joined = match controller.join(&endpoint.id, &sandbox.id).await {
            Ok(joined) => joined,
            Err(e) => {
                if let Err(cleanup) = controller.delete_endpoint(&endpoint.id, true).await {
                    tracing::warn!("failed to delete endpoint {}: {}", endpoint.id, cleanup);
                }
                if let Some(settings) = container.network_settings.as_mut() {
                    settings.networks.remove(mode);
                }
                return Err(e);
            }
        };

        let settings = container
            .network_settings
            .get_or_insert_with(NetworkSettings::default);
        settings.sandbox_id = sandbox.id.clone();
        settings.sandbox_key = sandbox
            .key
            .as_ref()
            .map(|key| key.display().to_string())
            .unwrap_or_default();
        settings.network_controller_id = controller.id().to_string();
        settings.networks.insert(
            mode.to_string(),
            EndpointSettings {
                id: joined.id.clone(),
                gateway: joined.gateway.map(|ip| ip.to_string()).unwrap_or_default(),
                ip_address: joined.ip().map(|ip| ip.to_string()).unwrap_or_default(),
                mac_address: joined.mac.clone().unwrap_or_default(),
                network_id: network.id.clone(),
            },
        );

        tracing::info!(
            "container {} connected to {} as {}",
            container.id,
            network.name,
            joined.id
        );
        Ok(())
    }

    async fn disconnect(&self, container: &mut Container, force: bool) -> NetworkResult<()> {
        let controller = self.controller()?;
        let mode = container.network_mode().as_str();

        let endpoint_id = container
            .network_settings
            .as_ref()
            .and_then(|settings| settings.networks.get(mode))
            .map(|endpoint| endpoint.id.clone())
            .ok_or_else(|| NetworkError::NotConnected(container.id.clone(), mode.to_string()))?;

        match controller.endpoint(&endpoint_id).await {
            Some(endpoint) => {
                if let Some(sandbox_id) = &endpoint.sandbox_id {
                    if let Err(e) = controller.leave(&endpoint_id, sandbox_id).await {
                        if !force {
                            return Err(e);
                        }
                        tracing::warn!("forcing disconnect of {}: {}", container.id, e);
                    }
                }
                controller.delete_endpoint(&endpoint_id, force).await?;
            }
            None if force => {}
            None => return Err(NetworkError::EndpointNotFound(endpoint_id)),
        }

        if let Some(settings) = container.network_settings.as_mut() {
            settings.networks.remove(mode);
        }
        Ok(())
    }

    async fn release_network_resources(&self, container: &mut Container) -> NetworkResult<()> {
        let result = release(self, container).await;
        container.network_settings = None;
        result
    }

    async fn metrics(&self, container: &Container) -> NetworkResult<NetworkMetrics> {
        let controller = self.controller()?;
        let sandbox_id = self.sandbox_id_of(container).await?;

        let metrics = controller
            .statistics(&sandbox_id)
            .await?
            .into_iter()
            .fold(NetworkMetrics::default(), |sum, statistics| NetworkMetrics {
                rx: sum.rx + statistics.rx_bytes,
                tx: sum.tx + statistics.tx_bytes,
            });

        Ok(metrics)
    }

    async fn dispose(&self) -> NetworkResult<()> {
        if let Some(controller) = self.controller.get() {
            controller.stop().await?;
        }
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn release(manager: &LocalNetworkManager, container: &Container) -> NetworkResult<()> {
    let controller = manager.controller()?;

    let Some(settings) = &container.network_settings else {
        if let Some(orphan) = controller.sandbox_by_container(&container.id).await {
            controller.delete_sandbox(&orphan.id).await?;
        }
        return Ok(());
    };

    let sandbox = controller
        .sandbox(&settings.sandbox_id)
        .await
        .ok_or_else(|| NetworkError::SandboxNotFound(container.id.clone()))?;

    for endpoint in settings.networks.values() {
        if !sandbox.endpoints.contains(&endpoint.id) {
            continue;
        }
        controller.leave(&endpoint.id, &sandbox.id).await?;
        controller.delete_endpoint(&endpoint.id, false).await?;
    }

    let remaining = controller
        .sandbox(&sandbox.id)
        .await
        .map(|sandbox| sandbox.endpoints.len())
        .unwrap_or_default();
    if remaining == 0 {
        controller.delete_sandbox(&sandbox.id).await?;
    }

    tracing::info!("released network resources of {}", container.id);
    Ok(())
}

fn parse_network(value: &str) -> NetworkResult<Ipv4Network> {
    value
        .parse()
        .map_err(|e| NetworkError::InvalidAddress(format!("{}: {}", value, e)))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
