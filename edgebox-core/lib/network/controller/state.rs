//! Persisted controller state: networks, sandboxes and endpoints.

use std::{
    collections::BTreeMap,
    net::Ipv4Addr,
    path::{Path, PathBuf},
};

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::network::{DriverOptions, NetworkResult, NetworkType, PortBinding, SandboxOption};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A network known to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRecord {
    /// Network id.
    pub id: String,

    /// Network name, unique per controller.
    pub name: String,

    /// Driver type.
    pub net_type: NetworkType,

    /// Whether IPv6 is enabled.
    pub enable_ipv6: bool,

    /// Whether the network survives a daemon restart.
    pub persist: bool,

    /// Bridge settings, for bridge networks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<BridgeRecord>,
}

/// Settings of a bridge network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRecord {
    /// Linux bridge interface name.
    pub interface: String,

    /// Address pool.
    pub pool: Ipv4Network,

    /// Gateway, assigned to the bridge interface.
    pub gateway: Ipv4Addr,

    /// Link MTU.
    pub mtu: u32,

    /// Whether outgoing traffic is masqueraded.
    pub masquerade: bool,

    /// Driver switches.
    pub options: DriverOptions,
}

/// The configuration a sandbox was created with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxConfig {
    /// Hostname.
    pub hostname: String,

    /// Domain name.
    pub domainname: String,

    /// Hosts file path.
    pub hosts_path: Option<PathBuf>,

    /// resolv.conf path.
    pub resolv_conf_path: Option<PathBuf>,

    /// Hosts file to copy from.
    pub origin_hosts_path: Option<PathBuf>,

    /// resolv.conf to copy from.
    pub origin_resolv_conf_path: Option<PathBuf>,

    /// Shares the host namespace.
    pub use_default_sandbox: bool,

    /// Namespace handed over by key.
    pub use_external_key: bool,

    /// Extra hosts entries as `(name, ip)`.
    pub extra_hosts: Vec<(String, String)>,

    /// Published ports.
    pub port_bindings: Vec<PortBinding>,
}

/// A sandbox known to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxRecord {
    /// Sandbox id.
    pub id: String,

    /// Container the sandbox belongs to.
    pub container_id: String,

    /// Namespace path; absent for the default (host) sandbox.
    pub key: Option<PathBuf>,

    /// Creation options.
    pub config: SandboxConfig,

    /// Joined endpoint ids in join order.
    pub endpoints: Vec<String>,
}

/// An endpoint known to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRecord {
    /// Endpoint id.
    pub id: String,

    /// Endpoint name.
    pub name: String,

    /// Network the endpoint belongs to.
    pub network_id: String,

    /// Sandbox the endpoint is joined to.
    pub sandbox_id: Option<String>,

    /// Address with prefix length, for bridge endpoints.
    pub address: Option<Ipv4Network>,

    /// Gateway, for bridge endpoints.
    pub gateway: Option<Ipv4Addr>,

    /// MAC address, for bridge endpoints.
    pub mac: Option<String>,

    /// Host side of the veth pair, for bridge endpoints.
    pub host_interface: Option<String>,

    /// Excluded from service discovery.
    pub anonymous: bool,

    /// Name resolution disabled.
    pub disable_resolution: bool,
}

/// Everything the controller persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ControllerState {
    pub(crate) id: String,
    pub(crate) networks: BTreeMap<String, NetworkRecord>,
    pub(crate) sandboxes: BTreeMap<String, SandboxRecord>,
    pub(crate) endpoints: BTreeMap<String, EndpointRecord>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SandboxConfig {
    /// Folds a list of options into a configuration. Later options win.
    pub fn from_options(options: &[SandboxOption]) -> Self {
        let mut config = Self::default();
        for option in options {
            match option {
                SandboxOption::Hostname(name) => config.hostname = name.clone(),
                SandboxOption::Domainname(name) => config.domainname = name.clone(),
                SandboxOption::HostsPath(path) => config.hosts_path = Some(path.clone()),
                SandboxOption::ResolvConfPath(path) => {
                    config.resolv_conf_path = Some(path.clone())
                }
                SandboxOption::OriginHostsPath(path) => {
                    config.origin_hosts_path = Some(path.clone())
                }
                SandboxOption::OriginResolvConfPath(path) => {
                    config.origin_resolv_conf_path = Some(path.clone())
                }
                SandboxOption::UseDefaultSandbox => config.use_default_sandbox = true,
                SandboxOption::UseExternalKey => config.use_external_key = true,
                SandboxOption::ExtraHost { name, ip } => {
                    config.extra_hosts.push((name.clone(), ip.clone()))
                }
                SandboxOption::PortBinding(binding) => config.port_bindings.push(binding.clone()),
            }
        }
        config
    }
}

impl EndpointRecord {
    /// The endpoint's IPv4 address without prefix.
    pub fn ip(&self) -> Option<Ipv4Addr> {
        self.address.map(|address| address.ip())
    }
}

impl ControllerState {
    pub(crate) fn new(id: String) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Loads state from `path`; a missing file yields `None`.
    pub(crate) async fn load(path: &Path) -> NetworkResult<Option<Self>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes persistent networks and all sandboxes/endpoints to `path` atomically.
    pub(crate) async fn save(&self, path: &Path) -> NetworkResult<()> {
        let mut persisted = self.clone();
        persisted.networks.retain(|_, network| network.persist);

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&persisted)?).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    pub(crate) fn network_by_name(&self, name: &str) -> Option<&NetworkRecord> {
        self.networks.values().find(|network| network.name == name)
    }

    pub(crate) fn sandbox_by_container(&self, container_id: &str) -> Option<&SandboxRecord> {
        self.sandboxes
            .values()
            .find(|sandbox| sandbox.container_id == container_id)
    }

    pub(crate) fn used_addresses(&self, network_id: &str) -> Vec<Ipv4Addr> {
        self.endpoints
            .values()
            .filter(|endpoint| endpoint.network_id == network_id)
            .filter_map(EndpointRecord::ip)
            .collect()
    }
}
