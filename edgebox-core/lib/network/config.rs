//! Structured network configuration consumed by the network manager.

use std::{collections::BTreeMap, path::PathBuf};

use edgebox_utils::{
    CONTAINERS_SUBDIR, DEFAULT_BRIDGE_NAME, DEFAULT_EXEC_ROOT, DEFAULT_META_PATH,
    NETWORK_EXEC_SUBDIR, NETWORK_SUBDIR,
};
use getset::Getters;
use serde::{Deserialize, Serialize};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Generic driver option toggling IPv4 forwarding on the host.
pub const OPTION_ENABLE_IP_FORWARDING: &str = "EnableIPForwarding";

/// Generic driver option toggling iptables management.
pub const OPTION_ENABLE_IP_TABLES: &str = "EnableIPTables";

/// Generic driver option toggling the userland proxy for published ports.
pub const OPTION_ENABLE_USERLAND_PROXY: &str = "EnableUserlandProxy";

/// Default MTU of the bridge and its veth pairs.
pub const DEFAULT_MTU: u32 = 1500;

/// Pool used for the bridge when neither the configuration nor the interface provides one.
pub const DEFAULT_BRIDGE_POOL: &str = "172.17.0.1/16";

/// Directory holding named network namespaces.
pub const DEFAULT_NETNS_DIR: &str = "/run/netns";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The default network type of the daemon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Containers get private addresses on a bridge.
    #[default]
    Bridge,

    /// Containers share the host namespace.
    Host,
}

/// Settings of the managed Linux bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    /// Name of the Linux bridge interface.
    pub name: String,

    /// Address of the bridge in CIDR form, e.g. `172.17.0.1/16`.
    pub ipv4: Option<String>,

    /// Sub-pool containers are allocated from, in CIDR form.
    pub fixed_cidr4: Option<String>,

    /// Explicit gateway address.
    pub gateway4: Option<String>,

    /// Whether IPv6 is enabled on the bridge.
    pub enable_ipv6: bool,

    /// MTU of the bridge.
    pub mtu: u32,

    /// Whether inter-container communication is allowed.
    pub icc: bool,

    /// Whether iptables rules are managed.
    pub ip_tables: bool,

    /// Whether IPv4 forwarding is enabled on the host.
    pub ip_forward: bool,

    /// Whether outgoing traffic is masqueraded.
    pub ip_masquerade: bool,

    /// Whether the userland proxy serves published ports.
    pub userland_proxy: bool,
}

/// The network manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct NetworkConfig {
    /// Default network type.
    net_type: NetworkType,

    /// Root for persisted network state and per-container network files.
    meta_path: PathBuf,

    /// Root for runtime network state.
    exec_root: PathBuf,

    /// Directory holding named network namespaces.
    netns_dir: PathBuf,

    /// The default bridge.
    default_bridge: BridgeConfig,
}

/// Options handed to the bridge driver when the bridge network is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverOptions {
    /// Generic driver switches keyed by option name.
    pub generic: BTreeMap<String, bool>,

    /// Control-plane MTU.
    pub mtu: u32,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl NetworkConfig {
    /// Create a new network configuration.
    pub fn new(
        net_type: NetworkType,
        meta_path: impl Into<PathBuf>,
        exec_root: impl Into<PathBuf>,
        default_bridge: BridgeConfig,
    ) -> Self {
        Self {
            net_type,
            meta_path: meta_path.into(),
            exec_root: exec_root.into(),
            netns_dir: PathBuf::from(DEFAULT_NETNS_DIR),
            default_bridge,
        }
    }

    /// Overrides the directory holding network namespaces.
    pub fn with_netns_dir(mut self, netns_dir: impl Into<PathBuf>) -> Self {
        self.netns_dir = netns_dir.into();
        self
    }

    /// Directory holding per-container network files.
    pub fn container_dir(&self, container_id: &str) -> PathBuf {
        self.meta_path.join(CONTAINERS_SUBDIR).join(container_id)
    }

    /// Directory holding the controller's persisted state.
    pub fn controller_meta_dir(&self) -> PathBuf {
        self.meta_path.join(NETWORK_SUBDIR)
    }

    /// Directory holding the controller's runtime state.
    pub fn controller_exec_dir(&self) -> PathBuf {
        self.exec_root.join(NETWORK_EXEC_SUBDIR)
    }

    /// Driver options for the bridge network.
    pub fn driver_options(&self) -> DriverOptions {
        let bridge = &self.default_bridge;
        let mut generic = BTreeMap::new();
        generic.insert(OPTION_ENABLE_IP_FORWARDING.to_string(), bridge.ip_forward);
        generic.insert(OPTION_ENABLE_IP_TABLES.to_string(), bridge.ip_tables);
        generic.insert(
            OPTION_ENABLE_USERLAND_PROXY.to_string(),
            bridge.userland_proxy,
        );

        DriverOptions {
            generic,
            mtu: bridge.mtu,
        }
    }
}

impl DriverOptions {
    /// Value of a generic switch, `false` when absent.
    pub fn is_enabled(&self, option: &str) -> bool {
        self.generic.get(option).copied().unwrap_or(false)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_BRIDGE_NAME.to_string(),
            ipv4: None,
            fixed_cidr4: None,
            gateway4: None,
            enable_ipv6: false,
            mtu: DEFAULT_MTU,
            icc: true,
            ip_tables: true,
            ip_forward: true,
            ip_masquerade: true,
            userland_proxy: false,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::new(
            NetworkType::Bridge,
            DEFAULT_META_PATH.to_owned(),
            DEFAULT_EXEC_ROOT.to_owned(),
            BridgeConfig::default(),
        )
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
