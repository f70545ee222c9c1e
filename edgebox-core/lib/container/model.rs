//! The container record, restricted to what the daemon needs to supervise and network it.

use std::{collections::HashMap, fmt, path::PathBuf, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EdgeboxError, EdgeboxResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A container managed by the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Unique container id.
    pub id: String,

    /// Human readable name.
    #[serde(default)]
    pub name: String,

    /// Image reference the container runs.
    #[serde(default)]
    pub image: String,

    /// Hostname inside the container.
    #[serde(default)]
    pub host_name: String,

    /// Domain name inside the container.
    #[serde(default)]
    pub domain_name: String,

    /// Networking intent.
    #[serde(default)]
    pub host_config: HostConfig,

    /// Path of the container's resolv.conf on the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolv_conf_path: Option<PathBuf>,

    /// Path of the container's hosts file on the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosts_path: Option<PathBuf>,

    /// Path of the container's hostname file on the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname_path: Option<PathBuf>,

    /// Runtime network state, written by the network manager.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_settings: Option<NetworkSettings>,

    /// Lifecycle state.
    #[serde(default)]
    pub state: ContainerState,

    /// Creation time.
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
}

/// How a container wants to be networked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    /// Network disposition.
    #[serde(default)]
    pub network_mode: NetworkMode,

    /// Entries of the form `name:value` injected into the container's hosts file.
    #[serde(default)]
    pub extra_hosts: Vec<String>,

    /// Published ports.
    #[serde(default)]
    pub port_mappings: Vec<PortMapping>,
}

/// The network disposition of a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// A private address on the managed bridge.
    #[default]
    Bridge,

    /// The host's network namespace.
    Host,

    /// No networking at all.
    None,
}

/// A published port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    /// Transport protocol, `tcp` when absent.
    #[serde(default = "default_proto")]
    pub proto: String,

    /// Port inside the container.
    pub container_port: u16,

    /// Host address to bind, all addresses when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,

    /// First host port.
    pub host_port: u16,

    /// Last host port of a range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port_end: Option<u16>,
}

/// Runtime network state of a container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSettings {
    /// The sandbox the container's endpoints are joined to.
    pub sandbox_id: String,

    /// The namespace key of the sandbox.
    #[serde(default)]
    pub sandbox_key: String,

    /// Id of the controller that created the sandbox.
    #[serde(default)]
    pub network_controller_id: String,

    /// Endpoints keyed by network name.
    #[serde(default)]
    pub networks: HashMap<String, EndpointSettings>,
}

/// One endpoint attachment of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSettings {
    /// Endpoint id.
    pub id: String,

    /// Gateway address.
    #[serde(default)]
    pub gateway: String,

    /// IPv4 address, without prefix.
    #[serde(default)]
    pub ip_address: String,

    /// MAC address.
    #[serde(default)]
    pub mac_address: String,

    /// Id of the network the endpoint belongs to.
    #[serde(default)]
    pub network_id: String,
}

/// Lifecycle state of a container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerState {
    /// Current status.
    pub status: ContainerStatus,

    /// Process id of the container task, when running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    /// Last start time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Last stop time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Status of a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// Created but never started.
    #[default]
    Created,

    /// Running.
    Running,

    /// Stopped by request.
    Stopped,

    /// Exited on its own.
    Exited,

    /// In an unrecoverable state.
    Dead,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Container {
    /// Creates a container record with the given id and name and default networking.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image: String::new(),
            host_name: String::new(),
            domain_name: String::new(),
            host_config: HostConfig::default(),
            resolv_conf_path: None,
            hosts_path: None,
            hostname_path: None,
            network_settings: None,
            state: ContainerState::default(),
            created: Utc::now(),
        }
    }

    /// Sets the network mode.
    pub fn with_network_mode(mut self, mode: NetworkMode) -> Self {
        self.host_config.network_mode = mode;
        self
    }

    /// Sets the hostname.
    pub fn with_host_name(mut self, host_name: impl Into<String>) -> Self {
        self.host_name = host_name.into();
        self
    }

    /// Adds an extra-host entry of the form `name:value`.
    pub fn with_extra_host(mut self, entry: impl Into<String>) -> Self {
        self.host_config.extra_hosts.push(entry.into());
        self
    }

    /// Shorthand for the configured network mode.
    pub fn network_mode(&self) -> NetworkMode {
        self.host_config.network_mode
    }

    /// Whether the container is currently running.
    pub fn is_running(&self) -> bool {
        self.state.status == ContainerStatus::Running
    }

    /// The IPv4 address of the container on the named network, if connected.
    pub fn ip_address_on(&self, network: &str) -> Option<&str> {
        self.network_settings
            .as_ref()
            .and_then(|settings| settings.networks.get(network))
            .map(|endpoint| endpoint.ip_address.as_str())
            .filter(|ip| !ip.is_empty())
    }
}

impl NetworkMode {
    /// The name of the network this mode attaches to.
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkMode::Bridge => "bridge",
            NetworkMode::Host => "host",
            NetworkMode::None => "none",
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkMode {
    type Err = EdgeboxError;

    fn from_str(s: &str) -> EdgeboxResult<Self> {
        match s {
            "bridge" | "" => Ok(NetworkMode::Bridge),
            "host" => Ok(NetworkMode::Host),
            "none" => Ok(NetworkMode::None),
            other => Err(EdgeboxError::InvalidConfig(format!(
                "unknown network mode: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Stopped => "stopped",
            ContainerStatus::Exited => "exited",
            ContainerStatus::Dead => "dead",
        };
        f.write_str(s)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn default_proto() -> String {
    "tcp".to_string()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_deserializes_with_defaults() -> anyhow::Result<()> {
        let ctr: Container = serde_json::from_str(
            r#"{
                "id": "c1",
                "hostConfig": {
                    "networkMode": "host",
                    "extraHosts": ["gw:host_ip"],
                    "portMappings": [{"containerPort": 80, "hostPort": 8080}]
                }
            }"#,
        )?;

        assert_eq!(ctr.network_mode(), NetworkMode::Host);
        assert_eq!(ctr.host_config.port_mappings[0].proto, "tcp");
        assert_eq!(ctr.state.status, ContainerStatus::Created);
        assert!(ctr.network_settings.is_none());
        Ok(())
    }

    #[test]
    fn test_ip_address_on_ignores_empty_addresses() {
        let mut ctr = Container::new("c1", "one");
        assert_eq!(ctr.ip_address_on("bridge"), None);

        let mut settings = NetworkSettings::default();
        settings.networks.insert(
            "bridge".to_string(),
            EndpointSettings {
                id: "ep".to_string(),
                ip_address: String::new(),
                ..Default::default()
            },
        );
        ctr.network_settings = Some(settings);
        assert_eq!(ctr.ip_address_on("bridge"), None);

        if let Some(settings) = ctr.network_settings.as_mut() {
            settings.networks.get_mut("bridge").unwrap().ip_address = "172.17.0.2".to_string();
        }
        assert_eq!(ctr.ip_address_on("bridge"), Some("172.17.0.2"));
    }

    #[test]
    fn test_network_mode_parse() {
        assert_eq!("host".parse::<NetworkMode>().unwrap(), NetworkMode::Host);
        assert_eq!("".parse::<NetworkMode>().unwrap(), NetworkMode::Bridge);
        assert!("overlay".parse::<NetworkMode>().is_err());
    }
}
