//! Sandbox options derived from a container's networking intent.

use std::{fmt, net::IpAddr, path::PathBuf, str::FromStr};

use edgebox_utils::{HOST_HOSTS_PATH, HOST_RESOLV_CONF_PATH};
use serde::{Deserialize, Serialize};

use crate::container::{Container, NetworkMode, PortMapping};

use super::{
    resolve_extra_host, split_extra_host, InterfaceLookup, NetworkConfig, NetworkError,
    NetworkResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// One option applied when a sandbox is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum SandboxOption {
    /// Hostname written to the hosts file.
    Hostname(String),

    /// Domain name appended to the hostname.
    Domainname(String),

    /// Where the sandbox's hosts file lives.
    HostsPath(PathBuf),

    /// Where the sandbox's resolv.conf lives.
    ResolvConfPath(PathBuf),

    /// Hosts file to copy from instead of generating one.
    OriginHostsPath(PathBuf),

    /// Resolver configuration to copy from.
    OriginResolvConfPath(PathBuf),

    /// Share the host's namespace instead of creating one.
    UseDefaultSandbox,

    /// The namespace is created outside the controller and handed over by key.
    UseExternalKey,

    /// An additional `/etc/hosts` entry.
    ExtraHost {
        /// Host name.
        name: String,
        /// Address.
        ip: String,
    },

    /// A published port.
    PortBinding(PortBinding),
}

/// A transport protocol of a published port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP.
    #[default]
    Tcp,

    /// UDP.
    Udp,

    /// SCTP.
    Sctp,
}

/// A port binding as understood by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortBinding {
    /// Transport protocol.
    pub proto: Protocol,

    /// Port inside the container.
    pub port: u16,

    /// Host address, all addresses when absent.
    pub host_ip: Option<IpAddr>,

    /// First host port.
    pub host_port: u16,

    /// Last host port of a range; equals `host_port` for a single port.
    pub host_port_end: u16,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl TryFrom<&PortMapping> for PortBinding {
    type Error = NetworkError;

    fn try_from(mapping: &PortMapping) -> NetworkResult<Self> {
        let host_ip = match mapping.host_ip.as_deref() {
            None | Some("") => None,
            Some(ip) => Some(
                ip.parse::<IpAddr>()
                    .map_err(|_| NetworkError::InvalidAddress(ip.to_string()))?,
            ),
        };

        Ok(Self {
            proto: mapping.proto.parse()?,
            port: mapping.container_port,
            host_ip,
            host_port: mapping.host_port,
            host_port_end: mapping.host_port_end.unwrap_or(mapping.host_port),
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Builds the sandbox options for `container`.
///
/// Extra hosts that fail to resolve are logged and left out; they never fail the build.
pub fn build_sandbox_options(
    container: &Container,
    peers: &[Container],
    config: &NetworkConfig,
    interfaces: &dyn InterfaceLookup,
) -> NetworkResult<Vec<SandboxOption>> {
    let mut options = vec![
        SandboxOption::Hostname(container.host_name.clone()),
        SandboxOption::Domainname(container.domain_name.clone()),
    ];

    if let Some(path) = &container.hosts_path {
        options.push(SandboxOption::HostsPath(path.clone()));
    }
    if let Some(path) = &container.resolv_conf_path {
        options.push(SandboxOption::ResolvConfPath(path.clone()));
    }

    if container.network_mode() == NetworkMode::Host {
        options.push(SandboxOption::UseDefaultSandbox);
        options.push(SandboxOption::OriginHostsPath(PathBuf::from(HOST_HOSTS_PATH)));
        options.push(SandboxOption::OriginResolvConfPath(PathBuf::from(
            HOST_RESOLV_CONF_PATH,
        )));
    } else {
        options.push(SandboxOption::UseExternalKey);
    }

    for entry in &container.host_config.extra_hosts {
        let Some((name, value)) = split_extra_host(entry) else {
            tracing::warn!(
                "ignoring malformed extra host '{}' of container {}",
                entry,
                container.id
            );
            continue;
        };

        match resolve_extra_host(container, peers, config, interfaces, value) {
            Ok(ip) => options.push(SandboxOption::ExtraHost {
                name: name.to_string(),
                ip,
            }),
            Err(e) => tracing::warn!(
                "ignoring extra host '{}' of container {}: {}",
                entry,
                container.id,
                e
            ),
        }
    }

    for mapping in &container.host_config.port_mappings {
        options.push(SandboxOption::PortBinding(mapping.try_into()?));
    }

    Ok(options)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl FromStr for Protocol {
    type Err = NetworkError;

    fn from_str(s: &str) -> NetworkResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "" | "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            "sctp" => Ok(Protocol::Sctp),
            other => Err(NetworkError::InvalidAddress(format!(
                "unsupported protocol {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Udp => f.write_str("udp"),
            Protocol::Sctp => f.write_str("sctp"),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::network::{BridgeConfig, InterfaceAddress, NetworkType, ResolverResult};

    struct BridgeOnly;

    impl InterfaceLookup for BridgeOnly {
        fn addresses(&self, _name: &str) -> ResolverResult<Vec<InterfaceAddress>> {
            Ok(vec![InterfaceAddress::Ip(IpAddr::V4(Ipv4Addr::new(
                10, 0, 0, 1,
            )))])
        }
    }

    fn config() -> NetworkConfig {
        NetworkConfig::new(NetworkType::Bridge, "/meta", "/exec", BridgeConfig::default())
    }

    #[test]
    fn test_host_mode_uses_default_sandbox_and_host_files() {
        let ctr = Container::new("c1", "one")
            .with_network_mode(NetworkMode::Host)
            .with_extra_host("gw:host_ip");

        let options = build_sandbox_options(&ctr, &[], &config(), &BridgeOnly).unwrap();

        assert!(options.contains(&SandboxOption::UseDefaultSandbox));
        assert!(options.contains(&SandboxOption::OriginHostsPath("/etc/hosts".into())));
        assert!(options.contains(&SandboxOption::OriginResolvConfPath(
            "/etc/resolv.conf".into()
        )));
        assert!(!options.contains(&SandboxOption::UseExternalKey));
        // host_ip is rejected outside bridge mode, so the entry is dropped.
        assert!(!options
            .iter()
            .any(|option| matches!(option, SandboxOption::ExtraHost { .. })));
    }

    #[test]
    fn test_bridge_mode_resolves_extra_hosts_and_ports() {
        let mut ctr = Container::new("c1", "one")
            .with_host_name("one")
            .with_extra_host("alias:host_ip")
            .with_extra_host("broken")
            .with_extra_host("lit:1.2.3.4");
        ctr.host_config.port_mappings.push(PortMapping {
            proto: "udp".to_string(),
            container_port: 53,
            host_ip: Some("127.0.0.1".to_string()),
            host_port: 5353,
            host_port_end: None,
        });

        let options = build_sandbox_options(&ctr, &[], &config(), &BridgeOnly).unwrap();

        assert!(options.contains(&SandboxOption::UseExternalKey));
        assert!(options.contains(&SandboxOption::ExtraHost {
            name: "alias".to_string(),
            ip: "10.0.0.1".to_string(),
        }));
        assert!(options.contains(&SandboxOption::ExtraHost {
            name: "lit".to_string(),
            ip: "1.2.3.4".to_string(),
        }));
        assert!(options.contains(&SandboxOption::PortBinding(PortBinding {
            proto: Protocol::Udp,
            port: 53,
            host_ip: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            host_port: 5353,
            host_port_end: 5353,
        })));
    }

    #[test]
    fn test_invalid_port_mapping_fails() {
        let mut ctr = Container::new("c1", "one");
        ctr.host_config.port_mappings.push(PortMapping {
            proto: "icmp".to_string(),
            container_port: 1,
            host_ip: None,
            host_port: 1,
            host_port_end: None,
        });

        assert!(build_sandbox_options(&ctr, &[], &config(), &BridgeOnly).is_err());
    }
}
