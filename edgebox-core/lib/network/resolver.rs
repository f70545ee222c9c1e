//! Resolution of symbolic `extraHosts` values.
//!
//! An extra-host entry has the form `name:value`. The value is either a literal address or one
//! of the symbolic forms below, tried in order:
//!
//! | Value | Resolves to |
//! |-------|-------------|
//! | `host_ip_<ifname>` | IPv4 of host interface `<ifname>` |
//! | `host_ip` | IPv4 of the managed bridge (bridge-mode containers only) |
//! | `container_<hostname>` | bridge address of the one other bridge-mode container named `<hostname>` |
//! | anything else | the value unchanged |

use edgebox_utils::DEFAULT_BRIDGE_NETWORK;

use crate::container::{Container, NetworkMode};

use super::{InterfaceLookup, NetworkConfig, ResolverError, ResolverResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const HOST_IP: &str = "host_ip";

const HOST_IP_IFACE_PREFIX: &str = "host_ip_";

const CONTAINER_PREFIX: &str = "container_";

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Resolves the value part of an extra-host entry for `container`.
///
/// `peers` is the full container set; `container` itself may be part of it and is never matched.
pub fn resolve_extra_host(
    container: &Container,
    peers: &[Container],
    config: &NetworkConfig,
    interfaces: &dyn InterfaceLookup,
    value: &str,
) -> ResolverResult<String> {
    if let Some(ifname) = value.strip_prefix(HOST_IP_IFACE_PREFIX) {
        if ifname.is_empty() {
            return Err(ResolverError::InterfaceNameRequired);
        }
        return Ok(interfaces.ipv4_of(ifname)?.to_string());
    }

    if value == HOST_IP {
        if container.network_mode() != NetworkMode::Bridge {
            return Err(ResolverError::HostIpRequiresBridgeMode);
        }
        let bridge = &config.get_default_bridge().name;
        return Ok(interfaces.ipv4_of(bridge)?.to_string());
    }

    if container.network_mode() == NetworkMode::Bridge {
        if let Some(host_name) = value.strip_prefix(CONTAINER_PREFIX) {
            return resolve_container(container, peers, host_name);
        }
    }

    Ok(value.to_string())
}

/// Splits an extra-host entry into its name and value at the first `:`.
pub fn split_extra_host(entry: &str) -> Option<(&str, &str)> {
    entry
        .split_once(':')
        .filter(|(name, value)| !name.is_empty() && !value.is_empty())
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn resolve_container(
    container: &Container,
    peers: &[Container],
    host_name: &str,
) -> ResolverResult<String> {
    let matches: Vec<&Container> = peers
        .iter()
        .filter(|peer| peer.id != container.id && peer.host_name == host_name)
        .collect();

    let peer = match matches.as_slice() {
        [] => return Err(ResolverError::ContainerNotFound(host_name.to_string())),
        [peer] => *peer,
        many => {
            return Err(ResolverError::AmbiguousContainer(
                host_name.to_string(),
                many.len(),
            ))
        }
    };

    if peer.network_mode() != NetworkMode::Bridge {
        return Err(ResolverError::ContainerNotInBridgeMode(host_name.to_string()));
    }

    peer.ip_address_on(DEFAULT_BRIDGE_NETWORK)
        .map(str::to_string)
        .ok_or_else(|| ResolverError::ContainerNotConnected(host_name.to_string()))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
