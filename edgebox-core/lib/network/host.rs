//! Host-side lookups: interface addresses and the host name.

use std::net::{IpAddr, Ipv4Addr};

use nix::{ifaddrs, sys::socket::SockaddrLike};

use super::{NetworkResult, ResolverError, ResolverResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// One address reported for a host interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterfaceAddress {
    /// An IPv4 or IPv6 address.
    Ip(IpAddr),

    /// An address of another family, named by the family.
    Other(String),
}

/// Enumerates the addresses of host interfaces.
pub trait InterfaceLookup: Send + Sync {
    /// Returns every address of `name`, or [`ResolverError::InterfaceNotFound`].
    fn addresses(&self, name: &str) -> ResolverResult<Vec<InterfaceAddress>>;

    /// Returns the first non-loopback IPv4 address of `name`.
    fn ipv4_of(&self, name: &str) -> ResolverResult<Ipv4Addr> {
        for address in self.addresses(name)? {
            match address {
                InterfaceAddress::Ip(IpAddr::V4(ip)) if !ip.is_loopback() => return Ok(ip),
                InterfaceAddress::Ip(_) => continue,
                InterfaceAddress::Other(family) => {
                    return Err(ResolverError::UnsupportedAddressFamily(
                        name.to_string(),
                        family,
                    ))
                }
            }
        }

        Err(ResolverError::NoSuitableAddress(name.to_string()))
    }
}

/// Reads interface addresses from the kernel with `getifaddrs(3)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInterfaces;

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl InterfaceLookup for SystemInterfaces {
    fn addresses(&self, name: &str) -> ResolverResult<Vec<InterfaceAddress>> {
        let entries = ifaddrs::getifaddrs()
            .map_err(|e| ResolverError::InterfaceLookupFailed(e.to_string()))?;

        let mut found = false;
        let mut addresses = Vec::new();
        for entry in entries.filter(|entry| entry.interface_name == name) {
            found = true;
            let Some(storage) = entry.address else {
                continue;
            };

            if let Some(sin) = storage.as_sockaddr_in() {
                addresses.push(InterfaceAddress::Ip(IpAddr::V4(sin.ip())));
            } else if let Some(sin6) = storage.as_sockaddr_in6() {
                addresses.push(InterfaceAddress::Ip(IpAddr::V6(sin6.ip())));
            } else if storage.as_link_addr().is_some() {
                // Link-layer entries describe the interface itself, not an address on it.
                continue;
            } else {
                let family = storage
                    .family()
                    .map(|family| format!("{:?}", family))
                    .unwrap_or_else(|| "unknown".to_string());
                addresses.push(InterfaceAddress::Other(family));
            }
        }

        if !found {
            return Err(ResolverError::InterfaceNotFound(name.to_string()));
        }

        Ok(addresses)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the host's name.
pub fn os_hostname() -> NetworkResult<String> {
    let name = nix::unistd::gethostname()?;
    Ok(name.to_string_lossy().into_owned())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
