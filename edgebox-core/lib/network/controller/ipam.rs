//! Address allocation for bridge networks.

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the lowest free host address of `pool`, skipping the network, broadcast and gateway
/// addresses and everything in `used`.
pub(crate) fn allocate(pool: Ipv4Network, gateway: Ipv4Addr, used: &[Ipv4Addr]) -> Option<Ipv4Addr> {
    let network = pool.network();
    let broadcast = pool.broadcast();
    pool.iter().find(|ip| {
        *ip != network && *ip != broadcast && *ip != gateway && !used.contains(ip)
    })
}

/// The MAC address derived from an IPv4 address, in the locally administered `02:42` range.
pub(crate) fn mac_for(ip: Ipv4Addr) -> String {
    let [a, b, c, d] = ip.octets();
    format!("02:42:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d)
}

/// Whether `ip` can serve as a unicast gateway: not unspecified, loopback, link-local,
/// broadcast or multicast.
pub(crate) fn is_global_unicast(ip: Ipv4Addr) -> bool {
    !(ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_multicast())
}

/// The first host address of `pool`.
pub(crate) fn first_host(pool: Ipv4Network) -> Option<Ipv4Addr> {
    let network = pool.network();
    pool.iter().find(|ip| *ip != network)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_skips_reserved_and_used() {
        let pool: Ipv4Network = "10.0.0.0/29".parse().unwrap();
        let gateway = Ipv4Addr::new(10, 0, 0, 1);

        let used = vec![Ipv4Addr::new(10, 0, 0, 2)];
        assert_eq!(allocate(pool, gateway, &used), Some(Ipv4Addr::new(10, 0, 0, 3)));

        let used: Vec<Ipv4Addr> = (2..=6).map(|d| Ipv4Addr::new(10, 0, 0, d)).collect();
        assert_eq!(allocate(pool, gateway, &used), None);
    }

    #[test]
    fn test_mac_for() {
        assert_eq!(mac_for(Ipv4Addr::new(172, 17, 0, 2)), "02:42:ac:11:00:02");
    }

    #[test]
    fn test_is_global_unicast() {
        assert!(is_global_unicast(Ipv4Addr::new(172, 17, 0, 1)));
        assert!(!is_global_unicast(Ipv4Addr::new(127, 0, 0, 1)));
        assert!(!is_global_unicast(Ipv4Addr::new(169, 254, 1, 1)));
        assert!(!is_global_unicast(Ipv4Addr::new(224, 0, 0, 1)));
    }

    #[test]
    fn test_first_host() {
        let pool: Ipv4Network = "172.17.0.0/16".parse().unwrap();
        assert_eq!(first_host(pool), Some(Ipv4Addr::new(172, 17, 0, 1)));
    }
}
