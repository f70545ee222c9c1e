//! The seam between the controller and the kernel's link layer.

use std::{
    net::Ipv4Addr,
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use tokio::{fs, process::Command};

use crate::network::{NetworkError, NetworkResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const IP_FORWARD_SYSCTL: &str = "/proc/sys/net/ipv4/ip_forward";

const SYSFS_NET_DIR: &str = "/sys/class/net";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A bridge to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeLink {
    /// Interface name.
    pub name: String,

    /// Gateway address with the pool's prefix length.
    pub address: Ipv4Network,

    /// Link MTU.
    pub mtu: u32,

    /// Enable IPv4 forwarding on the host.
    pub ip_forward: bool,

    /// Masquerade traffic leaving the pool through other interfaces.
    pub masquerade: bool,
}

/// A veth pair connecting a namespace to a bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VethLink {
    /// Bridge the host side is enslaved to.
    pub bridge: String,

    /// Host side interface name.
    pub host_interface: String,

    /// Namespace path of the container side.
    pub namespace: PathBuf,

    /// Container side address.
    pub address: Ipv4Network,

    /// Container side MAC address.
    pub mac: String,

    /// Default route.
    pub gateway: Ipv4Addr,

    /// Link MTU.
    pub mtu: u32,
}

/// Interface counters from the container's point of view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceStatistics {
    /// Bytes received.
    pub rx_bytes: u64,

    /// Packets received.
    pub rx_packets: u64,

    /// Receive errors.
    pub rx_errors: u64,

    /// Received packets dropped.
    pub rx_dropped: u64,

    /// Bytes transmitted.
    pub tx_bytes: u64,

    /// Packets transmitted.
    pub tx_packets: u64,

    /// Transmit errors.
    pub tx_errors: u64,

    /// Transmitted packets dropped.
    pub tx_dropped: u64,
}

/// Operations on bridges, veth pairs and namespaces.
#[async_trait]
pub trait LinkDriver: Send + Sync {
    /// Whether an interface exists.
    async fn link_exists(&self, name: &str) -> NetworkResult<bool>;

    /// The first IPv4 address (with prefix) of an interface, if any.
    async fn link_ipv4(&self, name: &str) -> NetworkResult<Option<Ipv4Network>>;

    /// Creates and brings up a bridge.
    async fn create_bridge(&self, bridge: &BridgeLink) -> NetworkResult<()>;

    /// Deletes an interface. Deleting a missing interface succeeds.
    async fn delete_link(&self, name: &str) -> NetworkResult<()>;

    /// Creates a named network namespace at `key`.
    async fn create_namespace(&self, key: &Path) -> NetworkResult<()>;

    /// Deletes a network namespace. Deleting a missing namespace succeeds.
    async fn delete_namespace(&self, key: &Path) -> NetworkResult<()>;

    /// Creates a veth pair, moves one side into the namespace and configures it.
    async fn attach(&self, veth: &VethLink) -> NetworkResult<()>;

    /// Removes a veth pair by its host side.
    async fn detach(&self, host_interface: &str) -> NetworkResult<()>;

    /// Counters of a veth pair, read from its host side.
    async fn statistics(&self, host_interface: &str) -> NetworkResult<InterfaceStatistics>;
}

/// A [`LinkDriver`] driving `ip(8)` and `iptables(8)` and reading sysfs.
///
/// Namespaces are created with `ip netns`, so the controller's namespace directory must be the
/// one `ip` uses (`/run/netns`).
#[derive(Debug, Clone)]
pub struct IpLinkDriver {
    ip: PathBuf,
    iptables: PathBuf,
    sysfs: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl IpLinkDriver {
    /// Creates a driver using the binaries found on `PATH`.
    pub fn new() -> Self {
        Self {
            ip: PathBuf::from("ip"),
            iptables: PathBuf::from("iptables"),
            sysfs: PathBuf::from(SYSFS_NET_DIR),
        }
    }

    async fn run(&self, program: &Path, args: &[&str]) -> NetworkResult<String> {
        tracing::trace!("running {} {}", program.display(), args.join(" "));
        let output = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                NetworkError::DriverError(format!("failed to run {}: {}", program.display(), e))
            })?;

        if !output.status.success() {
            return Err(NetworkError::DriverError(format!(
                "{} {} failed: {}",
                program.display(),
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn ip(&self, args: &[&str]) -> NetworkResult<String> {
        self.run(&self.ip, args).await
    }

    async fn ip_netns(&self, namespace: &str, args: &[&str]) -> NetworkResult<String> {
        let mut full = vec!["netns", "exec", namespace, "ip"];
        full.extend_from_slice(args);
        self.ip(&full).await
    }

    async fn ensure_masquerade(&self, bridge: &BridgeLink) -> NetworkResult<()> {
        let source = bridge.address.network().to_string() + "/" + &bridge.address.prefix().to_string();
        let rule = [
            "POSTROUTING", "-s", source.as_str(), "!", "-o", bridge.name.as_str(), "-j",
            "MASQUERADE",
        ];

        let mut check = vec!["-t", "nat", "-C"];
        check.extend_from_slice(&rule);
        if self.run(&self.iptables, &check).await.is_ok() {
            return Ok(());
        }

        let mut append = vec!["-t", "nat", "-A"];
        append.extend_from_slice(&rule);
        self.run(&self.iptables, &append).await.map(|_| ())
    }

    async fn read_counter(&self, interface: &str, counter: &str) -> NetworkResult<u64> {
        let path = self
            .sysfs
            .join(interface)
            .join("statistics")
            .join(counter);
        let value = fs::read_to_string(&path).await?;
        value
            .trim()
            .parse()
            .map_err(|e| NetworkError::DriverError(format!("bad counter {}: {}", path.display(), e)))
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for IpLinkDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkDriver for IpLinkDriver {
    async fn link_exists(&self, name: &str) -> NetworkResult<bool> {
        Ok(fs::try_exists(self.sysfs.join(name)).await?)
    }

    async fn link_ipv4(&self, name: &str) -> NetworkResult<Option<Ipv4Network>> {
        if !self.link_exists(name).await? {
            return Ok(None);
        }

        let output = self.ip(&["-4", "-o", "addr", "show", "dev", name]).await?;
        Ok(output.lines().find_map(|line| {
            let mut fields = line.split_whitespace();
            fields.find(|field| *field == "inet")?;
            fields.next()?.parse().ok()
        }))
    }

    async fn create_bridge(&self, bridge: &BridgeLink) -> NetworkResult<()> {
        let mtu = bridge.mtu.to_string();
        let address = bridge.address.to_string();

        if !self.link_exists(&bridge.name).await? {
            self.ip(&["link", "add", "name", &bridge.name, "type", "bridge"])
                .await?;
        }
        self.ip(&["addr", "replace", &address, "dev", &bridge.name])
            .await?;
        self.ip(&["link", "set", "dev", &bridge.name, "mtu", &mtu, "up"])
            .await?;

        if bridge.ip_forward {
            fs::write(IP_FORWARD_SYSCTL, "1").await?;
        }

        if bridge.masquerade {
            if let Err(e) = self.ensure_masquerade(bridge).await {
                tracing::warn!("failed to install masquerade rule for {}: {}", bridge.name, e);
            }
        }

        Ok(())
    }

    async fn delete_link(&self, name: &str) -> NetworkResult<()> {
        if !self.link_exists(name).await? {
            return Ok(());
        }
        self.ip(&["link", "delete", "dev", name]).await.map(|_| ())
    }

    async fn create_namespace(&self, key: &Path) -> NetworkResult<()> {
        let name = namespace_name(key)?;
        self.ip(&["netns", "add", name]).await?;
        self.ip_netns(name, &["link", "set", "dev", "lo", "up"])
            .await
            .map(|_| ())
    }

    async fn delete_namespace(&self, key: &Path) -> NetworkResult<()> {
        if !fs::try_exists(key).await? {
            return Ok(());
        }
        let name = namespace_name(key)?;
        self.ip(&["netns", "delete", name]).await.map(|_| ())
    }

    async fn attach(&self, veth: &VethLink) -> NetworkResult<()> {
        let namespace = namespace_name(&veth.namespace)?;
        let peer = format!("{}p", veth.host_interface);
        let mtu = veth.mtu.to_string();
        let address = veth.address.to_string();
        let gateway = veth.gateway.to_string();

        self.ip(&[
            "link", "add", &veth.host_interface, "mtu", &mtu, "type", "veth", "peer", "name",
            &peer, "mtu", &mtu,
        ])
        .await?;

        let configure = async {
            self.ip(&["link", "set", "dev", &veth.host_interface, "master", &veth.bridge])
                .await?;
            self.ip(&["link", "set", "dev", &veth.host_interface, "up"])
                .await?;
            self.ip(&["link", "set", "dev", &peer, "netns", namespace])
                .await?;
            self.ip_netns(namespace, &["link", "set", "dev", &peer, "name", "eth0"])
                .await?;
            self.ip_netns(namespace, &["link", "set", "dev", "eth0", "address", &veth.mac])
                .await?;
            self.ip_netns(namespace, &["addr", "add", &address, "dev", "eth0"])
                .await?;
            self.ip_netns(namespace, &["link", "set", "dev", "eth0", "up"])
                .await?;
            self.ip_netns(namespace, &["route", "add", "default", "via", &gateway])
                .await?;
            NetworkResult::Ok(())
        };

        if let Err(e) = configure.await {
            if let Err(cleanup) = self.delete_link(&veth.host_interface).await {
                tracing::warn!("failed to delete {}: {}", veth.host_interface, cleanup);
            }
            return Err(e);
        }

        Ok(())
    }

    async fn detach(&self, host_interface: &str) -> NetworkResult<()> {
        self.delete_link(host_interface).await
    }

    async fn statistics(&self, host_interface: &str) -> NetworkResult<InterfaceStatistics> {
        // The host side sees the container's traffic mirrored.
        Ok(InterfaceStatistics {
            rx_bytes: self.read_counter(host_interface, "tx_bytes").await?,
            rx_packets: self.read_counter(host_interface, "tx_packets").await?,
            rx_errors: self.read_counter(host_interface, "tx_errors").await?,
            rx_dropped: self.read_counter(host_interface, "tx_dropped").await?,
            tx_bytes: self.read_counter(host_interface, "rx_bytes").await?,
            tx_packets: self.read_counter(host_interface, "rx_packets").await?,
            tx_errors: self.read_counter(host_interface, "rx_errors").await?,
            tx_dropped: self.read_counter(host_interface, "rx_dropped").await?,
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn namespace_name(key: &Path) -> NetworkResult<&str> {
    key.file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| NetworkError::DriverError(format!("invalid namespace key {}", key.display())))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_statistics_are_mirrored() -> anyhow::Result<()> {
        let sysfs = TempDir::new()?;
        let stats = sysfs.path().join("veth1234567").join("statistics");
        std::fs::create_dir_all(&stats)?;
        for (counter, value) in [
            ("rx_bytes", 100),
            ("rx_packets", 2),
            ("rx_errors", 0),
            ("rx_dropped", 0),
            ("tx_bytes", 300),
            ("tx_packets", 4),
            ("tx_errors", 1),
            ("tx_dropped", 0),
        ] {
            std::fs::write(stats.join(counter), format!("{}\n", value))?;
        }

        let driver = IpLinkDriver {
            sysfs: sysfs.path().to_path_buf(),
            ..IpLinkDriver::new()
        };

        let statistics = driver.statistics("veth1234567").await?;
        assert_eq!(statistics.rx_bytes, 300);
        assert_eq!(statistics.tx_bytes, 100);
        assert_eq!(statistics.rx_errors, 1);
        assert!(driver.link_exists("veth1234567").await?);
        assert!(!driver.link_exists("missing").await?);
        Ok(())
    }

    #[test]
    fn test_namespace_name() {
        assert_eq!(
            namespace_name(Path::new("/run/netns/0123456789ab")).unwrap(),
            "0123456789ab"
        );
    }
}
