use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use edgebox_utils::{rpc_socket_path, DEFAULT_EXEC_ROOT, DEFAULT_META_PATH};
use serde::{Deserialize, Serialize};

use crate::{
    network::{BridgeConfig, NetworkConfig, NetworkType},
    EdgeboxError, EdgeboxResult,
};

use super::ThingsConfig;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default name of the log file when file logging is enabled.
pub const DEFAULT_LOG_FILE_NAME: &str = "edgeboxd.log";

/// Default grace period, in seconds, given to containers on stop.
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 30;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The daemon configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DaemonConfig {
    /// Logging.
    pub log: LogConfig,

    /// Container manager.
    pub manager: ManagerConfig,

    /// Network manager.
    pub network: NetworkSection,

    /// Local RPC server.
    pub grpc_server: GrpcServerConfig,

    /// Twin connection.
    pub things: ThingsConfig,

    /// Deployment agent.
    pub deployment: DeploymentConfig,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogConfig {
    /// Level filter, e.g. `info` or `edgebox_core=debug`.
    pub level: String,

    /// Directory for a daily-rolled log file; stderr when absent.
    pub dir: Option<PathBuf>,

    /// Name of the log file.
    pub file_name: String,
}

/// Container manager settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerConfig {
    /// Root for persisted container state.
    pub meta_path: PathBuf,

    /// Root for runtime state, the RPC socket and the run-lock.
    pub exec_root: PathBuf,

    /// Grace period, in seconds, given to containers on stop.
    pub stop_timeout: u64,
}

/// Network manager settings as they appear in the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkSection {
    /// Default network type.
    #[serde(rename = "type")]
    pub net_type: NetworkType,

    /// Root for network state; the manager's meta path when absent.
    pub meta_path: Option<PathBuf>,

    /// Root for network runtime state; the manager's exec root when absent.
    pub exec_root: Option<PathBuf>,

    /// Directory holding named network namespaces.
    pub netns_dir: Option<PathBuf>,

    /// The default bridge.
    pub default_bridge: BridgeConfig,
}

/// Local RPC server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GrpcServerConfig {
    /// Listener network; only `unix` is supported.
    pub network: String,

    /// Socket path; `<execRoot>/edgebox.sock` when absent.
    pub address: Option<PathBuf>,
}

/// Deployment agent settings. The agent itself is external.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentConfig {
    /// Whether the agent runs.
    pub enable: bool,

    /// Directory of deployment descriptors.
    pub home_dir: Option<PathBuf>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DaemonConfig {
    /// Reads the configuration from `path`. A missing file yields the defaults unless
    /// `required` is set.
    pub fn load(path: &Path, required: bool) -> EdgeboxResult<Self> {
        let mut config: Self = match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                EdgeboxError::InvalidConfig(format!("{}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                tracing::debug!("no config file at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };

        config.things.forward_deprecated();
        Ok(config)
    }

    /// The structured network configuration.
    pub fn network_config(&self) -> NetworkConfig {
        let meta_path = self
            .network
            .meta_path
            .clone()
            .unwrap_or_else(|| self.manager.meta_path.clone());
        let exec_root = self
            .network
            .exec_root
            .clone()
            .unwrap_or_else(|| self.manager.exec_root.clone());

        let config = NetworkConfig::new(
            self.network.net_type,
            meta_path,
            exec_root,
            self.network.default_bridge.clone(),
        );
        match &self.network.netns_dir {
            Some(dir) => config.with_netns_dir(dir.clone()),
            None => config,
        }
    }

    /// The RPC socket path.
    pub fn socket_path(&self) -> PathBuf {
        self.grpc_server
            .address
            .clone()
            .unwrap_or_else(|| rpc_socket_path(&self.manager.exec_root))
    }
}

impl ManagerConfig {
    /// The stop grace period.
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            dir: None,
            file_name: DEFAULT_LOG_FILE_NAME.to_string(),
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            meta_path: DEFAULT_META_PATH.to_owned(),
            exec_root: DEFAULT_EXEC_ROOT.to_owned(),
            stop_timeout: DEFAULT_STOP_TIMEOUT_SECS,
        }
    }
}

impl Default for GrpcServerConfig {
    fn default() -> Self {
        Self {
            network: "unix".to_string(),
            address: None,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config.json");

        let config = DaemonConfig::load(&path, false)?;
        assert_eq!(config, DaemonConfig::default());
        assert!(DaemonConfig::load(&path, true).is_err());
        Ok(())
    }

    #[test]
    fn test_partial_file_keeps_defaults() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "manager": { "metaPath": "/data/edgebox" },
                "network": { "defaultBridge": { "name": "br-edge", "ipv4": "10.9.0.1/24" } }
            }"#,
        )?;

        let config = DaemonConfig::load(&path, true)?;
        assert_eq!(config.manager.exec_root, PathBuf::from("/var/run/edgebox"));
        assert_eq!(config.manager.stop_timeout(), Duration::from_secs(30));

        let network = config.network_config();
        assert_eq!(network.get_meta_path(), &PathBuf::from("/data/edgebox"));
        assert_eq!(network.get_default_bridge().name, "br-edge");
        assert_eq!(network.get_default_bridge().mtu, 1500);
        assert_eq!(
            config.socket_path(),
            PathBuf::from("/var/run/edgebox/edgebox.sock")
        );
        Ok(())
    }

    #[test]
    fn test_malformed_file_is_invalid_config() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json")?;

        assert!(matches!(
            DaemonConfig::load(&path, true),
            Err(EdgeboxError::InvalidConfig(_))
        ));
        Ok(())
    }
}
