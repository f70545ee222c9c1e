use std::path::PathBuf;

use clap::Parser;
use edgebox_core::{config::DaemonConfig, network::NetworkType};

use crate::styles;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Arguments for the edgeboxd command
#[derive(Debug, Default, Parser)]
#[command(name = "edgeboxd", author, version, styles=styles::styles())]
pub struct EdgeboxdArgs {
    /// Configuration file; `EDGEBOX_CONFIG` or the default location when absent
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level or filter directive, e.g. `debug` or `edgebox_core=trace`
    #[arg(long = "log-level")]
    pub log_level: Option<String>,

    /// Directory for log files; logs go to stderr when absent
    #[arg(long = "log-dir")]
    pub log_dir: Option<PathBuf>,

    /// Root for persisted container and network state
    #[arg(long = "meta-path")]
    pub meta_path: Option<PathBuf>,

    /// Root for runtime state
    #[arg(long = "exec-root")]
    pub exec_root: Option<PathBuf>,

    /// Path of the local RPC socket
    #[arg(short = 's', long = "socket")]
    pub socket: Option<PathBuf>,

    /// Grace period in seconds given to containers on stop
    #[arg(long = "stop-timeout")]
    pub stop_timeout: Option<u64>,

    /// Default network type, `bridge` or `host`
    #[arg(long = "net-type", value_parser = parse_net_type)]
    pub net_type: Option<NetworkType>,

    /// Name of the default bridge interface
    #[arg(long = "bridge-name")]
    pub bridge_name: Option<String>,

    /// Connect to the remote twin
    #[arg(long = "things", default_value_t = false)]
    pub things_enable: bool,

    /// Broker URL of the remote twin
    #[arg(long = "things-broker")]
    pub things_broker_url: Option<String>,

    /// Name of the root thing
    #[arg(long = "things-device-name")]
    pub things_device_name: Option<String>,

    /// Run the deployment agent
    #[arg(long = "deployment", default_value_t = false)]
    pub deployment_enable: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl EdgeboxdArgs {
    /// Overrides the loaded configuration with the flags that were given.
    pub fn apply(&self, config: &mut DaemonConfig) {
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.log.dir = Some(dir.clone());
        }
        if let Some(path) = &self.meta_path {
            config.manager.meta_path = path.clone();
        }
        if let Some(path) = &self.exec_root {
            config.manager.exec_root = path.clone();
        }
        if let Some(path) = &self.socket {
            config.grpc_server.address = Some(path.clone());
        }
        if let Some(timeout) = self.stop_timeout {
            config.manager.stop_timeout = timeout;
        }
        if let Some(net_type) = self.net_type {
            config.network.net_type = net_type;
        }
        if let Some(name) = &self.bridge_name {
            config.network.default_bridge.name = name.clone();
        }
        if self.things_enable {
            config.things.enable = true;
        }
        if let Some(url) = &self.things_broker_url {
            config.things.conn_broker_url = url.clone();
        }
        if let Some(name) = &self.things_device_name {
            config.things.conn_device_name = name.clone();
        }
        if self.deployment_enable {
            config.deployment.enable = true;
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn parse_net_type(value: &str) -> Result<NetworkType, String> {
    match value.to_ascii_lowercase().as_str() {
        "bridge" => Ok(NetworkType::Bridge),
        "host" => Ok(NetworkType::Host),
        other => Err(format!("unknown network type: {other}")),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = EdgeboxdArgs::parse_from([
            "edgeboxd",
            "--log-level",
            "debug",
            "--exec-root",
            "/tmp/edgebox",
            "--net-type",
            "host",
            "--things",
            "--things-broker",
            "ssl://broker:8883",
        ]);

        let mut config = DaemonConfig::default();
        args.apply(&mut config);

        assert_eq!(config.log.level, "debug");
        assert_eq!(config.manager.exec_root, PathBuf::from("/tmp/edgebox"));
        assert_eq!(config.network.net_type, NetworkType::Host);
        assert!(config.things.enable);
        assert_eq!(config.things.conn_broker_url, "ssl://broker:8883");
        assert_eq!(config.socket_path(), PathBuf::from("/tmp/edgebox/edgebox.sock"));
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let args = EdgeboxdArgs::parse_from(["edgeboxd"]);
        let mut config = DaemonConfig::default();
        args.apply(&mut config);
        assert_eq!(config, DaemonConfig::default());
    }

    #[test]
    fn test_unknown_net_type_is_rejected() {
        let result = EdgeboxdArgs::try_parse_from(["edgeboxd", "--net-type", "overlay"]);
        assert!(result.is_err());
    }
}
