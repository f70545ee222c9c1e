//! Configuration of the local API server.

use std::path::PathBuf;

use edgebox_core::config::GrpcServerConfig;
use getset::Getters;

use crate::{ServerError, ServerResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The only supported listener network.
pub const UNIX_NETWORK: &str = "unix";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Where and how the server listens.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ServerConfig {
    /// Path of the Unix socket.
    socket_path: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ServerConfig {
    /// Creates a configuration listening on `socket_path`.
    pub fn new(socket_path: impl Into<PathBuf>) -> ServerResult<Self> {
        let socket_path = socket_path.into();
        edgebox_utils::require_absolute(&socket_path)
            .map_err(|e| ServerError::ConfigError(e.to_string()))?;
        Ok(Self { socket_path })
    }

    /// Creates a configuration from the daemon's server section.
    pub fn from_daemon(config: &GrpcServerConfig, socket_path: PathBuf) -> ServerResult<Self> {
        if config.network != UNIX_NETWORK {
            return Err(ServerError::ConfigError(format!(
                "unsupported listener network {}",
                config.network
            )));
        }
        Self::new(socket_path)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_absolute_unix_sockets() {
        assert!(ServerConfig::new("/run/edgebox/edgebox.sock").is_ok());
        assert!(ServerConfig::new("edgebox.sock").is_err());

        let tcp = GrpcServerConfig {
            network: "tcp".to_string(),
            address: None,
        };
        assert!(ServerConfig::from_daemon(&tcp, "/run/edgebox/edgebox.sock".into()).is_err());
    }
}
