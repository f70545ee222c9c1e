//! Shared state of the request handlers.

use std::sync::Arc;

use edgebox_core::container::ContainerManager;
use getset::Getters;

use crate::config::ServerConfig;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Application state
#[derive(Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct AppState {
    /// The server configuration
    config: Arc<ServerConfig>,

    /// The container manager the API operates on
    containers: Arc<dyn ContainerManager>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl AppState {
    /// Create a new application state instance
    pub fn new(config: Arc<ServerConfig>, containers: Arc<dyn ContainerManager>) -> Self {
        Self { config, containers }
    }
}
