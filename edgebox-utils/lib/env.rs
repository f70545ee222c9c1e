//! Utility functions for working with environment variables.

use std::path::PathBuf;

use crate::DEFAULT_CONFIG_PATH;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Environment variable overriding the configuration file location.
pub const EDGEBOX_CONFIG_ENV_VAR: &str = "EDGEBOX_CONFIG";

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the path of the daemon configuration file.
/// If the EDGEBOX_CONFIG environment variable is set, returns that path.
/// Otherwise, returns the default configuration path.
pub fn get_config_path() -> PathBuf {
    if let Ok(config_path) = std::env::var(EDGEBOX_CONFIG_ENV_VAR) {
        PathBuf::from(config_path)
    } else {
        DEFAULT_CONFIG_PATH.to_owned()
    }
}
