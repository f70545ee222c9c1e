//! Tracing subscriber setup.
//!
//! The filter comes from `RUST_LOG` when it is set and from the configured level otherwise.
//! With a log directory configured, output goes to a daily rolling file through a non-blocking
//! writer whose guard must be held until the process exits.

use edgebox_core::config::LogConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::{CliError, CliResult};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Installs the global subscriber. Returns the file writer's guard when logging to a file.
pub fn init_logging(config: &LogConfig) -> CliResult<Option<WorkerGuard>> {
    let filter = env_filter(config)?;

    match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, &config.file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .map_err(|e| CliError::LoggingError(e.to_string()))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| CliError::LoggingError(e.to_string()))?;
            Ok(None)
        }
    }
}

/// Builds the filter from `RUST_LOG`, falling back to the configured level.
pub fn env_filter(config: &LogConfig) -> CliResult<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| CliError::LoggingError(format!("invalid log level {}: {}", config.level, e)))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_configured_level_is_used_without_rust_log() -> anyhow::Result<()> {
        std::env::remove_var("RUST_LOG");
        let config = LogConfig {
            level: "debug".to_string(),
            ..LogConfig::default()
        };

        let filter = env_filter(&config)?;
        assert_eq!(filter.to_string(), "debug");
        Ok(())
    }

    #[test]
    #[serial]
    fn test_rust_log_wins_over_configured_level() -> anyhow::Result<()> {
        std::env::set_var("RUST_LOG", "edgebox_core=trace");
        let filter = env_filter(&LogConfig::default());
        std::env::remove_var("RUST_LOG");

        assert_eq!(filter?.to_string(), "edgebox_core=trace");
        Ok(())
    }
}
