use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a CLI-related operation.
pub type CliResult<T> = Result<T, CliError>;

/// An error that occurred while running the daemon.
#[derive(pretty_error_debug::Debug, Error)]
pub enum CliError {
    /// An I/O error.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// An error from the core crate.
    #[error(transparent)]
    EdgeboxError(#[from] edgebox_core::EdgeboxError),

    /// An error from the utils crate.
    #[error(transparent)]
    UtilsError(#[from] edgebox_utils::UtilsError),

    /// An error from the twin crate.
    #[error(transparent)]
    TwinError(#[from] edgebox_twin::TwinError),

    /// The logging subscriber could not be installed.
    #[error("failed to set up logging: {0}")]
    LoggingError(String),
}
