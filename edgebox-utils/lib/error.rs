use std::path::PathBuf;

use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a utils-related operation.
pub type UtilsResult<T> = Result<T, UtilsError>;

/// An error that occurred during a utils operation.
#[derive(pretty_error_debug::Debug, Error)]
pub enum UtilsError {
    /// An I/O error.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// Another daemon instance already holds the run-lock.
    #[error("another instance is already running (lock held on {0})")]
    AlreadyRunning(PathBuf),

    /// The run-lock could not be acquired for a reason other than contention.
    #[error("failed to lock {0}: {1}")]
    LockFailed(PathBuf, nix::errno::Errno),

    /// A path that is required to be absolute is relative.
    #[error("path is not absolute: {0}")]
    PathNotAbsolute(PathBuf),
}
