use thiserror::Error;

use crate::{network::NetworkError, registry::ServiceType};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of an edgebox-related operation.
pub type EdgeboxResult<T> = Result<T, EdgeboxError>;

/// An error that occurred during an edgebox operation.
#[derive(pretty_error_debug::Debug, Error)]
pub enum EdgeboxError {
    /// An I/O error.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// A JSON (de)serialization error.
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// An error from the utils crate.
    #[error(transparent)]
    UtilsError(#[from] edgebox_utils::UtilsError),

    /// An error from the network manager.
    #[error(transparent)]
    NetworkError(#[from] NetworkError),

    /// The configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A service with the same type and id was added twice.
    #[error("service {1} of type {0} is already registered")]
    DuplicateService(ServiceType, String),

    /// No container with the given id is known.
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// A container with the given id already exists.
    #[error("container already exists: {0}")]
    ContainerExists(String),

    /// The requested operation is not valid for the container's current state.
    #[error("container {0} is {1}")]
    InvalidContainerState(String, String),

    /// The container runtime reported an error.
    #[error("container runtime error: {0}")]
    RuntimeError(String),
}
