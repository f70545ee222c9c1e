//! Error types of the local API server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use edgebox_core::{network::NetworkError, EdgeboxError};
use thiserror::Error;

use crate::payload::ErrorResponse;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a server operation.
pub type ServerResult<T> = Result<T, ServerError>;

/// An error raised by the server or a handler.
#[derive(pretty_error_debug::Debug, Error)]
pub enum ServerError {
    /// An I/O error.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// The server configuration is invalid.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The server is already running.
    #[error("server is already running")]
    AlreadyRunning,

    /// An error from the container manager.
    #[error(transparent)]
    EdgeboxError(#[from] EdgeboxError),
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ServerError {
    /// The HTTP status the error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::EdgeboxError(EdgeboxError::ContainerNotFound(_))
            | ServerError::EdgeboxError(EdgeboxError::NetworkError(
                NetworkError::SandboxNotFound(_),
            )) => StatusCode::NOT_FOUND,
            ServerError::EdgeboxError(EdgeboxError::ContainerExists(_))
            | ServerError::EdgeboxError(EdgeboxError::InvalidContainerState(_, _)) => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        }

        let body = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("error")
                .to_lowercase(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
