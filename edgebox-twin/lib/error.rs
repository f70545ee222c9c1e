use std::time::Duration;

use thiserror::Error;

use crate::protocol::ThingError;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a twin operation.
pub type TwinResult<T> = Result<T, TwinError>;

/// An error raised by the twin client or model.
#[derive(pretty_error_debug::Debug, Error)]
pub enum TwinError {
    /// An I/O error.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// A JSON (de)serialization error.
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The client configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A TLS file is required by the broker scheme but not configured or not readable.
    #[error("tls file {0} is required for broker {1}")]
    MissingTlsFile(&'static str, String),

    /// A topic does not follow the grammar.
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// An id does not follow the `namespace:name` grammar.
    #[error("invalid id: {0}")]
    InvalidId(String),

    /// An MQTT request did not complete in time.
    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),

    /// The MQTT client reported an error.
    #[error("mqtt error: {0}")]
    MqttError(String),

    /// The gateway handshake has not completed yet.
    #[error("device identity is not known yet")]
    NotBootstrapped,

    /// A wire-level error.
    #[error(transparent)]
    ThingError(#[from] ThingError),
}
