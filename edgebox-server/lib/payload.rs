//! Request and response payloads of the local API.

use serde::{Deserialize, Serialize};

//--------------------------------------------------------------------------------------------------
// Types: Requests
//--------------------------------------------------------------------------------------------------

/// Query of a stop request.
#[derive(Debug, Default, Deserialize)]
pub struct StopQuery {
    /// Grace period in seconds before the task is killed.
    #[serde(default)]
    pub timeout: Option<u64>,
}

//--------------------------------------------------------------------------------------------------
// Types: Responses
//--------------------------------------------------------------------------------------------------

/// A plain message.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegularMessageResponse {
    /// The message.
    pub message: String,
}

/// The body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short error kind, the lower-cased reason phrase of the status.
    pub error: String,

    /// What went wrong.
    pub message: String,
}
