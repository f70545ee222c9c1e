use serde::{Deserialize, Serialize};
use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Malformed payload, topic or path.
pub const ERROR_PARAMETER_INVALID: &str = "messages:parameter.invalid";

/// No such thing, feature or operations handler.
pub const ERROR_SUBJECT_NOT_FOUND: &str = "messages:subject.notfound";

/// The operations handler failed.
pub const ERROR_EXECUTION_FAILED: &str = "messages:execution.failed";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An error as carried on the wire.
///
/// Operations handlers return it (inside `anyhow::Error`) to answer with a specific status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{error} ({status}): {message}")]
pub struct ThingError {
    /// The error code, e.g. `messages:subject.notfound`.
    pub error: String,

    /// The HTTP-like status.
    pub status: u16,

    /// A human-readable message.
    pub message: String,

    /// More detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ThingError {
    /// Creates an error.
    pub fn new(error: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            status,
            message: message.into(),
            description: None,
        }
    }

    /// Adds a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// A 400 `messages:parameter.invalid`.
    pub fn parameter_invalid(message: impl Into<String>) -> Self {
        Self::new(ERROR_PARAMETER_INVALID, 400, message)
    }

    /// A 404 `messages:subject.notfound`.
    pub fn subject_not_found(message: impl Into<String>) -> Self {
        Self::new(ERROR_SUBJECT_NOT_FOUND, 404, message)
    }

    /// A 500 `messages:execution.failed`.
    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self::new(ERROR_EXECUTION_FAILED, 500, message)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_wire_shape() -> anyhow::Result<()> {
        let error = ThingError::subject_not_found("no handler");
        assert_eq!(
            serde_json::to_value(&error)?,
            json!({
                "error": "messages:subject.notfound",
                "status": 404,
                "message": "no handler"
            })
        );

        let wrapped = anyhow::Error::new(ThingError::parameter_invalid("bad"));
        assert_eq!(wrapped.downcast_ref::<ThingError>().map(|e| e.status), Some(400));
        Ok(())
    }
}
