use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Headers, ThingError, CONTENT_TYPE_JSON};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The wire container of one twin operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// The thing topic, kept as sent.
    #[serde(default)]
    pub topic: String,

    /// The headers.
    #[serde(default)]
    pub headers: Headers,

    /// Path into the thing.
    #[serde(default)]
    pub path: String,

    /// The value; `null` counts as absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// Status, on responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Revision of the thing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<i64>,

    /// Timestamp of the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Envelope {
    /// Creates an envelope.
    pub fn new(topic: impl Into<String>, headers: Headers, path: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            headers,
            path: path.into(),
            ..Default::default()
        }
    }

    /// Sets the value and the JSON content type.
    pub fn with_value(mut self, value: Value) -> Self {
        self.headers = self.headers.with_content_type(CONTENT_TYPE_JSON);
        self.value = Some(value);
        self
    }

    /// Sets the status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Checks an incoming request: topic and path set, a correlation id present and the content
    /// type consistent with the value.
    pub fn validate(&self) -> Result<(), ThingError> {
        if self.topic.is_empty() {
            return Err(ThingError::parameter_invalid("envelope topic is empty"));
        }
        if self.path.is_empty() {
            return Err(ThingError::parameter_invalid("envelope path is empty"));
        }
        if self.headers.correlation_id().is_none() {
            return Err(ThingError::parameter_invalid(
                "correlation-id header is missing",
            ));
        }

        match (&self.value, self.headers.content_type()) {
            (Some(_), Some(CONTENT_TYPE_JSON)) | (None, None) => Ok(()),
            (Some(_), Some(other)) => Err(ThingError::parameter_invalid(format!(
                "unsupported content-type {}",
                other
            ))),
            (Some(_), None) => Err(ThingError::parameter_invalid(
                "content-type header is missing",
            )),
            (None, Some(_)) => Err(ThingError::parameter_invalid(
                "content-type header given without a value",
            )),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
