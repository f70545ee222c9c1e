use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Correlates a response with its request.
pub const HEADER_CORRELATION_ID: &str = "correlation-id";

/// Whether the sender expects a response; `true` when absent.
pub const HEADER_RESPONSE_REQUIRED: &str = "response-required";

/// Content type of the value.
pub const HEADER_CONTENT_TYPE: &str = "content-type";

/// Where the response should go.
pub const HEADER_REPLY_TO: &str = "reply-to";

/// The only content type values may have.
pub const CONTENT_TYPE_JSON: &str = "application/json";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Envelope headers. Well-known keys have typed accessors; any other key is kept as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, Value>);

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Headers {
    /// Creates empty headers.
    pub fn new() -> Self {
        Self::default()
    }

    /// A header value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Sets a header value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Removes a header.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// The correlation id.
    pub fn correlation_id(&self) -> Option<&str> {
        self.get_str(HEADER_CORRELATION_ID)
    }

    /// Whether a response is expected. Accepts booleans and `"true"`/`"false"` strings.
    pub fn response_required(&self) -> bool {
        match self.get(HEADER_RESPONSE_REQUIRED) {
            Some(Value::Bool(required)) => *required,
            Some(Value::String(required)) => !required.eq_ignore_ascii_case("false"),
            _ => true,
        }
    }

    /// The content type.
    pub fn content_type(&self) -> Option<&str> {
        self.get_str(HEADER_CONTENT_TYPE)
    }

    /// The reply-to target.
    pub fn reply_to(&self) -> Option<&str> {
        self.get_str(HEADER_REPLY_TO)
    }

    /// Sets the correlation id.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.insert(HEADER_CORRELATION_ID, id.into());
        self
    }

    /// Sets whether a response is expected.
    pub fn with_response_required(mut self, required: bool) -> Self {
        self.insert(HEADER_RESPONSE_REQUIRED, required);
        self
    }

    /// Sets the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.insert(HEADER_CONTENT_TYPE, content_type.into());
        self
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
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
    fn test_response_required_defaults_to_true() -> anyhow::Result<()> {
        assert!(Headers::new().response_required());

        let headers: Headers = serde_json::from_value(json!({ "response-required": "false" }))?;
        assert!(!headers.response_required());

        let headers = Headers::new().with_response_required(false);
        assert!(!headers.response_required());
        Ok(())
    }

    #[test]
    fn test_unknown_headers_survive() -> anyhow::Result<()> {
        let headers: Headers = serde_json::from_value(json!({
            "correlation-id": "x",
            "content-type": "application/json",
            "ditto-originator": "nginx:ditto"
        }))?;

        assert_eq!(headers.correlation_id(), Some("x"));
        assert_eq!(headers.content_type(), Some(CONTENT_TYPE_JSON));
        assert_eq!(
            serde_json::to_value(&headers)?["ditto-originator"],
            json!("nginx:ditto")
        );
        Ok(())
    }
}
