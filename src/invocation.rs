//! Request context consumed by selectors and topologies

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attachment key carrying the pinpoint target address
pub const PINPOINT_KEY: &str = "pinpoint";

/// Default attachment key used by the tag selector
pub const TAG_KEY: &str = "tag";

/// Read-only view of a request as seen by routing decisions
pub trait Invocation: Send + Sync {
    /// Invoked method name
    fn method(&self) -> &str;

    /// Attachment value by key
    fn attachment(&self, key: &str) -> Option<&str>;
}

/// Concrete request carried through the cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Method name
    pub method: String,
    /// Opaque payload forwarded to the transport
    #[serde(default)]
    pub payload: Value,
    /// Routing attachments (pinpoint target, tag, ...)
    #[serde(default)]
    pub attachments: HashMap<String, String>,
}

impl Request {
    /// Create a request for `method` with an empty payload
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            payload: Value::Null,
            attachments: HashMap::new(),
        }
    }

    /// Set the payload
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Add an attachment
    #[must_use]
    pub fn with_attachment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attachments.insert(key.into(), value.into());
        self
    }

    /// Pin the request to one node address
    #[must_use]
    pub fn pinned_to(self, address: impl Into<String>) -> Self {
        self.with_attachment(PINPOINT_KEY, address)
    }
}

impl Invocation for Request {
    fn method(&self) -> &str {
        &self.method
    }

    fn attachment(&self, key: &str) -> Option<&str> {
        self.attachments.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pinned_request_exposes_target() {
        let req = Request::new("echo").pinned_to("10.0.0.2:9000");
        assert_eq!(req.method(), "echo");
        assert_eq!(req.attachment(PINPOINT_KEY), Some("10.0.0.2:9000"));
        assert_eq!(req.attachment(TAG_KEY), None);
    }
}
