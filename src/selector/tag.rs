//! Tag-match selector

use super::NodeSelector;
use crate::invocation::Invocation;
use crate::node::Candidate;

/// Keeps nodes whose tag `key` equals the requested value
///
/// The value is read from the request attachment named `key`, falling back to
/// the statically configured value. Without a value the candidate passes
/// through untouched.
#[derive(Debug, Clone)]
pub struct TagSelector {
    key: String,
    value: Option<String>,
}

impl TagSelector {
    /// Match on `key`, with an optional static value
    pub fn new(key: impl Into<String>, value: Option<String>) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

impl NodeSelector for TagSelector {
    fn select(&self, candidate: &Candidate, request: &dyn Invocation) -> Candidate {
        let Some(wanted) = request.attachment(&self.key).or(self.value.as_deref()) else {
            return candidate.clone();
        };
        candidate.retain(|n| n.tag(&self.key) == Some(wanted))
    }

    fn name(&self) -> &'static str {
        "tag"
    }
}
