use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::NotificationError;

/// The payload unit delivered to one or more connections: a `type` tag plus
/// free-form caller-supplied fields. Immutable once constructed; a send call
/// serializes it exactly once and writes the same bytes to every resolved
/// connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl Envelope {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field attachment, consumed before the envelope is sent.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn to_payload(&self) -> Result<String, NotificationError> {
        serde_json::to_string(self).map_err(|e| NotificationError::Serialization(e.to_string()))
    }
}
