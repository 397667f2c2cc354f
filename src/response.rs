//! Standard result envelope returned by every operation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `{success, message?, data?, metadata?, links?, error?}`. Error envelopes carry only
/// `success: false` and `error`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultEnvelope {
    pub fn success(data: Value, metadata: Map<String, Value>) -> Self {
        ResultEnvelope {
            success: true,
            message: None,
            data: Some(data),
            metadata: Some(metadata),
            links: None,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ResultEnvelope {
            success: false,
            message: None,
            data: None,
            metadata: None,
            links: None,
            error: Some(message.into()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_links(mut self, links: Map<String, Value>) -> Self {
        self.links = Some(links);
        self
    }

    /// Metadata value by key (`None` on error envelopes).
    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.metadata.as_ref().and_then(|m| m.get(key))
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
