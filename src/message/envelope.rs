//! Wire envelope for topic-delivered messages.
//!
//! A message fanned out through a topic arrives on the queue as:
//!
//! ```json
//! {
//!   "message": "{\"Id\":712738,\"Price\":1.1}",
//!   "messageAttributes": {
//!     "messageType": { "type": "String", "value": "orders::PriceChanged" }
//!   }
//! }
//! ```
//!
//! Field names are also accepted in their capitalized form (`Message`,
//! `MessageAttributes`, `Type`, `Value`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Attribute carrying the payload's fully-qualified type name.
pub const MESSAGE_TYPE_ATTRIBUTE: &str = "messageType";

/// Attribute set by topics using raw delivery: the body is the payload but
/// it still came through a topic.
pub const FROM_TOPIC_ATTRIBUTE: &str = "fromSns";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicEnvelope {
    #[serde(rename = "message", alias = "Message", default)]
    pub message: Option<String>,
    #[serde(
        rename = "messageAttributes",
        alias = "MessageAttributes",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub message_attributes: Option<HashMap<String, EnvelopeAttribute>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeAttribute {
    #[serde(
        rename = "type",
        alias = "Type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub data_type: Option<String>,
    #[serde(rename = "value", alias = "Value")]
    pub value: String,
}

impl EnvelopeAttribute {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            data_type: Some("String".to_string()),
            value: value.into(),
        }
    }
}

impl TopicEnvelope {
    /// Wrap a payload body and its attributes.
    pub fn wrap(body: impl Into<String>, attributes: &[(String, String)]) -> Self {
        let message_attributes = attributes
            .iter()
            .map(|(k, v)| (k.clone(), EnvelopeAttribute::string(v.clone())))
            .collect();
        Self {
            message: Some(body.into()),
            message_attributes: Some(message_attributes),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.message_attributes
            .as_ref()?
            .get(key)
            .map(|attr| attr.value.as_str())
    }

    pub fn message_type(&self) -> Option<&str> {
        self.attribute(MESSAGE_TYPE_ATTRIBUTE)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
