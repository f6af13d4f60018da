//! Envelope parser: raw queue record → `TransportMessage`.

use std::sync::Arc;

use tracing::{trace, warn};

use super::envelope::{TopicEnvelope, FROM_TOPIC_ATTRIBUTE, MESSAGE_TYPE_ATTRIBUTE};
use super::transport_message::TransportMessage;
use super::types::MessageTypes;
use crate::error::ParseError;
use crate::transport::{RawMessage, RECEIVE_COUNT_ATTRIBUTE};

/// Decodes raw records against a table of known message types.
///
/// `parse` never fails: every problem is recorded on the returned
/// message's `parse_error`.
#[derive(Clone)]
pub struct MessageParser {
    types: Arc<MessageTypes>,
}

impl MessageParser {
    /// Create a parser that resolves `messageType` attributes against `types`.
    pub fn new(types: Arc<MessageTypes>) -> Self {
        Self { types }
    }

    pub fn types(&self) -> &MessageTypes {
        &self.types
    }

    /// Decode one raw record.
    ///
    /// A record without a `messageType` attribute is read as a topic
    /// envelope and unwrapped. The result carries the attempt number from
    /// `ApproximateReceiveCount`, the resolved type when known, and the
    /// deserialized payload; an unknown type or malformed body leaves
    /// `message` empty and sets `parse_error`.
    pub fn parse(&self, raw: &RawMessage) -> TransportMessage {
        let mut parsed = TransportMessage::new(raw.receipt_handle.clone(), raw.body.clone());
        parsed.id = raw.message_id.clone();
        parsed.attempt_number = attempt_number(raw);

        match raw.message_attributes.get(MESSAGE_TYPE_ATTRIBUTE) {
            Some(type_name) => {
                parsed.message_type_name = type_name.clone();
                parsed.was_published_via_topic =
                    raw.message_attributes.contains_key(FROM_TOPIC_ATTRIBUTE);
            }
            None => {
                let envelope: TopicEnvelope = match serde_json::from_str(&raw.body) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        parsed.fail(ParseError::Envelope(err));
                        return parsed;
                    }
                };
                let Some(type_name) = envelope.message_type() else {
                    parsed.fail(ParseError::InvalidFormat);
                    return parsed;
                };
                parsed.message_type_name = type_name.to_string();
                parsed.body = envelope.message.clone().unwrap_or_default();
                parsed.was_published_via_topic = true;
            }
        }

        let Some(type_ref) = self.types.resolve(&parsed.message_type_name) else {
            let name = parsed.message_type_name.clone();
            parsed.fail(ParseError::UnknownType(name));
            return parsed;
        };
        parsed.message_type = Some(type_ref);

        match type_ref.decode(&parsed.body) {
            Ok(payload) => {
                parsed.message = Some(payload);
                trace!(message_type = type_ref.name(), "parsed message");
            }
            Err(err) => parsed.fail(ParseError::Deserialize(err)),
        }
        parsed
    }
}

fn attempt_number(raw: &RawMessage) -> u32 {
    match raw.attributes.get(RECEIVE_COUNT_ATTRIBUTE) {
        Some(count) => count.trim().parse().unwrap_or_else(|_| {
            warn!(value = %count, "unparsable receive count, assuming first attempt");
            1
        }),
        None => 1,
    }
}
