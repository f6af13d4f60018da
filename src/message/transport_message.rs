//! The unit the delivery pipeline operates on.

use std::fmt;
use std::sync::Arc;

use super::types::{Message, MessageTypeRef, Payload};
use crate::error::ParseError;

/// A decoded queue record.
///
/// Created once per poll, consumed within one pump iteration and then
/// dropped whether or not it was acknowledged.
///
/// Parsing succeeded iff both `message_type` and `message` are set and no
/// `parse_error` was recorded; a failed parse never carries a payload.
pub struct TransportMessage {
    /// Transport message id.
    pub id: String,
    /// Token needed to acknowledge (delete) the record.
    pub receipt_handle: String,
    /// Raw payload after envelope unwrapping.
    pub body: String,
    /// Type name carried on the wire, kept even if it could not be resolved.
    pub message_type_name: String,
    pub message_type: Option<MessageTypeRef>,
    pub message: Option<Payload>,
    pub parse_error: Option<ParseError>,
    /// Delivery attempt reported by the transport (approximate).
    pub attempt_number: u32,
    pub was_published_via_topic: bool,
}

impl TransportMessage {
    /// An unparsed message; attempt number defaults to 1.
    pub fn new(receipt_handle: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            receipt_handle: receipt_handle.into(),
            body: body.into(),
            message_type_name: String::new(),
            message_type: None,
            message: None,
            parse_error: None,
            attempt_number: 1,
            was_published_via_topic: false,
        }
    }

    /// A successfully parsed message wrapping `message`.
    pub fn for_message<M: Message>(
        receipt_handle: impl Into<String>,
        message: M,
    ) -> Result<Self, serde_json::Error> {
        let type_ref = MessageTypeRef::of::<M>();
        let body = serde_json::to_string(&message)?;
        let mut parsed = Self::new(receipt_handle, body);
        parsed.message_type_name = type_ref.name().to_string();
        parsed.message_type = Some(type_ref);
        parsed.message = Some(Arc::new(message));
        Ok(parsed)
    }

    pub fn with_attempt_number(mut self, attempt_number: u32) -> Self {
        self.attempt_number = attempt_number;
        self
    }

    pub fn parsing_succeeded(&self) -> bool {
        self.parse_error.is_none() && self.message.is_some() && self.message_type.is_some()
    }

    /// Record a parse failure, dropping any payload.
    pub(crate) fn fail(&mut self, error: ParseError) {
        self.message = None;
        self.parse_error = Some(error);
    }

    /// Borrow the payload as `M`, if it is one.
    pub fn payload<M: 'static>(&self) -> Option<&M> {
        self.message.as_deref()?.downcast_ref::<M>()
    }
}

impl fmt::Debug for TransportMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportMessage")
            .field("id", &self.id)
            .field("receipt_handle", &self.receipt_handle)
            .field("message_type_name", &self.message_type_name)
            .field("parsing_succeeded", &self.parsing_succeeded())
            .field("parse_error", &self.parse_error)
            .field("attempt_number", &self.attempt_number)
            .field("was_published_via_topic", &self.was_published_via_topic)
            .finish()
    }
}
