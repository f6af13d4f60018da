//! Messages - typed payloads, wire envelopes and the parser between them.
//!
//! ## Inbound
//!
//! ```text
//! RawMessage ──► MessageParser::parse ──► TransportMessage
//!                 │  messageType attribute?  yes → body is the payload
//!                 │                          no  → unwrap TopicEnvelope
//!                 │  resolve type name in MessageTypes
//!                 └  deserialize body into the resolved type
//! ```
//!
//! ## Outbound
//!
//! Payloads are encoded into an `OutboundMessage` (type name + JSON body)
//! and sent with a `messageType` attribute plus `CommonMetadata`.

mod envelope;
mod outbound;
mod parser;
mod transport_message;
mod types;

pub use envelope::{EnvelopeAttribute, TopicEnvelope, FROM_TOPIC_ATTRIBUTE, MESSAGE_TYPE_ATTRIBUTE};
pub use outbound::{
    CommonMetadata, OutboundMessage, QUEUE_VERSION_ATTRIBUTE, SENDER_IP_ATTRIBUTE,
    SENDER_VERSION_ATTRIBUTE,
};
pub use parser::MessageParser;
pub use transport_message::TransportMessage;
pub use types::{type_name_of, Message, MessageTypeRef, MessageTypes, Payload};
