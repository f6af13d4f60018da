use std::sync::Arc;

use crate::support::{OrderPlaced, PriceChanged};
use transit_bus::message::{type_name_of, MessageTypes, TopicEnvelope, MESSAGE_TYPE_ATTRIBUTE};
use transit_bus::transport::RawMessage;
use transit_bus::{MessageParser, ParseError};

fn parser() -> MessageParser {
    let mut types = MessageTypes::new();
    types.register::<PriceChanged>();
    types.register::<OrderPlaced>();
    MessageParser::new(Arc::new(types))
}

// ============================================================================
// Test 1: Topic envelope is unwrapped
// ============================================================================

#[test]
fn topic_envelope_is_unwrapped() {
    let body = serde_json::json!({
        "Type": "Notification",
        "Message": "{\"Id\":712738,\"Price\":1.1}",
        "MessageAttributes": {
            "messageType": { "Type": "String", "Value": type_name_of::<PriceChanged>() }
        }
    })
    .to_string();
    let raw = RawMessage::new("handle-1", body).with_receive_count(2);

    let parsed = parser().parse(&raw);

    assert!(parsed.parsing_succeeded());
    assert!(parsed.was_published_via_topic);
    assert_eq!(parsed.attempt_number, 2);
    assert_eq!(parsed.body, r#"{"Id":712738,"Price":1.1}"#);
    assert_eq!(
        parsed.payload::<PriceChanged>(),
        Some(&PriceChanged {
            id: 712738,
            price: 1.1
        })
    );
}

// ============================================================================
// Test 2: Direct delivery uses the message attribute
// ============================================================================

#[test]
fn direct_delivery_reads_type_attribute() {
    let raw = RawMessage::new("handle-2", r#"{"order_id":"A-1","reject":false}"#)
        .with_message_attribute(MESSAGE_TYPE_ATTRIBUTE, type_name_of::<OrderPlaced>());

    let parsed = parser().parse(&raw);

    assert!(parsed.parsing_succeeded());
    assert!(!parsed.was_published_via_topic);
    assert_eq!(parsed.attempt_number, 1);
    assert_eq!(parsed.payload::<OrderPlaced>().map(|o| o.order_id.as_str()), Some("A-1"));
}

// ============================================================================
// Test 3: Failures are recorded, never raised
// ============================================================================

#[test]
fn envelope_without_type_is_invalid_format() {
    let body = TopicEnvelope::wrap("{}", &[]).to_json().unwrap();
    let parsed = parser().parse(&RawMessage::new("h", body));

    assert!(!parsed.parsing_succeeded());
    assert!(matches!(parsed.parse_error, Some(ParseError::InvalidFormat)));
}

#[test]
fn unknown_type_keeps_its_name() {
    let raw = RawMessage::new("h", "{}").with_message_attribute(MESSAGE_TYPE_ATTRIBUTE, "billing::Refund");
    let parsed = parser().parse(&raw);

    assert_eq!(parsed.message_type_name, "billing::Refund");
    assert!(parsed.message_type.is_none());
    assert!(matches!(parsed.parse_error, Some(ParseError::UnknownType(ref n)) if n == "billing::Refund"));
}

#[test]
fn garbage_body_is_an_envelope_error() {
    let parsed = parser().parse(&RawMessage::new("h", "not json"));
    assert!(matches!(parsed.parse_error, Some(ParseError::Envelope(_))));
    assert!(parsed.message.is_none());
}

#[test]
fn mismatched_payload_is_a_deserialize_error() {
    let raw = RawMessage::new("h", r#"{"Id":"seven"}"#)
        .with_message_attribute(MESSAGE_TYPE_ATTRIBUTE, type_name_of::<PriceChanged>());
    let parsed = parser().parse(&raw);

    assert!(parsed.message_type.is_some());
    assert!(matches!(parsed.parse_error, Some(ParseError::Deserialize(_))));
}
