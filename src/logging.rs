//! Message logging collaborator.
//!
//! The pump reports every received message and the outbox every sent one.
//! `TracingMessageLogger` forwards them as `tracing` events on dedicated
//! targets so they can be filtered independently of the bus's own logs:
//!
//! ```text
//! RUST_LOG=transit_bus::inbound=debug,transit_bus::outbound=debug
//! ```

use tracing::debug;

/// Receives inbound and outbound message observations.
pub trait MessageLogger: Send + Sync {
    fn inbound_log_message(&self, body: &str, message_type: &str, message_id: &str, attempt_number: u32);

    fn outbound_log_message(&self, body: &str, message_type: &str);
}

/// Emits observations as `tracing` debug events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMessageLogger;

impl MessageLogger for TracingMessageLogger {
    fn inbound_log_message(&self, body: &str, message_type: &str, message_id: &str, attempt_number: u32) {
        debug!(
            target: "transit_bus::inbound",
            message_type,
            message_id,
            attempt_number,
            body,
            "received message"
        );
    }

    fn outbound_log_message(&self, body: &str, message_type: &str) {
        debug!(target: "transit_bus::outbound", message_type, body, "sent message");
    }
}

/// Discards every observation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpMessageLogger;

impl MessageLogger for NoOpMessageLogger {
    fn inbound_log_message(&self, _body: &str, _message_type: &str, _message_id: &str, _attempt_number: u32) {}

    fn outbound_log_message(&self, _body: &str, _message_type: &str) {}
}
