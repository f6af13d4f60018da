//! Queue-side transport contract.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cancellation::CancellationToken;
use crate::error::TransportError;

/// System attribute carrying the transport's receive count.
pub const RECEIVE_COUNT_ATTRIBUTE: &str = "ApproximateReceiveCount";

/// A record as it comes off the queue, before envelope decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMessage {
    /// Transport-assigned message id.
    pub message_id: String,
    /// Token required to delete this delivery.
    pub receipt_handle: String,
    pub body: String,
    /// System attributes (receive count, timestamps).
    pub attributes: HashMap<String, String>,
    /// User attributes attached by the sender (`messageType`, metadata).
    pub message_attributes: HashMap<String, String>,
}

impl RawMessage {
    pub fn new(receipt_handle: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            receipt_handle: receipt_handle.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = id.into();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_message_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.message_attributes.insert(key.into(), value.into());
        self
    }

    /// Set the receive count system attribute.
    pub fn with_receive_count(self, count: u32) -> Self {
        self.with_attribute(RECEIVE_COUNT_ATTRIBUTE, count.to_string())
    }
}

/// Trait for the durable input queue a bus polls.
///
/// Implementations must be safe to share between concurrently running
/// pumps. `get_messages` may block (long-poll) but must return
/// `Err(TransportError::Cancelled)` promptly once `cancel` fires.
pub trait MessageQueue: Send + Sync {
    /// Receive the next batch of records. An empty batch is not an error.
    fn get_messages(&self, cancel: &CancellationToken) -> Result<Vec<RawMessage>, TransportError>;

    /// Delete a delivered record so it is not redelivered.
    fn remove_message(&self, receipt_handle: &str) -> Result<(), TransportError>;

    /// Enqueue a record directly on this queue.
    fn add_message(&self, body: &str, metadata: &[(String, String)]) -> Result<(), TransportError>;

    /// Subscribe this queue to the named topics.
    fn subscribe(&self, topics: &[String]) -> Result<(), TransportError>;
}

impl<T: MessageQueue + ?Sized> MessageQueue for Arc<T> {
    fn get_messages(&self, cancel: &CancellationToken) -> Result<Vec<RawMessage>, TransportError> {
        (**self).get_messages(cancel)
    }

    fn remove_message(&self, receipt_handle: &str) -> Result<(), TransportError> {
        (**self).remove_message(receipt_handle)
    }

    fn add_message(&self, body: &str, metadata: &[(String, String)]) -> Result<(), TransportError> {
        (**self).add_message(body, metadata)
    }

    fn subscribe(&self, topics: &[String]) -> Result<(), TransportError> {
        (**self).subscribe(topics)
    }
}
