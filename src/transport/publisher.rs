//! Topic-side transport contract.

use std::sync::Arc;

use crate::error::TransportError;

/// Trait for publishing to the outward topic service (fan-out).
///
/// Every queue subscribed to `topic` receives the body wrapped in a topic
/// envelope carrying `attributes` as message attributes.
pub trait TopicPublisher: Send + Sync {
    fn publish(
        &self,
        topic: &str,
        body: &str,
        attributes: &[(String, String)],
    ) -> Result<(), TransportError>;
}

impl<T: TopicPublisher + ?Sized> TopicPublisher for Arc<T> {
    fn publish(
        &self,
        topic: &str,
        body: &str,
        attributes: &[(String, String)],
    ) -> Result<(), TransportError> {
        (**self).publish(topic, body, attributes)
    }
}
