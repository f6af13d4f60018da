//! In-memory topic broker that fans out to bound `InMemoryQueue`s.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::in_memory_queue::InMemoryQueue;
use super::publisher::TopicPublisher;
use super::queue::MessageQueue;
use crate::error::TransportError;
use crate::message::TopicEnvelope;

#[derive(Default)]
struct Topics {
    bindings: HashMap<String, Vec<InMemoryQueue>>,
    published: Vec<(String, String)>,
}

/// Topic broker. Each publish is wrapped in a `TopicEnvelope` and added to
/// every queue bound to the topic, the way a notification service delivers
/// to its queue subscriptions. Publishing to a topic with no subscribers
/// succeeds and delivers nothing.
#[derive(Clone, Default)]
pub struct InMemoryTopics {
    inner: Arc<RwLock<Topics>>,
}

impl InMemoryTopics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `queue` to `topic`. Binding the same queue twice is a no-op.
    pub fn bind(&self, topic: &str, queue: InMemoryQueue) -> Result<(), TransportError> {
        let mut topics = self
            .inner
            .write()
            .map_err(|_| TransportError::LockPoisoned("bind"))?;
        let bound = topics.bindings.entry(topic.to_string()).or_default();
        if !bound.iter().any(|q| q.same_queue(&queue)) {
            debug!(topic, queue = queue.name(), "bound queue to topic");
            bound.push(queue);
        }
        Ok(())
    }

    /// Number of queues bound to `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .read()
            .map(|t| t.bindings.get(topic).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Every `(topic, body)` published so far, in order.
    pub fn published(&self) -> Vec<(String, String)> {
        self.inner
            .read()
            .map(|t| t.published.clone())
            .unwrap_or_default()
    }
}

impl TopicPublisher for InMemoryTopics {
    fn publish(
        &self,
        topic: &str,
        body: &str,
        attributes: &[(String, String)],
    ) -> Result<(), TransportError> {
        let queues = {
            let mut topics = self
                .inner
                .write()
                .map_err(|_| TransportError::LockPoisoned("publish"))?;
            topics.published.push((topic.to_string(), body.to_string()));
            topics.bindings.get(topic).cloned().unwrap_or_default()
        };

        let envelope = TopicEnvelope::wrap(body, attributes)
            .to_json()
            .map_err(|err| TransportError::Rejected(err.to_string()))?;
        for queue in &queues {
            queue.add_message(&envelope, &[])?;
        }
        Ok(())
    }
}
