//! Transactional publishing to the outward topic and to the local queue.

use std::sync::Arc;

use super::buffer::{Forward, Outbox};
use super::traits::Bus;
use crate::config::TopicNamer;
use crate::error::{SendError, TransportError};
use crate::logging::MessageLogger;
use crate::message::{CommonMetadata, OutboundMessage, TopicEnvelope};
use crate::transport::{MessageQueue, TopicPublisher};

/// Where a buffered bus message goes on commit.
pub(crate) enum Route {
    Topic(String),
    Local,
}

pub(crate) struct BusForward {
    publisher: Option<Arc<dyn TopicPublisher>>,
    local: Option<Arc<dyn MessageQueue>>,
    topic_namer: TopicNamer,
    metadata: CommonMetadata,
}

impl Forward for BusForward {
    type Route = Route;

    fn forward(&self, route: &Route, message: &OutboundMessage) -> Result<(), SendError> {
        let attributes = message.attributes(&self.metadata);
        match route {
            Route::Topic(topic) => {
                let publisher = self.publisher.as_ref().ok_or(TransportError::Disabled)?;
                publisher.publish(topic, &message.body, &attributes)?;
            }
            Route::Local => {
                let queue = self.local.as_ref().ok_or(TransportError::Disabled)?;
                let envelope = TopicEnvelope::wrap(message.body.clone(), &attributes).to_json()?;
                queue.add_message(&envelope, &[])?;
            }
        }
        Ok(())
    }
}

/// Publishes outward (one topic per message type) and locally (to this
/// bus's own input queue, wrapped in a topic envelope so it parses like a
/// topic delivery). Both defer to commit when a unit of work is ambient.
///
/// A bus built without a publisher rejects `publish` with
/// `TransportError::Disabled`; one without a local queue rejects
/// `publish_local` the same way.
#[derive(Clone)]
pub struct TransactionalBus {
    outbox: Arc<Outbox<BusForward>>,
}

/// Builder for [`TransactionalBus`].
pub struct TransactionalBusBuilder {
    publisher: Option<Arc<dyn TopicPublisher>>,
    local: Option<Arc<dyn MessageQueue>>,
    topic_namer: TopicNamer,
    metadata: Option<CommonMetadata>,
    application_version: Option<String>,
    logger: Arc<dyn MessageLogger>,
}

impl TransactionalBusBuilder {
    /// Topic publisher used by `publish`.
    pub fn with_publisher(mut self, publisher: Arc<dyn TopicPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Input queue used by `publish_local`.
    pub fn with_local_queue(mut self, queue: Arc<dyn MessageQueue>) -> Self {
        self.local = Some(queue);
        self
    }

    /// Map message type names to topic names. Defaults to no prefix.
    pub fn with_topic_namer(mut self, namer: TopicNamer) -> Self {
        self.topic_namer = namer;
        self
    }

    /// Reuse metadata that was already detected.
    pub fn with_metadata(mut self, metadata: CommonMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Use `version` as the `SenderVersion` metadata when none was given.
    pub fn with_application_version(mut self, version: impl Into<String>) -> Self {
        self.application_version = Some(version.into());
        self
    }

    pub fn build(self) -> TransactionalBus {
        let metadata = self
            .metadata
            .unwrap_or_else(|| CommonMetadata::detect(self.application_version.as_deref()));
        let forward = BusForward {
            publisher: self.publisher,
            local: self.local,
            topic_namer: self.topic_namer,
            metadata,
        };
        TransactionalBus {
            outbox: Outbox::new(forward, self.logger),
        }
    }
}

impl TransactionalBus {
    /// Start building a bus whose sends are logged through `logger`.
    pub fn builder(logger: Arc<dyn MessageLogger>) -> TransactionalBusBuilder {
        TransactionalBusBuilder {
            publisher: None,
            local: None,
            topic_namer: TopicNamer::default(),
            metadata: None,
            application_version: None,
            logger,
        }
    }

    /// Whether a topic publisher is configured.
    pub fn can_publish(&self) -> bool {
        self.outbox.forwarder().publisher.is_some()
    }

    /// Messages buffered across all open units of work.
    pub fn pending(&self) -> usize {
        self.outbox.pending()
    }
}

impl Bus for TransactionalBus {
    fn publish_message(&self, message: OutboundMessage) -> Result<(), SendError> {
        if !self.can_publish() {
            return Err(TransportError::Disabled.into());
        }
        let topic = self.outbox.forwarder().topic_namer.topic_for(message.message_type);
        self.outbox.submit(Route::Topic(topic), message)
    }

    fn publish_local_message(&self, message: OutboundMessage) -> Result<(), SendError> {
        if self.outbox.forwarder().local.is_none() {
            return Err(TransportError::Disabled.into());
        }
        self.outbox.submit(Route::Local, message)
    }
}
