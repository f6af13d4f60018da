//! Transactional sends to the bus's own input queue.

use std::sync::{Arc, OnceLock};

use super::buffer::{Forward, Outbox};
use super::traits::Queue;
use crate::error::SendError;
use crate::logging::MessageLogger;
use crate::message::{CommonMetadata, OutboundMessage};
use crate::transport::MessageQueue;

pub(crate) struct QueueForward {
    queue: Arc<dyn MessageQueue>,
    application_version: Option<String>,
    metadata: OnceLock<CommonMetadata>,
}

impl QueueForward {
    fn metadata(&self) -> &CommonMetadata {
        self.metadata
            .get_or_init(|| CommonMetadata::detect(self.application_version.as_deref()))
    }
}

impl Forward for QueueForward {
    type Route = ();

    fn forward(&self, _route: &(), message: &OutboundMessage) -> Result<(), SendError> {
        self.queue
            .add_message(&message.body, &message.attributes(self.metadata()))?;
        Ok(())
    }
}

/// Sends to the input queue directly (with a `messageType` attribute),
/// deferring the send to commit when a unit of work is ambient.
#[derive(Clone)]
pub struct TransactionalQueue {
    outbox: Arc<Outbox<QueueForward>>,
}

impl TransactionalQueue {
    pub fn new(queue: Arc<dyn MessageQueue>, logger: Arc<dyn MessageLogger>) -> Self {
        Self::build(queue, logger, None, OnceLock::new())
    }

    /// Use `version` as the `SenderVersion` metadata.
    pub fn with_application_version(
        queue: Arc<dyn MessageQueue>,
        logger: Arc<dyn MessageLogger>,
        version: Option<String>,
    ) -> Self {
        Self::build(queue, logger, version, OnceLock::new())
    }

    /// Reuse metadata that was already detected.
    pub fn with_metadata(
        queue: Arc<dyn MessageQueue>,
        logger: Arc<dyn MessageLogger>,
        metadata: CommonMetadata,
    ) -> Self {
        Self::build(queue, logger, None, OnceLock::from(metadata))
    }

    fn build(
        queue: Arc<dyn MessageQueue>,
        logger: Arc<dyn MessageLogger>,
        application_version: Option<String>,
        metadata: OnceLock<CommonMetadata>,
    ) -> Self {
        let forward = QueueForward {
            queue,
            application_version,
            metadata,
        };
        Self {
            outbox: Outbox::new(forward, logger),
        }
    }

    /// Messages buffered across all open units of work.
    pub fn pending(&self) -> usize {
        self.outbox.pending()
    }

    pub fn metadata(&self) -> &CommonMetadata {
        self.outbox.forwarder().metadata()
    }
}

impl Queue for TransactionalQueue {
    fn send_message(&self, message: OutboundMessage) -> Result<(), SendError> {
        self.outbox.submit((), message)
    }
}
