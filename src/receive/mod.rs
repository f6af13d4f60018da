//! Receive queue - the pumps that serve one input queue.
//!
//! ```text
//!               ┌─ PumpThread(<queue>-pump-0) ─┐
//! MessageQueue ─┼─ PumpThread(<queue>-pump-1) ─┼─► MessageProcessor (shared)
//!               └─ ...                        ─┘      each handler scope gets
//!                                                      a fresh dyn Queue outbox
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::config::{ReceiveConfig, TopicNamer};
use crate::error::{ConfigError, TransportError};
use crate::handler::HandlerRegistry;
use crate::logging::MessageLogger;
use crate::message::{CommonMetadata, MessageParser};
use crate::outbox::{Queue, TransactionalQueue};
use crate::processor::MessageProcessor;
use crate::pump::{MessagePump, PumpStats, PumpThread};
use crate::scope::Scope;
use crate::transport::MessageQueue;

type Hook = Arc<dyn Fn(&Scope) + Send + Sync>;

/// Owns the polling workers for one input queue.
pub struct ReceiveQueue {
    name: String,
    config: ReceiveConfig,
    queue: Arc<dyn MessageQueue>,
    registry: Arc<HandlerRegistry>,
    scope: Scope,
    logger: Arc<dyn MessageLogger>,
    metadata: CommonMetadata,
    hook: Option<Hook>,
    workers: Mutex<Vec<PumpThread>>,
}

impl ReceiveQueue {
    pub fn new(
        name: impl Into<String>,
        config: ReceiveConfig,
        queue: Arc<dyn MessageQueue>,
        registry: Arc<HandlerRegistry>,
        logger: Arc<dyn MessageLogger>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            config,
            queue,
            registry,
            scope: Scope::new(),
            logger,
            metadata: CommonMetadata::detect(None),
            hook: None,
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Resolve handler dependencies from `scope`.
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_metadata(mut self, metadata: CommonMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Extra per-handler registrations, run after the queue outbox is
    /// registered.
    pub fn with_pre_handler(mut self, hook: impl Fn(&Scope) + Send + Sync + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ReceiveConfig {
        &self.config
    }

    fn workers(&self) -> MutexGuard<'_, Vec<PumpThread>> {
        match self.workers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// A fresh outbox sending to this queue.
    pub fn create_queue(&self) -> TransactionalQueue {
        TransactionalQueue::with_metadata(
            self.queue.clone(),
            self.logger.clone(),
            self.metadata.clone(),
        )
    }

    /// The processor the pumps share.
    pub fn processor(&self) -> MessageProcessor {
        let queue = self.queue.clone();
        let logger = self.logger.clone();
        let metadata = self.metadata.clone();
        let hook = self.hook.clone();

        MessageProcessor::new(self.registry.clone(), self.scope.clone())
            .with_execution(self.config.handler_execution)
            .with_pre_handler(move |scope| {
                let outbox =
                    TransactionalQueue::with_metadata(queue.clone(), logger.clone(), metadata.clone());
                scope.register::<dyn Queue>(Arc::new(outbox));
                if let Some(hook) = &hook {
                    hook(scope);
                }
            })
    }

    /// Spawn one pump per configured polling instance.
    pub fn start_receiving(&self) -> Result<(), ConfigError> {
        if self.config.polling_instances == 0 {
            return Err(ConfigError::invalid(
                "polling_instances",
                "at least one polling instance is required to receive",
            ));
        }

        let mut workers = self.workers();
        if !workers.is_empty() {
            warn!(queue = %self.name, "already receiving");
            return Ok(());
        }

        let processor = Arc::new(self.processor());
        let parser = MessageParser::new(self.registry.message_types());
        for index in 0..self.config.polling_instances {
            let pump = MessagePump::new(self.queue.clone(), parser.clone(), processor.clone())
                .with_id(format!("{}-pump-{index}", self.name))
                .with_retry_limit(self.config.retry_count)
                .with_fault_trigger(self.config.fault_trigger)
                .with_logger(self.logger.clone());
            workers.push(PumpThread::spawn(pump));
        }
        info!(queue = %self.name, pumps = workers.len(), "started receiving");
        Ok(())
    }

    pub fn is_receiving(&self) -> bool {
        !self.workers().is_empty()
    }

    /// Stop every pump, wait for them to exit and sum their statistics.
    pub fn stop_receiving(&self) -> PumpStats {
        let workers = std::mem::take(&mut *self.workers());
        for worker in &workers {
            worker.signal_stop();
        }

        let mut total = PumpStats::default();
        for worker in workers {
            total.merge(&worker.stop());
        }
        info!(queue = %self.name, ?total, "stopped receiving");
        total
    }

    pub fn subscribe(&self, topics: &[String]) -> Result<(), TransportError> {
        self.queue.subscribe(topics)
    }

    /// Subscribe to the topic of every message type with a handler.
    /// Returns the topic names.
    pub fn subscribe_to_handled_types(&self, namer: &TopicNamer) -> Result<Vec<String>, TransportError> {
        let topics: Vec<String> = self
            .registry
            .handled_type_names()
            .into_iter()
            .map(|name| namer.topic_for(name))
            .collect();
        if !topics.is_empty() {
            self.subscribe(&topics)?;
        }
        Ok(topics)
    }
}

impl Drop for ReceiveQueue {
    fn drop(&mut self) {
        for worker in self.workers().iter() {
            worker.signal_stop();
        }
    }
}
