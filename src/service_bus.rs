//! Top-level wiring: configuration, handlers, scope and transports.

use std::sync::Arc;

use tracing::info;

use crate::config::{BusConfig, TopicNamer};
use crate::error::{ConfigError, TransportError};
use crate::handler::HandlerRegistry;
use crate::logging::{MessageLogger, TracingMessageLogger};
use crate::message::CommonMetadata;
use crate::outbox::{Bus, TransactionalBus, TransactionalQueue};
use crate::pump::PumpStats;
use crate::receive::ReceiveQueue;
use crate::scope::Scope;
use crate::transport::{MessageQueue, TopicPublisher};

/// A configured bus.
///
/// Handlers resolve `dyn Bus` (publish / publish local) and, when the bus
/// receives, `dyn Queue` (send local) from their scope; each handler gets
/// its own outbox instances.
///
/// ## Example
///
/// ```
/// use std::sync::Arc;
/// use transit_bus::transport::{InMemoryQueue, InMemoryTopics};
/// use transit_bus::{BusConfig, HandlerRegistry, ReceiveConfig, ServiceBus};
///
/// let topics = InMemoryTopics::new();
/// let queue = InMemoryQueue::new().with_topics(topics.clone());
///
/// let bus = ServiceBus::builder(
///     BusConfig::new().with_bus_name("shop").with_receive(ReceiveConfig::new("orders")),
/// )
/// .with_registry(HandlerRegistry::new())
/// .with_publisher(Arc::new(topics))
/// .with_queue(Arc::new(queue))
/// .build()
/// .unwrap();
///
/// bus.start_receiving().unwrap();
/// let stats = bus.stop_receiving();
/// assert_eq!(stats.handled, 0);
/// ```
pub struct ServiceBus {
    config: BusConfig,
    scope: Scope,
    logger: Arc<dyn MessageLogger>,
    publisher: Option<Arc<dyn TopicPublisher>>,
    queue: Option<Arc<dyn MessageQueue>>,
    topic_namer: TopicNamer,
    metadata: CommonMetadata,
    receive: Option<ReceiveQueue>,
}

/// Builder for [`ServiceBus`].
pub struct ServiceBusBuilder {
    config: BusConfig,
    registry: HandlerRegistry,
    scope: Scope,
    logger: Arc<dyn MessageLogger>,
    publisher: Option<Arc<dyn TopicPublisher>>,
    queue: Option<Arc<dyn MessageQueue>>,
    topic_namer: Option<TopicNamer>,
    metadata: Option<CommonMetadata>,
}

impl ServiceBusBuilder {
    pub fn with_registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Root scope handlers resolve their dependencies from.
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn MessageLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Topic service used by `publish`. Without one, publishing is disabled.
    pub fn with_publisher(mut self, publisher: Arc<dyn TopicPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// The bus's own input queue.
    pub fn with_queue(mut self, queue: Arc<dyn MessageQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_topic_namer(mut self, namer: TopicNamer) -> Self {
        self.topic_namer = Some(namer);
        self
    }

    pub fn with_metadata(mut self, metadata: CommonMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn build(self) -> Result<ServiceBus, ConfigError> {
        self.config.validate()?;

        let metadata = self
            .metadata
            .unwrap_or_else(|| CommonMetadata::detect(self.config.application_version.as_deref()));
        let topic_namer = self.topic_namer.unwrap_or_else(|| self.config.topic_namer());
        self.scope.register::<dyn MessageLogger>(self.logger.clone());

        let mut bus = ServiceBus {
            config: self.config,
            scope: self.scope,
            logger: self.logger,
            publisher: self.publisher,
            queue: self.queue,
            topic_namer,
            metadata,
            receive: None,
        };

        if let (Some(receive), Some(name)) = (bus.config.receive.clone(), bus.config.queue_name()) {
            let queue = bus.queue.clone().ok_or(ConfigError::NotConfigured("input queue"))?;
            let send_bus = bus.send_bus_factory();
            let receive_queue = ReceiveQueue::new(
                name,
                receive,
                queue,
                Arc::new(self.registry),
                bus.logger.clone(),
            )?
            .with_scope(bus.scope.clone())
            .with_metadata(bus.metadata.clone())
            .with_pre_handler(move |scope| {
                scope.register::<dyn Bus>(Arc::new(send_bus()));
            });
            bus.receive = Some(receive_queue);
        }
        Ok(bus)
    }
}

impl ServiceBus {
    pub fn builder(config: BusConfig) -> ServiceBusBuilder {
        ServiceBusBuilder {
            config,
            registry: HandlerRegistry::new(),
            scope: Scope::new(),
            logger: Arc::new(TracingMessageLogger),
            publisher: None,
            queue: None,
            topic_namer: None,
            metadata: None,
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn topic_namer(&self) -> &TopicNamer {
        &self.topic_namer
    }

    fn send_bus_factory(&self) -> impl Fn() -> TransactionalBus + Send + Sync + 'static {
        let publisher = self.publisher.clone();
        let queue = self.queue.clone();
        let namer = self.topic_namer.clone();
        let metadata = self.metadata.clone();
        let logger = self.logger.clone();
        move || {
            let mut builder = TransactionalBus::builder(logger.clone())
                .with_topic_namer(namer.clone())
                .with_metadata(metadata.clone());
            if let Some(publisher) = &publisher {
                builder = builder.with_publisher(publisher.clone());
            }
            if let Some(queue) = &queue {
                builder = builder.with_local_queue(queue.clone());
            }
            builder.build()
        }
    }

    /// A fresh bus for sending from outside a handler.
    pub fn create_send_bus(&self) -> TransactionalBus {
        (self.send_bus_factory())()
    }

    /// A fresh outbox sending to the input queue.
    pub fn create_queue(&self) -> Result<TransactionalQueue, ConfigError> {
        self.receive_queue().map(ReceiveQueue::create_queue)
    }

    pub fn receive_queue(&self) -> Result<&ReceiveQueue, ConfigError> {
        self.receive
            .as_ref()
            .ok_or(ConfigError::NotConfigured("receive queue"))
    }

    /// Subscribe the input queue to the topic of every handled message type.
    pub fn subscribe_to_handled_types(&self) -> Result<Vec<String>, TransportError> {
        match &self.receive {
            Some(receive) => receive.subscribe_to_handled_types(&self.topic_namer),
            None => Ok(Vec::new()),
        }
    }

    pub fn start_receiving(&self) -> Result<(), ConfigError> {
        let receive = self.receive_queue()?;
        receive.start_receiving()?;
        info!(
            bus = self.config.bus_name.as_deref().unwrap_or_default(),
            queue = receive.name(),
            "bus receiving"
        );
        Ok(())
    }

    /// Stop every pump and return their combined statistics.
    pub fn stop_receiving(&self) -> PumpStats {
        self.receive
            .as_ref()
            .map(ReceiveQueue::stop_receiving)
            .unwrap_or_default()
    }
}
