mod cancellation;
mod config;
mod error;
mod handler;
mod logging;
pub mod message;
pub mod outbox;
pub mod processor;
pub mod pump;
mod receive;
mod scope;
mod service_bus;
pub mod testing;
pub mod transaction;
pub mod transport;

pub use cancellation::CancellationToken;
pub use config::{BusConfig, FaultTrigger, HandlerExecution, ReceiveConfig, TopicNamer};
pub use error::{
    ConfigError, HandlerError, ParseError, ProcessingError, ResolveError, SendError,
    TransactionError, TransportError,
};
pub use handler::{
    FaultHandlerEntry, HandleMessage, HandleMessageFault, HandlerEntry, HandlerRegistry,
};
pub use logging::{MessageLogger, NoOpMessageLogger, TracingMessageLogger};
pub use message::{Message, MessageParser, OutboundMessage, TransportMessage};
pub use outbox::{Bus, BusExt, Queue, QueueExt, TransactionalBus, TransactionalQueue};
pub use processor::{
    MessageProcessingResult, MessageProcessor, MessageStatistics, StatisticsListener,
};
pub use pump::{MessagePump, PumpStats, PumpThread};
pub use receive::ReceiveQueue;
pub use scope::{FromScope, Scope};
pub use service_bus::{ServiceBus, ServiceBusBuilder};
pub use transaction::{with_unit_of_work, Transaction, TransactionScope};
