//! Error taxonomy for the delivery pipeline.
//!
//! Nothing here escapes `MessagePump::run`. Parse failures are captured on the
//! `TransportMessage`, handler failures on the `MessageProcessingResult`, and
//! fault-handler / statistics-listener failures are logged and dropped.

use std::any::Any;
use std::error::Error;

use thiserror::Error;

/// Failure to turn a raw transport record into a typed message.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Body was a topic envelope without a `messageType` attribute.
    #[error("invalid message format")]
    InvalidFormat,
    /// The type name does not match any registered message type.
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    /// Body could not be decoded as a topic envelope.
    #[error("failed to parse message envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    /// Payload could not be deserialized into the resolved type.
    #[error("failed to deserialize message body: {0}")]
    Deserialize(#[source] serde_json::Error),
}

/// Why a dispatch attempt did not succeed.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("no handler registered for `{0}`")]
    NoHandler(String),
    #[error("message parse failure")]
    ParseFailure,
    #[error("handler `{handler}` failed: {source}")]
    Handler {
        handler: &'static str,
        #[source]
        source: HandlerError,
    },
    #[error("could not construct handler `{handler}`: {source}")]
    Construction {
        handler: &'static str,
        #[source]
        source: ResolveError,
    },
    /// Every handler succeeded but the unit of work did not commit.
    #[error("unit of work failed: {0}")]
    Transaction(#[from] TransactionError),
}

impl ProcessingError {
    /// The handler error underneath a `Handler` failure, if any.
    pub fn handler_error(&self) -> Option<&HandlerError> {
        match self {
            ProcessingError::Handler { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Error type returned by message and fault handlers.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Business logic rejected the message.
    #[error("rejected: {0}")]
    Rejected(String),
    /// Something the message refers to does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// An outbound send or publish failed.
    #[error("send failed: {0}")]
    Send(#[from] SendError),
    /// A dependency could not be resolved from the handler scope.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// The handler panicked; carries the panic payload message.
    #[error("handler panicked: {0}")]
    Panicked(String),
    #[error("handler error: {0}")]
    Other(Box<dyn Error + Send + Sync>),
}

impl HandlerError {
    pub fn other<E: Error + Send + Sync + 'static>(err: E) -> Self {
        HandlerError::Other(Box::new(err))
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::Send(SendError::Serialize(err))
    }
}

/// Errors reported by queue and topic transports.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Cancellation was observed while waiting on the transport.
    #[error("operation cancelled")]
    Cancelled,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("invalid receipt handle")]
    InvalidReceiptHandle,
    #[error("message rejected: {0}")]
    Rejected(String),
    /// Publishing to a topic is not configured for this bus.
    #[error("public publishing is disabled")]
    Disabled,
    #[error("transport lock poisoned during {0}")]
    LockPoisoned(&'static str),
}

/// Errors raised when sending or publishing an outbound message.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The ambient unit of work resolved before the send could be buffered.
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// A dependency could not be resolved from a scope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("no instance of `{0}` registered in scope")]
    Missing(&'static str),
}

/// Why a unit of work did not commit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// An enlisted participant refused to prepare.
    #[error("participant failed to prepare: {0}")]
    PrepareFailed(String),
    /// A scope was dropped without `complete()`, dooming the transaction.
    #[error("transaction was rolled back")]
    RolledBack,
    #[error("transaction already completed")]
    AlreadyCompleted,
}

/// Invalid bus or receive configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("{0} has not been configured for this bus")]
    NotConfigured(&'static str),
    #[error("failed to read configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
