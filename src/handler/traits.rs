//! Handler traits implemented by application code.

use crate::error::{HandlerError, ProcessingError};

/// Handles messages of type `M`.
///
/// A fresh handler is built for every invocation (see `FromScope`), so
/// implementations may hold per-message state.
pub trait HandleMessage<M>: Send + Sync {
    fn handle(&self, message: &M) -> Result<(), HandlerError>;
}

/// Handles messages of type `M` that exhausted their retries.
///
/// Implement for `TransportMessage` to receive every faulted message,
/// including ones that could not be parsed.
pub trait HandleMessageFault<M>: Send + Sync {
    fn handle_fault(&self, message: &M, error: &ProcessingError) -> Result<(), HandlerError>;
}
