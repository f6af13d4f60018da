//! Static dispatch table from message type to handler closures.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use super::traits::{HandleMessage, HandleMessageFault};
use crate::error::{HandlerError, ProcessingError};
use crate::message::{Message, MessageTypes, TransportMessage};
use crate::scope::{FromScope, Scope};

type InvokeFn = Box<dyn Fn(&Scope, &(dyn Any + Send + Sync)) -> Result<(), ProcessingError> + Send + Sync>;
type FaultFn =
    Box<dyn Fn(&Scope, &TransportMessage, &ProcessingError) -> Result<(), ProcessingError> + Send + Sync>;

/// One registered handler: how to build it from a scope and call it.
pub struct HandlerEntry {
    name: &'static str,
    id: TypeId,
    invoke: InvokeFn,
}

impl HandlerEntry {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Build the handler from `scope` and run it against `payload`.
    pub fn invoke(
        &self,
        scope: &Scope,
        payload: &(dyn Any + Send + Sync),
    ) -> Result<(), ProcessingError> {
        (self.invoke)(scope, payload)
    }
}

/// One registered fault handler.
pub struct FaultHandlerEntry {
    name: &'static str,
    id: TypeId,
    invoke: FaultFn,
}

impl FaultHandlerEntry {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn invoke(
        &self,
        scope: &Scope,
        message: &TransportMessage,
        error: &ProcessingError,
    ) -> Result<(), ProcessingError> {
        (self.invoke)(scope, message, error)
    }
}

fn construct<H: FromScope>(scope: &Scope, name: &'static str) -> Result<H, ProcessingError> {
    H::from_scope(scope).map_err(|source| ProcessingError::Construction {
        handler: name,
        source,
    })
}

fn handler_failed(name: &'static str) -> impl FnOnce(HandlerError) -> ProcessingError {
    move |source| ProcessingError::Handler {
        handler: name,
        source,
    }
}

fn wrong_payload<M>(name: &'static str) -> ProcessingError {
    ProcessingError::Handler {
        handler: name,
        source: HandlerError::Rejected(format!("payload is not a `{}`", type_name::<M>())),
    }
}

/// Message type → handlers, and message type → fault handlers.
///
/// Built once at startup and read-only afterwards. Handlers for one type are
/// kept in registration order for deterministic iteration; callers must not
/// rely on any ordering between them. Registering the same handler twice for
/// a type is a no-op.
///
/// ```
/// use transit_bus::{HandleMessage, HandlerError, HandlerRegistry};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct OrderPlaced { id: u64 }
///
/// #[derive(Default)]
/// struct Audit;
///
/// impl HandleMessage<OrderPlaced> for Audit {
///     fn handle(&self, _message: &OrderPlaced) -> Result<(), HandlerError> {
///         Ok(())
///     }
/// }
///
/// let registry = HandlerRegistry::new().handler::<OrderPlaced, Audit>();
/// assert_eq!(registry.handler_count::<OrderPlaced>(), 1);
/// ```
#[derive(Default)]
pub struct HandlerRegistry {
    types: MessageTypes,
    handlers: HashMap<TypeId, Vec<HandlerEntry>>,
    fault_handlers: HashMap<TypeId, Vec<FaultHandlerEntry>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_handler(&mut self, message: TypeId, entry: HandlerEntry) {
        let entries = self.handlers.entry(message).or_default();
        if !entries.iter().any(|e| e.id == entry.id) {
            entries.push(entry);
        }
    }

    fn push_fault_handler(&mut self, key: TypeId, entry: FaultHandlerEntry) {
        let entries = self.fault_handlers.entry(key).or_default();
        if !entries.iter().any(|e| e.id == entry.id) {
            entries.push(entry);
        }
    }

    /// Register `H` as a handler for `M`, built per invocation via `FromScope`.
    pub fn handler<M, H>(mut self) -> Self
    where
        M: Message,
        H: HandleMessage<M> + FromScope + 'static,
    {
        self.types.register::<M>();
        let name = type_name::<H>();
        self.push_handler(
            TypeId::of::<M>(),
            HandlerEntry {
                name,
                id: TypeId::of::<H>(),
                invoke: Box::new(move |scope, payload| {
                    let message = payload
                        .downcast_ref::<M>()
                        .ok_or_else(|| wrong_payload::<M>(name))?;
                    let handler = construct::<H>(scope, name)?;
                    handler.handle(message).map_err(handler_failed(name))
                }),
            },
        );
        self
    }

    /// Register a closure as a handler for `M`.
    pub fn handler_fn<M, F>(mut self, name: &'static str, handler: F) -> Self
    where
        M: Message,
        F: Fn(&Scope, &M) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.types.register::<M>();
        self.push_handler(
            TypeId::of::<M>(),
            HandlerEntry {
                name,
                id: TypeId::of::<F>(),
                invoke: Box::new(move |scope, payload| {
                    let message = payload
                        .downcast_ref::<M>()
                        .ok_or_else(|| wrong_payload::<M>(name))?;
                    handler(scope, message).map_err(handler_failed(name))
                }),
            },
        );
        self
    }

    /// Register `H` as a fault handler for `M`.
    pub fn fault_handler<M, H>(mut self) -> Self
    where
        M: Message,
        H: HandleMessageFault<M> + FromScope + 'static,
    {
        self.types.register::<M>();
        let name = type_name::<H>();
        self.push_fault_handler(
            TypeId::of::<M>(),
            FaultHandlerEntry {
                name,
                id: TypeId::of::<H>(),
                invoke: Box::new(move |scope, message, error| {
                    let payload = message
                        .payload::<M>()
                        .ok_or_else(|| wrong_payload::<M>(name))?;
                    let handler = construct::<H>(scope, name)?;
                    handler
                        .handle_fault(payload, error)
                        .map_err(handler_failed(name))
                }),
            },
        );
        self
    }

    /// Register `H` as a catch-all fault handler, invoked for every faulted
    /// message whether or not it parsed.
    pub fn catch_all_fault_handler<H>(mut self) -> Self
    where
        H: HandleMessageFault<TransportMessage> + FromScope + 'static,
    {
        let name = type_name::<H>();
        self.push_fault_handler(
            TypeId::of::<TransportMessage>(),
            FaultHandlerEntry {
                name,
                id: TypeId::of::<H>(),
                invoke: Box::new(move |scope, message, error| {
                    let handler = construct::<H>(scope, name)?;
                    handler
                        .handle_fault(message, error)
                        .map_err(handler_failed(name))
                }),
            },
        );
        self
    }

    /// Register a closure as a catch-all fault handler.
    pub fn catch_all_fault_fn<F>(mut self, name: &'static str, handler: F) -> Self
    where
        F: Fn(&Scope, &TransportMessage, &ProcessingError) -> Result<(), HandlerError>
            + Send
            + Sync
            + 'static,
    {
        self.push_fault_handler(
            TypeId::of::<TransportMessage>(),
            FaultHandlerEntry {
                name,
                id: TypeId::of::<F>(),
                invoke: Box::new(move |scope, message, error| {
                    handler(scope, message, error).map_err(handler_failed(name))
                }),
            },
        );
        self
    }

    /// Make `M` parseable without registering a handler for it.
    pub fn message_type<M: Message>(mut self) -> Self {
        self.types.register::<M>();
        self
    }

    /// Handlers registered for the message type `id`.
    pub fn handlers_for(&self, id: TypeId) -> &[HandlerEntry] {
        self.handlers.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Fault handlers keyed by the payload type `id`.
    pub fn fault_handlers_for(&self, id: TypeId) -> &[FaultHandlerEntry] {
        self.fault_handlers.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Fault handlers registered for every faulted message.
    pub fn catch_all_fault_handlers(&self) -> &[FaultHandlerEntry] {
        self.fault_handlers_for(TypeId::of::<TransportMessage>())
    }

    pub fn handler_count<M: 'static>(&self) -> usize {
        self.handlers_for(TypeId::of::<M>()).len()
    }

    /// Every type the parser should recognise.
    pub fn message_types(&self) -> Arc<MessageTypes> {
        Arc::new(self.types.clone())
    }

    /// Wire names of the types that have at least one handler, sorted.
    pub fn handled_type_names(&self) -> Vec<&'static str> {
        self.types
            .names()
            .into_iter()
            .filter(|name| {
                self.types
                    .resolve(name)
                    .is_some_and(|t| !self.handlers_for(t.id()).is_empty())
            })
            .collect()
    }
}
