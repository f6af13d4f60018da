//! Dispatch of one parsed message to its handlers.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tracing::{debug, error, info_span, warn, Span};

use super::result::MessageProcessingResult;
use super::statistics::{MessageStatistics, StatisticsListener};
use crate::config::HandlerExecution;
use crate::error::{panic_message, HandlerError, ProcessingError};
use crate::handler::{FaultHandlerEntry, HandlerEntry, HandlerRegistry};
use crate::message::TransportMessage;
use crate::scope::Scope;
use crate::transaction::{Transaction, TransactionScope};

type PreHandler = Arc<dyn Fn(&Scope) + Send + Sync>;

/// Resolves and invokes the handlers for a message.
///
/// Every handler for one message runs in its own child scope under one
/// shared unit of work: all succeed and it commits, or any fails and it
/// rolls back, discarding what every handler sent through an outbox.
pub struct MessageProcessor {
    registry: Arc<HandlerRegistry>,
    scope: Scope,
    pre_handler: Option<PreHandler>,
    execution: HandlerExecution,
}

impl MessageProcessor {
    /// Create a processor that builds handlers from children of `scope`.
    /// Handlers run sequentially unless `with_execution` says otherwise.
    pub fn new(registry: Arc<HandlerRegistry>, scope: Scope) -> Self {
        Self {
            registry,
            scope,
            pre_handler: None,
            execution: HandlerExecution::Sequential,
        }
    }

    /// Run `hook` on each handler's child scope before the handler is built,
    /// e.g. to register a fresh outbox per handler.
    pub fn with_pre_handler(mut self, hook: impl Fn(&Scope) + Send + Sync + 'static) -> Self {
        self.pre_handler = Some(Arc::new(hook));
        self
    }

    /// Choose between sequential and parallel handler execution.
    pub fn with_execution(mut self, execution: HandlerExecution) -> Self {
        self.execution = execution;
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Dispatch a parsed message to every handler registered for its type.
    ///
    /// All handlers run even after one fails. The result is successful only
    /// when the message parsed, at least one handler exists, and every
    /// handler built and returned `Ok`; otherwise it carries one of the
    /// failures.
    pub fn process_message(&self, message: &TransportMessage) -> MessageProcessingResult {
        let started = Instant::now();

        let (Some(message_type), Some(payload)) = (message.message_type, message.message.as_deref())
        else {
            return MessageProcessingResult::failure(ProcessingError::ParseFailure, started.elapsed());
        };

        let handlers = self.registry.handlers_for(message_type.id());
        if handlers.is_empty() {
            warn!(message_type = message_type.name(), "no handler registered");
            return MessageProcessingResult::failure(
                ProcessingError::NoHandler(message_type.name().to_string()),
                started.elapsed(),
            );
        }

        let mut unit_of_work = TransactionScope::new();
        let mut errors: Vec<ProcessingError> = match self.execution {
            HandlerExecution::Sequential => handlers
                .iter()
                .filter_map(|entry| self.invoke(entry, message_type.name(), payload).err())
                .collect(),
            HandlerExecution::Parallel => self.invoke_parallel(handlers, message_type.name(), payload),
        };

        let error = match errors.pop() {
            Some(error) => {
                drop(unit_of_work);
                Some(error)
            }
            None => {
                unit_of_work.complete();
                unit_of_work.finish().err().map(ProcessingError::Transaction)
            }
        };

        let runtime = started.elapsed();
        match error {
            Some(error) => MessageProcessingResult::failure(error, runtime),
            None => {
                debug!(message_type = message_type.name(), ?runtime, "message processed");
                MessageProcessingResult::success(runtime)
            }
        }
    }

    fn invoke(
        &self,
        entry: &HandlerEntry,
        message_type: &'static str,
        payload: &(dyn Any + Send + Sync),
    ) -> Result<(), ProcessingError> {
        let span = info_span!("handler", handler = entry.name(), message_type);
        let _entered = span.enter();
        let child = self.handler_scope(&span);

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            if let Some(hook) = &self.pre_handler {
                hook(&child);
            }
            entry.invoke(&child, payload)
        }))
        .unwrap_or_else(|panic| {
            Err(ProcessingError::Handler {
                handler: entry.name(),
                source: HandlerError::Panicked(panic_message(panic.as_ref())),
            })
        });

        if let Err(err) = &outcome {
            warn!(error = %err, "handler failed");
        }
        outcome
    }

    fn invoke_parallel(
        &self,
        handlers: &[HandlerEntry],
        message_type: &'static str,
        payload: &(dyn Any + Send + Sync),
    ) -> Vec<ProcessingError> {
        let transaction = Transaction::current();
        thread::scope(|s| {
            let workers: Vec<_> = handlers
                .iter()
                .map(|entry| {
                    let transaction = transaction.clone();
                    let worker = s.spawn(move || {
                        let _ambient = transaction.as_ref().map(Transaction::enter);
                        self.invoke(entry, message_type, payload)
                    });
                    (entry.name(), worker)
                })
                .collect();

            workers
                .into_iter()
                .filter_map(|(name, worker)| match worker.join() {
                    Ok(outcome) => outcome.err(),
                    Err(panic) => Some(ProcessingError::Handler {
                        handler: name,
                        source: HandlerError::Panicked(panic_message(panic.as_ref())),
                    }),
                })
                .collect()
        })
    }

    fn handler_scope(&self, span: &Span) -> Scope {
        let child = self.scope.nested();
        child.register_value(span.clone());
        child
    }

    /// Notify fault handlers that `message` exhausted its retries.
    ///
    /// Handlers keyed by the payload type run only if the message parsed;
    /// catch-all handlers always run. Their failures are logged and dropped.
    /// Returns the number of fault handlers invoked.
    pub fn process_faulted_message(&self, message: &TransportMessage, error: &ProcessingError) -> usize {
        let mut entries: Vec<&FaultHandlerEntry> = Vec::new();
        if message.parsing_succeeded() {
            if let Some(message_type) = message.message_type {
                entries.extend(self.registry.fault_handlers_for(message_type.id()));
            }
        }
        entries.extend(self.registry.catch_all_fault_handlers());

        for entry in &entries {
            let span = info_span!(
                "fault_handler",
                handler = entry.name(),
                message_type = %message.message_type_name
            );
            let _entered = span.enter();
            let child = self.handler_scope(&span);

            let outcome = catch_unwind(AssertUnwindSafe(|| {
                if let Some(hook) = &self.pre_handler {
                    hook(&child);
                }
                entry.invoke(&child, message, error)
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!(error = %err, "fault handler failed"),
                Err(panic) => error!(panic = %panic_message(panic.as_ref()), "fault handler panicked"),
            }
        }
        entries.len()
    }

    /// Broadcast `statistics` to every `dyn StatisticsListener` in scope.
    pub fn process_statistics(&self, statistics: &MessageStatistics) {
        for listener in self.scope.resolve_all::<dyn StatisticsListener>() {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener.on_statistics(statistics))) {
                error!(panic = %panic_message(panic.as_ref()), "statistics listener panicked");
            }
        }
    }
}
