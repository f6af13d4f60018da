//! The transactional buffer shared by both send surfaces.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{error, trace, warn};
use uuid::Uuid;

use crate::error::{SendError, TransactionError};
use crate::logging::MessageLogger;
use crate::message::OutboundMessage;
use crate::transaction::{Enlistment, Transaction};

/// Delivers one outbound message to a transport.
pub(crate) trait Forward: Send + Sync + 'static {
    /// Where a buffered message goes (e.g. topic vs local queue).
    type Route: Send + 'static;

    fn forward(&self, route: &Self::Route, message: &OutboundMessage) -> Result<(), SendError>;
}

type Pending<R> = Vec<(R, OutboundMessage)>;

/// Sends immediately outside a unit of work; inside one, buffers until
/// that unit of work resolves.
///
/// Buffers are keyed by transaction id, so one outbox shared between
/// threads never forwards or discards another unit of work's sends.
pub(crate) struct Outbox<F: Forward> {
    forward: F,
    logger: Arc<dyn MessageLogger>,
    buffers: Mutex<HashMap<Uuid, Pending<F::Route>>>,
}

impl<F: Forward> Outbox<F> {
    pub(crate) fn new(forward: F, logger: Arc<dyn MessageLogger>) -> Arc<Self> {
        Arc::new(Self {
            forward,
            logger,
            buffers: Mutex::new(HashMap::new()),
        })
    }

    pub(crate) fn forwarder(&self) -> &F {
        &self.forward
    }

    fn buffers(&self) -> MutexGuard<'_, HashMap<Uuid, Pending<F::Route>>> {
        match self.buffers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Messages buffered across every unresolved unit of work.
    pub(crate) fn pending(&self) -> usize {
        self.buffers().values().map(Vec::len).sum()
    }

    pub(crate) fn submit(
        self: &Arc<Self>,
        route: F::Route,
        message: OutboundMessage,
    ) -> Result<(), SendError> {
        let Some(transaction) = Transaction::current().filter(Transaction::is_active) else {
            return self.send_now(&route, &message);
        };

        let id = transaction.id();
        let enlisted = self.buffers().contains_key(&id);
        if !enlisted {
            let participant = Arc::new(TransactionBuffer {
                outbox: self.clone(),
                transaction: id,
            });
            if !transaction.enlist(participant) {
                return Err(TransactionError::AlreadyCompleted.into());
            }
        }

        trace!(message_type = message.message_type, transaction = %id, "buffered until commit");
        self.buffers().entry(id).or_default().push((route, message));
        Ok(())
    }

    fn send_now(&self, route: &F::Route, message: &OutboundMessage) -> Result<(), SendError> {
        self.logger
            .outbound_log_message(&message.body, message.message_type);
        self.forward.forward(route, message)
    }

    fn take(&self, transaction: Uuid) -> Pending<F::Route> {
        self.buffers().remove(&transaction).unwrap_or_default()
    }

    fn flush(&self, transaction: Uuid) {
        for (route, message) in &self.take(transaction) {
            if let Err(err) = self.send_now(route, message) {
                error!(
                    message_type = message.message_type,
                    error = %err,
                    "failed to forward committed message"
                );
            }
        }
    }

    fn discard(&self, transaction: Uuid) {
        let discarded = self.take(transaction);
        if !discarded.is_empty() {
            trace!(count = discarded.len(), %transaction, "discarded outbound messages on rollback");
        }
    }

    fn discard_in_doubt(&self, transaction: Uuid) {
        let discarded = self.take(transaction);
        if !discarded.is_empty() {
            warn!(
                count = discarded.len(),
                %transaction,
                "transaction in doubt, outbound messages not sent"
            );
        }
    }
}

/// One outbox's stake in one unit of work.
struct TransactionBuffer<F: Forward> {
    outbox: Arc<Outbox<F>>,
    transaction: Uuid,
}

impl<F: Forward> Enlistment for TransactionBuffer<F> {
    fn commit(&self) {
        self.outbox.flush(self.transaction);
    }

    fn rollback(&self) {
        self.outbox.discard(self.transaction);
    }

    fn in_doubt(&self) {
        self.outbox.discard_in_doubt(self.transaction);
    }
}
