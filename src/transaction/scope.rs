//! Lexical transaction scopes over the ambient transaction.

use tracing::warn;

use super::transaction::{AmbientGuard, Transaction, TransactionStatus};
use crate::error::TransactionError;

/// Opens (or joins) the ambient transaction for the current thread.
///
/// The outermost scope owns the transaction: when it finishes it commits if
/// it and every joined scope called `complete()`, and rolls back otherwise.
/// A joined scope that finishes without `complete()` dooms the transaction.
///
/// ```
/// use transit_bus::transaction::{Transaction, TransactionScope, TransactionStatus};
///
/// let mut scope = TransactionScope::new();
/// assert!(Transaction::current().is_some());
/// scope.complete();
/// assert_eq!(scope.finish(), Ok(TransactionStatus::Committed));
/// assert!(Transaction::current().is_none());
/// ```
pub struct TransactionScope {
    transaction: Transaction,
    owner: bool,
    completed: bool,
    finished: bool,
    guard: Option<AmbientGuard>,
}

impl Default for TransactionScope {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionScope {
    pub fn new() -> Self {
        let (transaction, owner) = match Transaction::current() {
            Some(ambient) if ambient.is_active() => (ambient, false),
            _ => (Transaction::new(), true),
        };
        let guard = Some(transaction.enter());
        Self {
            transaction,
            owner,
            completed: false,
            finished: false,
            guard,
        }
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// True if this scope created the transaction rather than joining one.
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    /// Vote to commit. Without this the transaction rolls back.
    pub fn complete(&mut self) {
        self.completed = true;
    }

    /// Leave the scope and resolve it now.
    ///
    /// The owning scope returns the commit outcome. A joined scope returns
    /// `Active` when it completed, since the owner decides the outcome.
    pub fn finish(mut self) -> Result<TransactionStatus, TransactionError> {
        self.resolve()
    }

    fn resolve(&mut self) -> Result<TransactionStatus, TransactionError> {
        self.finished = true;
        self.guard.take();

        if !self.completed {
            self.transaction.set_rollback_only();
        }
        if !self.owner {
            return if self.completed {
                Ok(self.transaction.status())
            } else {
                Err(TransactionError::RolledBack)
            };
        }
        if self.completed && !self.transaction.is_rollback_only() {
            self.transaction.commit()
        } else {
            self.transaction.rollback()?;
            Err(TransactionError::RolledBack)
        }
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.resolve() {
            if self.completed {
                warn!(transaction = %self.transaction.id(), error = %err, "transaction did not commit");
            }
        }
    }
}

/// Run `work` inside a unit of work that commits iff it returns `Ok`.
///
/// A commit failure (a participant refusing to prepare) is logged; the
/// value `work` returned is passed through either way.
pub fn with_unit_of_work<T, E>(work: impl FnOnce(&Transaction) -> Result<T, E>) -> Result<T, E> {
    let mut scope = TransactionScope::new();
    let result = work(scope.transaction());
    if result.is_ok() {
        scope.complete();
    }
    if let Err(err) = scope.finish() {
        if result.is_ok() {
            warn!(error = %err, "unit of work did not commit");
        }
    }
    result
}
