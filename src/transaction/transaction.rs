//! The unit of work and its participants.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{panic_message, TransactionError};

/// A resource that takes part in a unit of work.
///
/// Participants are told the outcome exactly once: `commit`, `rollback`, or
/// `in_doubt` when another participant failed mid-commit.
pub trait Enlistment: Send + Sync {
    /// Vote on the outcome. Returning an error rolls back every participant.
    fn prepare(&self) -> Result<(), TransactionError> {
        Ok(())
    }

    fn commit(&self);

    fn rollback(&self);

    /// The outcome could not be determined. Must not block resolution.
    fn in_doubt(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    Committed,
    Aborted,
    InDoubt,
}

struct TransactionInner {
    id: Uuid,
    participants: Mutex<Vec<Arc<dyn Enlistment>>>,
    status: Mutex<TransactionStatus>,
    rollback_only: AtomicBool,
}

/// A two-phase unit of work. Cloning shares the same transaction.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TransactionInner>,
}

thread_local! {
    static AMBIENT: RefCell<Vec<Transaction>> = const { RefCell::new(Vec::new()) };
}

fn same_participant(a: &Arc<dyn Enlistment>, b: &Arc<dyn Enlistment>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TransactionInner {
                id: Uuid::new_v4(),
                participants: Mutex::new(Vec::new()),
                status: Mutex::new(TransactionStatus::Active),
                rollback_only: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// The innermost transaction entered on this thread, if any.
    pub fn current() -> Option<Transaction> {
        AMBIENT.with(|stack| stack.borrow().last().cloned())
    }

    /// Make this the ambient transaction on the current thread until the
    /// guard drops. Used to carry a transaction onto worker threads.
    pub fn enter(&self) -> AmbientGuard {
        AMBIENT.with(|stack| stack.borrow_mut().push(self.clone()));
        AmbientGuard {
            _not_send: PhantomData,
        }
    }

    pub fn status(&self) -> TransactionStatus {
        *lock(&self.inner.status)
    }

    pub fn is_active(&self) -> bool {
        self.status() == TransactionStatus::Active
    }

    /// Doom the transaction: it can only roll back from now on.
    pub fn set_rollback_only(&self) {
        self.inner.rollback_only.store(true, Ordering::SeqCst);
    }

    pub fn is_rollback_only(&self) -> bool {
        self.inner.rollback_only.load(Ordering::SeqCst)
    }

    /// Enlist `participant`. Returns `false` if it was already enlisted or
    /// the transaction has been resolved.
    pub fn enlist(&self, participant: Arc<dyn Enlistment>) -> bool {
        if !self.is_active() {
            warn!(transaction = %self.id(), "enlist on a completed transaction ignored");
            return false;
        }
        let mut participants = lock(&self.inner.participants);
        if participants.iter().any(|p| same_participant(p, &participant)) {
            return false;
        }
        participants.push(participant);
        true
    }

    pub fn participant_count(&self) -> usize {
        lock(&self.inner.participants).len()
    }

    fn begin_resolution(&self) -> Result<Vec<Arc<dyn Enlistment>>, TransactionError> {
        let status = lock(&self.inner.status);
        if *status != TransactionStatus::Active {
            return Err(TransactionError::AlreadyCompleted);
        }
        Ok(lock(&self.inner.participants).clone())
    }

    fn finish(&self, status: TransactionStatus) {
        *lock(&self.inner.status) = status;
        lock(&self.inner.participants).clear();
    }

    fn rollback_all(&self, participants: &[Arc<dyn Enlistment>]) {
        for participant in participants {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| participant.rollback())) {
                error!(
                    transaction = %self.id(),
                    panic = %panic_message(panic.as_ref()),
                    "participant panicked during rollback"
                );
            }
        }
        self.finish(TransactionStatus::Aborted);
    }

    /// Prepare every participant, then commit them all.
    ///
    /// A doomed transaction or a failed prepare rolls every participant back
    /// and returns the reason. A participant that panics while committing
    /// leaves the outcome in doubt; the remaining participants are told so.
    pub fn commit(&self) -> Result<TransactionStatus, TransactionError> {
        let participants = self.begin_resolution()?;

        if self.is_rollback_only() {
            self.rollback_all(&participants);
            return Err(TransactionError::RolledBack);
        }

        for participant in &participants {
            let vote = catch_unwind(AssertUnwindSafe(|| participant.prepare())).unwrap_or_else(
                |panic| Err(TransactionError::PrepareFailed(panic_message(panic.as_ref()))),
            );
            if let Err(err) = vote {
                debug!(transaction = %self.id(), error = %err, "prepare failed, rolling back");
                self.rollback_all(&participants);
                return Err(err);
            }
        }

        let mut in_doubt = false;
        for participant in &participants {
            if in_doubt {
                let _ = catch_unwind(AssertUnwindSafe(|| participant.in_doubt()));
                continue;
            }
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| participant.commit())) {
                error!(
                    transaction = %self.id(),
                    panic = %panic_message(panic.as_ref()),
                    "participant panicked during commit, outcome in doubt"
                );
                in_doubt = true;
            }
        }

        let status = if in_doubt {
            TransactionStatus::InDoubt
        } else {
            TransactionStatus::Committed
        };
        self.finish(status);
        Ok(status)
    }

    /// Roll back every participant.
    pub fn rollback(&self) -> Result<(), TransactionError> {
        let participants = self.begin_resolution()?;
        self.rollback_all(&participants);
        Ok(())
    }
}

/// Keeps a transaction ambient on the current thread until dropped.
pub struct AmbientGuard {
    _not_send: PhantomData<*const ()>,
}

impl Drop for AmbientGuard {
    fn drop(&mut self) {
        AMBIENT.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}
