//! Cooperative cancellation shared between a pump and its transport.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// A clonable cancellation signal backed by `Mutex<bool>` + `Condvar`.
///
/// `cancel()` wakes every thread blocked in [`CancellationToken::wait_timeout`],
/// so a transport long-poll can give up as soon as `stop()` is requested.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Signal>,
}

#[derive(Default)]
struct Signal {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        let mut cancelled = match self.inner.cancelled.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *cancelled = true;
        self.inner.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        match self.inner.cancelled.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Block for up to `timeout` or until cancelled, whichever comes first.
    ///
    /// Returns `true` if the token is cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = match self.inner.cancelled.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *guard {
            return true;
        }
        match self
            .inner
            .wake
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
        {
            Ok((guard, _)) => *guard,
            Err(poisoned) => *poisoned.into_inner().0,
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
