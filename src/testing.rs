//! Recording bus for handler unit tests.
//!
//! ```
//! use transit_bus::testing::TestBus;
//! use transit_bus::BusExt;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Invoiced { total: u32 }
//!
//! let bus = TestBus::new();
//! bus.publish(&Invoiced { total: 30 }).unwrap();
//!
//! bus.verify_published::<Invoiced>(|m| m.total == 30, 1);
//! bus.verify_not_published::<String>();
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::SendError;
use crate::message::{type_name_of, Message, OutboundMessage};
use crate::outbox::{Bus, Queue};

#[derive(Default)]
struct Recorded {
    published: Vec<OutboundMessage>,
    published_local: Vec<OutboundMessage>,
    sent: Vec<OutboundMessage>,
}

/// A `Bus` and `Queue` that records instead of sending. Clones share the
/// same recording.
#[derive(Clone, Default)]
pub struct TestBus {
    recorded: Arc<Mutex<Recorded>>,
}

fn matching<M: Message>(messages: &[OutboundMessage], predicate: impl Fn(&M) -> bool) -> usize {
    messages
        .iter()
        .filter(|m| m.message_type == type_name_of::<M>())
        .filter_map(|m| m.decode::<M>().ok())
        .filter(|m| predicate(m))
        .count()
}

fn decoded<M: Message>(messages: &[OutboundMessage]) -> Vec<M> {
    messages
        .iter()
        .filter(|m| m.message_type == type_name_of::<M>())
        .filter_map(|m| m.decode::<M>().ok())
        .collect()
}

impl TestBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        match self.recorded.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Every published `M`, in order.
    pub fn published<M: Message>(&self) -> Vec<M> {
        decoded(&self.recorded().published)
    }

    pub fn published_local<M: Message>(&self) -> Vec<M> {
        decoded(&self.recorded().published_local)
    }

    pub fn sent<M: Message>(&self) -> Vec<M> {
        decoded(&self.recorded().sent)
    }

    /// # Panics
    ///
    /// Unless exactly `times` published `M`s satisfy `predicate`.
    pub fn verify_published<M: Message>(&self, predicate: impl Fn(&M) -> bool, times: usize) {
        let count = matching(&self.recorded().published, predicate);
        assert_eq!(
            count,
            times,
            "expected {times} matching `{}` published, found {count}",
            type_name_of::<M>()
        );
    }

    /// # Panics
    ///
    /// If any `M` was published.
    pub fn verify_not_published<M: Message>(&self) {
        self.verify_published::<M>(|_| true, 0);
    }

    /// # Panics
    ///
    /// Unless exactly `times` locally published `M`s satisfy `predicate`.
    pub fn verify_published_local<M: Message>(&self, predicate: impl Fn(&M) -> bool, times: usize) {
        let count = matching(&self.recorded().published_local, predicate);
        assert_eq!(
            count,
            times,
            "expected {times} matching `{}` published locally, found {count}",
            type_name_of::<M>()
        );
    }

    /// # Panics
    ///
    /// Unless exactly `times` sent `M`s satisfy `predicate`.
    pub fn verify_sent<M: Message>(&self, predicate: impl Fn(&M) -> bool, times: usize) {
        let count = matching(&self.recorded().sent, predicate);
        assert_eq!(
            count,
            times,
            "expected {times} matching `{}` sent, found {count}",
            type_name_of::<M>()
        );
    }

    pub fn reset(&self) {
        *self.recorded() = Recorded::default();
    }
}

impl Bus for TestBus {
    fn publish_message(&self, message: OutboundMessage) -> Result<(), SendError> {
        self.recorded().published.push(message);
        Ok(())
    }

    fn publish_local_message(&self, message: OutboundMessage) -> Result<(), SendError> {
        self.recorded().published_local.push(message);
        Ok(())
    }
}

impl Queue for TestBus {
    fn send_message(&self, message: OutboundMessage) -> Result<(), SendError> {
        self.recorded().sent.push(message);
        Ok(())
    }
}
