//! Transactional outbox - outbound sends deferred to unit-of-work commit.
//!
//! ```text
//! handler ── bus.publish(&msg) ──► Outbox::submit
//!                                    │ no ambient transaction → forward now
//!                                    │ ambient transaction    → enlist once, buffer
//!                                    ▼
//!                         commit   → forward buffered, in order, then clear
//!                         rollback → clear
//!                         in doubt → clear (warn)
//! ```
//!
//! A handler's own side effects are not undone on rollback; only what it
//! sent through an outbox is discarded.
//!
//! Two surfaces share the buffer:
//! - [`TransactionalQueue`] sends to the bus's own input queue with a
//!   `messageType` attribute.
//! - [`TransactionalBus`] publishes to a per-type topic, or locally to the
//!   input queue wrapped in a topic envelope.

mod buffer;
mod bus;
mod queue;
mod traits;

pub use bus::{TransactionalBus, TransactionalBusBuilder};
pub use queue::TransactionalQueue;
pub use traits::{Bus, BusExt, Queue, QueueExt};
