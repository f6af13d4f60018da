//! Transport - the durable queue and topic the bus runs on.
//!
//! The pipeline only talks to transports through two traits:
//!
//! ```text
//! ┌────────────────────────────┐      ┌────────────────────────────┐
//! │ MessageQueue               │      │ TopicPublisher             │
//! │  get_messages(cancel)      │      │  publish(topic, body, ..)  │
//! │  remove_message(receipt)   │      └────────────────────────────┘
//! │  add_message(body, meta)   │                   │ fan-out
//! │  subscribe(topics)         │ ◄─────────────────┘ (topic envelope)
//! └────────────────────────────┘
//! ```
//!
//! Redrive / dead-letter policy belongs to the transport. The in-memory
//! implementations here model it (receive counts, visibility timeout,
//! max receive count) so the pump can be exercised end to end without a
//! cloud queue.

mod in_memory_queue;
mod in_memory_topics;
mod publisher;
mod queue;

pub use in_memory_queue::{InMemoryQueue, QueueSettings};
pub use in_memory_topics::InMemoryTopics;
pub use publisher::TopicPublisher;
pub use queue::{MessageQueue, RawMessage, RECEIVE_COUNT_ATTRIBUTE};
