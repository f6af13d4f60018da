//! Message processor - handler dispatch, fault escalation and statistics.
//!
//! ```text
//! process_message(msg)
//!   └─ TransactionScope ─┬─ child scope ─ pre-handler ─ H1.handle(&M)
//!                        ├─ child scope ─ pre-handler ─ H2.handle(&M)
//!                        └─ all Ok → commit, else rollback
//!
//! process_faulted_message(msg, err)
//!   ├─ fault handlers for M        (only if msg parsed)
//!   └─ catch-all fault handlers    (always)
//!
//! process_statistics(stats) → every dyn StatisticsListener in scope
//! ```
//!
//! Handlers for one message carry no ordering guarantee. They are iterated
//! in registration order sequentially, or fanned out to scoped threads with
//! `HandlerExecution::Parallel`.

#[allow(clippy::module_inception)]
mod processor;
mod result;
mod statistics;

pub use crate::config::HandlerExecution;
pub use processor::MessageProcessor;
pub use result::MessageProcessingResult;
pub use statistics::{MessageStatistics, StatisticsListener};
