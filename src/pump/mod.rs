//! Message pump - the polling loop and its worker thread.
//!
//! ```text
//!        ┌──────────────────────── stop() / cancel ──────────────┐
//!        ▼                                                        │
//! Idle → Polling ─ get_messages(cancel) ─► Dispatching ─┬─ Ok  → Acknowledging (remove_message)
//!          ▲                                            └─ Err → final attempt? → Escalating
//!          └──────────── statistics emitted per message ────────────────┘
//! ```
//!
//! Several pumps may share one queue and one processor; they share no other
//! state. `PumpThread` runs a pump in the background and returns its
//! `PumpStats` when stopped.

#[allow(clippy::module_inception)]
mod pump;
mod thread;

pub use crate::cancellation::CancellationToken;
pub use pump::{MessagePump, PumpStats};
pub use thread::PumpThread;
