//! Explicit two-phase unit of work.
//!
//! ```text
//! TransactionScope::new()          ── opens or joins the ambient Transaction
//!   outbox.send(..)                ── Transaction::current()?.enlist(outbox)
//! scope.complete(); scope.finish() ── owner: prepare all → commit all
//!                                     otherwise: rollback all
//! ```
//!
//! The ambient transaction is thread-local. Work fanned out to other threads
//! carries it explicitly with `Transaction::enter`.

mod scope;
#[allow(clippy::module_inception)]
mod transaction;

pub use scope::{with_unit_of_work, TransactionScope};
pub use transaction::{AmbientGuard, Enlistment, Transaction, TransactionStatus};
