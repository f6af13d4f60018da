//! Handlers and the registry that dispatches to them.
//!
//! ```text
//! HandlerRegistry
//!   handlers:       TypeId(M) → [HandlerEntry]        build H from scope, H.handle(&M)
//!   fault_handlers: TypeId(M) → [FaultHandlerEntry]   H.handle_fault(&M, err)
//!                   TypeId(TransportMessage) → [..]   catch-all, parse failures too
//! ```
//!
//! Entries are closures built once at registration time; dispatch is a map
//! lookup plus a downcast, with no reflection at message time.

mod registry;
mod traits;

pub use registry::{FaultHandlerEntry, HandlerEntry, HandlerRegistry};
pub use traits::{HandleMessage, HandleMessageFault};
