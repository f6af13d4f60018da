//! Message bus integration tests.
//!
//! Exercises the delivery pipeline through the public API:
//! - Envelope parsing of direct and topic-delivered records
//! - All-or-nothing handler dispatch with transactional outboxes
//! - Pump acknowledgement, retries and fault handling
//! - A fully wired `ServiceBus` over the in-memory transports

mod support;
mod outbox;
mod parser;
mod processor;
mod pump;
mod service_bus;
