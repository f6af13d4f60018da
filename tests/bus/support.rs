//! Shared messages, handlers and fixtures for the bus integration tests.

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use transit_bus::message::CommonMetadata;
use transit_bus::transport::{InMemoryQueue, QueueSettings};
use transit_bus::{
    Bus, BusExt, FromScope, HandleMessage, HandleMessageFault, HandlerError, ProcessingError,
    ResolveError, Scope, TransportMessage,
};

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PriceChanged {
    pub id: u64,
    pub price: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: String,
    pub reject: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderShipped {
    pub order_id: String,
}

// ============================================================================
// Recording collaborators
// ============================================================================

/// Calls made by handlers, registered in the root scope.
#[derive(Default)]
pub struct Calls(Mutex<Vec<String>>);

impl Calls {
    pub fn push(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|c| *c == call).count()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Publishes `OrderShipped` for every order it sees.
pub struct ShipOrder {
    bus: Arc<dyn Bus>,
    calls: Arc<Calls>,
}

impl FromScope for ShipOrder {
    fn from_scope(scope: &Scope) -> Result<Self, ResolveError> {
        Ok(Self {
            bus: scope.require()?,
            calls: scope.require()?,
        })
    }
}

impl HandleMessage<OrderPlaced> for ShipOrder {
    fn handle(&self, message: &OrderPlaced) -> Result<(), HandlerError> {
        self.calls.push("ship");
        self.bus.publish(&OrderShipped {
            order_id: message.order_id.clone(),
        })?;
        Ok(())
    }
}

/// Publishes first, then rejects orders flagged `reject`.
pub struct AuditOrder {
    bus: Arc<dyn Bus>,
    calls: Arc<Calls>,
}

impl FromScope for AuditOrder {
    fn from_scope(scope: &Scope) -> Result<Self, ResolveError> {
        Ok(Self {
            bus: scope.require()?,
            calls: scope.require()?,
        })
    }
}

impl HandleMessage<OrderPlaced> for AuditOrder {
    fn handle(&self, message: &OrderPlaced) -> Result<(), HandlerError> {
        self.calls.push("audit");
        self.bus.publish_local(&OrderShipped {
            order_id: format!("audit-{}", message.order_id),
        })?;
        if message.reject {
            return Err(HandlerError::Rejected(format!("order {} rejected", message.order_id)));
        }
        Ok(())
    }
}

/// Fault handler for orders that exhausted their retries.
pub struct OrderFault {
    calls: Arc<Calls>,
}

impl FromScope for OrderFault {
    fn from_scope(scope: &Scope) -> Result<Self, ResolveError> {
        Ok(Self {
            calls: scope.require()?,
        })
    }
}

impl HandleMessageFault<OrderPlaced> for OrderFault {
    fn handle_fault(&self, message: &OrderPlaced, _error: &ProcessingError) -> Result<(), HandlerError> {
        self.calls.push(format!("fault:{}", message.order_id));
        Ok(())
    }
}

/// Catch-all fault handler.
pub struct Alert {
    calls: Arc<Calls>,
}

impl FromScope for Alert {
    fn from_scope(scope: &Scope) -> Result<Self, ResolveError> {
        Ok(Self {
            calls: scope.require()?,
        })
    }
}

impl HandleMessageFault<TransportMessage> for Alert {
    fn handle_fault(&self, message: &TransportMessage, _error: &ProcessingError) -> Result<(), HandlerError> {
        self.calls.push(format!("alert:{}", message.message_type_name));
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn metadata() -> CommonMetadata {
    CommonMetadata::with_address(IpAddr::V4(Ipv4Addr::LOCALHOST), Some("1.0.0"))
}

pub fn fast_queue(name: &str) -> InMemoryQueue {
    InMemoryQueue::with_settings(
        name,
        QueueSettings {
            wait_time: Duration::from_millis(5),
            ..Default::default()
        },
    )
}

/// Poll `condition` for up to five seconds.
pub fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
