//! In-memory walkthrough: an order is published, handled, and its follow-up
//! event is published from inside the handler's unit of work.
//!
//! Run with `RUST_LOG=transit_bus=debug` to see inbound and outbound logging.

use std::error::Error;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use transit_bus::transport::{InMemoryQueue, InMemoryTopics, QueueSettings};
use transit_bus::{
    Bus, BusConfig, BusExt, FromScope, HandleMessage, HandleMessageFault, HandlerError,
    HandlerRegistry, MessageStatistics, ProcessingError, ReceiveConfig, ResolveError, Scope,
    ServiceBus, StatisticsListener,
};

#[derive(Debug, Serialize, Deserialize)]
struct OrderPlaced {
    order_id: u32,
    total_cents: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct OrderConfirmed {
    order_id: u32,
}

struct ConfirmOrder {
    bus: Arc<dyn Bus>,
}

impl FromScope for ConfirmOrder {
    fn from_scope(scope: &Scope) -> Result<Self, ResolveError> {
        Ok(Self {
            bus: scope.require()?,
        })
    }
}

impl HandleMessage<OrderPlaced> for ConfirmOrder {
    fn handle(&self, order: &OrderPlaced) -> Result<(), HandlerError> {
        if order.total_cents == 0 {
            return Err(HandlerError::Rejected(format!("order {} is empty", order.order_id)));
        }
        println!("confirming order {} ({} cents)", order.order_id, order.total_cents);
        self.bus.publish(&OrderConfirmed {
            order_id: order.order_id,
        })?;
        Ok(())
    }
}

#[derive(Default)]
struct ReportFault;

impl HandleMessageFault<OrderPlaced> for ReportFault {
    fn handle_fault(&self, order: &OrderPlaced, error: &ProcessingError) -> Result<(), HandlerError> {
        println!("giving up on order {}: {error}", order.order_id);
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let topics = InMemoryTopics::new();
    let queue = InMemoryQueue::with_settings(
        "console_orders",
        QueueSettings {
            wait_time: Duration::from_millis(20),
            max_receive_count: Some(3),
            visibility_timeout: Duration::from_millis(50),
            ..Default::default()
        },
    )
    .with_topics(topics.clone());

    let confirmed = Arc::new(Mutex::new(Vec::new()));
    let scope = Scope::new();
    {
        let confirmed = confirmed.clone();
        scope.register::<dyn StatisticsListener>(Arc::new(move |stats: &MessageStatistics| {
            if stats.success {
                if let Ok(mut seen) = confirmed.lock() {
                    seen.push(stats.message_type.clone());
                }
            }
        }));
    }

    let registry = HandlerRegistry::new()
        .handler::<OrderPlaced, ConfirmOrder>()
        .fault_handler::<OrderPlaced, ReportFault>()
        .handler_fn::<OrderConfirmed, _>("print_confirmation", |_, confirmed| {
            println!("order {} confirmed", confirmed.order_id);
            Ok(())
        });

    let config = BusConfig::new()
        .with_bus_name("console")
        .with_application_version("0.1.0")
        .with_receive(ReceiveConfig::new("orders").with_retry_count(3).with_polling_instances(2));

    let bus = ServiceBus::builder(config)
        .with_registry(registry)
        .with_scope(scope)
        .with_publisher(Arc::new(topics.clone()))
        .with_queue(Arc::new(queue.clone()))
        .build()?;

    for topic in bus.subscribe_to_handled_types()? {
        println!("subscribed to {topic}");
    }

    let sender = bus.create_send_bus();
    sender.publish(&OrderPlaced {
        order_id: 1,
        total_cents: 4_250,
    })?;
    sender.publish(&OrderPlaced {
        order_id: 2,
        total_cents: 0,
    })?;

    bus.start_receiving()?;
    // Order 2 fails every attempt and ends up dead-lettered.
    let settled = || queue.is_empty() && !queue.dead_letters().is_empty();
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline && !settled() {
        thread::sleep(Duration::from_millis(25));
    }
    let stats = bus.stop_receiving();

    println!(
        "handled {}, failed {}, faulted {}, dead-lettered {}",
        stats.handled,
        stats.failed,
        stats.faulted,
        queue.dead_letters().len()
    );
    if let Ok(seen) = confirmed.lock() {
        println!("successful attempts: {seen:?}");
    }
    Ok(())
}
