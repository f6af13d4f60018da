use std::sync::Arc;

use crate::support::{
    fast_queue, init_tracing, metadata, wait_until, Calls, OrderPlaced, OrderShipped, ShipOrder,
};
use transit_bus::testing::TestBus;
use transit_bus::transport::InMemoryTopics;
use transit_bus::{
    Bus, BusConfig, BusExt, ConfigError, FromScope, HandleMessage, HandlerExecution,
    HandlerRegistry, QueueExt, ReceiveConfig, Scope, ServiceBus,
};

fn registry() -> HandlerRegistry {
    HandlerRegistry::new()
        .handler::<OrderPlaced, ShipOrder>()
        .handler_fn::<OrderShipped, _>("record_shipment", |scope, shipped| {
            scope.require::<Calls>()?.push(format!("shipped:{}", shipped.order_id));
            Ok(())
        })
}

// ============================================================================
// Test 1: Publish, fan out, handle, publish again
// ============================================================================

#[test]
fn published_messages_flow_through_subscribed_queue() {
    init_tracing();
    let topics = InMemoryTopics::new();
    let queue = fast_queue("shop_orders").with_topics(topics.clone());
    let calls = Arc::new(Calls::default());
    let scope = Scope::new();
    scope.register(calls.clone());

    let config = BusConfig::new().with_bus_name("shop").with_receive(
        ReceiveConfig::new("orders")
            .with_polling_instances(2)
            .with_handler_execution(HandlerExecution::Parallel),
    );
    let bus = ServiceBus::builder(config)
        .with_registry(registry())
        .with_scope(scope)
        .with_publisher(Arc::new(topics.clone()))
        .with_queue(Arc::new(queue.clone()))
        .with_metadata(metadata())
        .build()
        .unwrap();

    let subscribed = bus.subscribe_to_handled_types().unwrap();
    assert_eq!(subscribed.len(), 2);
    for topic in &subscribed {
        assert_eq!(topics.subscriber_count(topic), 1);
    }

    bus.create_send_bus()
        .publish(&OrderPlaced {
            order_id: "A-1".into(),
            reject: false,
        })
        .unwrap();
    bus.start_receiving().unwrap();

    assert!(wait_until(|| calls.count("shipped:A-1") == 1));
    assert!(wait_until(|| queue.removed().len() == 2));
    let stats = bus.stop_receiving();

    assert_eq!(stats.handled, 2);
    assert_eq!(stats.failed, 0);
    assert_eq!(calls.count("ship"), 1);
    assert_eq!(topics.published().len(), 2);
    assert!(queue.is_empty());
}

// ============================================================================
// Test 2: Local sends loop back to the input queue
// ============================================================================

#[test]
fn create_queue_sends_to_own_input() {
    let queue = fast_queue("shop_orders");
    let calls = Arc::new(Calls::default());
    let scope = Scope::new();
    scope.register(calls.clone());

    let bus = ServiceBus::builder(
        BusConfig::new()
            .with_bus_name("shop")
            .with_receive(ReceiveConfig::new("orders")),
    )
    .with_registry(registry())
    .with_scope(scope)
    .with_queue(Arc::new(queue.clone()))
    .with_metadata(metadata())
    .build()
    .unwrap();

    bus.create_queue()
        .unwrap()
        .send(&OrderShipped {
            order_id: "L-1".into(),
        })
        .unwrap();
    bus.start_receiving().unwrap();
    assert!(wait_until(|| calls.count("shipped:L-1") == 1));
    let stats = bus.stop_receiving();

    assert_eq!(stats.handled, 1);
    assert!(!bus.receive_queue().unwrap().is_receiving());
}

// ============================================================================
// Test 3: Configuration from JSON
// ============================================================================

#[test]
fn config_loads_from_json() {
    let config = BusConfig::from_json(
        r#"{
            "bus_name": "shop",
            "application_version": "2.4.1",
            "receive": {
                "queue_name": "orders",
                "retry_count": 3,
                "polling_instances": 4,
                "fault_trigger": "at_or_above_limit"
            }
        }"#,
    )
    .unwrap();

    assert_eq!(config.queue_name().as_deref(), Some("shop_orders"));
    let receive = config.receive.unwrap();
    assert_eq!(receive.retry_count, 3);
    assert_eq!(receive.polling_instances, 4);
    assert_eq!(receive.max_messages, 10);
}

#[test]
fn config_rejects_out_of_range_values() {
    let result = BusConfig::from_json(r#"{ "receive": { "queue_name": "q", "poll_wait_seconds": 30 } }"#);
    assert!(matches!(result, Err(ConfigError::Invalid { field: "poll_wait_seconds", .. })));
}

// ============================================================================
// Test 4: Handlers can be tested against a recording bus
// ============================================================================

#[test]
fn handler_under_test_bus() {
    let test_bus = TestBus::new();
    let scope = Scope::new();
    scope.register::<dyn Bus>(Arc::new(test_bus.clone()));
    scope.register(Arc::new(Calls::default()));

    let handler = ShipOrder::from_scope(&scope).unwrap();
    handler
        .handle(&OrderPlaced {
            order_id: "T-9".into(),
            reject: false,
        })
        .unwrap();

    test_bus.verify_published::<OrderShipped>(|s| s.order_id == "T-9", 1);
    test_bus.verify_not_published::<OrderPlaced>();
}
