use std::sync::{Arc, Mutex};

use crate::support::{fast_queue, metadata, Alert, AuditOrder, Calls, OrderFault, OrderPlaced, ShipOrder};
use transit_bus::transport::{InMemoryQueue, InMemoryTopics};
use transit_bus::{
    Bus, HandlerExecution, HandlerRegistry, MessageProcessor, MessageStatistics, NoOpMessageLogger,
    ProcessingError, Scope, TransactionalBus, TransportMessage,
};

struct Harness {
    calls: Arc<Calls>,
    topics: InMemoryTopics,
    local: InMemoryQueue,
    processor: MessageProcessor,
}

fn harness(registry: HandlerRegistry) -> Harness {
    let calls = Arc::new(Calls::default());
    let topics = InMemoryTopics::new();
    let local = fast_queue("local");

    let scope = Scope::new();
    scope.register(calls.clone());

    let publisher = topics.clone();
    let local_queue = local.clone();
    let processor = MessageProcessor::new(Arc::new(registry), scope).with_pre_handler(move |scope| {
        let bus = TransactionalBus::builder(Arc::new(NoOpMessageLogger))
            .with_publisher(Arc::new(publisher.clone()))
            .with_local_queue(Arc::new(local_queue.clone()))
            .with_metadata(metadata())
            .build();
        scope.register::<dyn Bus>(Arc::new(bus));
    });

    Harness {
        calls,
        topics,
        local,
        processor,
    }
}

fn order(id: &str, reject: bool) -> TransportMessage {
    TransportMessage::for_message(
        "receipt",
        OrderPlaced {
            order_id: id.to_string(),
            reject,
        },
    )
    .unwrap()
}

fn sorted(mut calls: Vec<String>) -> Vec<String> {
    calls.sort();
    calls
}

fn order_handlers() -> HandlerRegistry {
    HandlerRegistry::new()
        .handler::<OrderPlaced, ShipOrder>()
        .handler::<OrderPlaced, AuditOrder>()
}

// ============================================================================
// Test 1: Successful dispatch forwards every buffered send
// ============================================================================

#[test]
fn success_commits_all_outboxes() {
    let h = harness(order_handlers());

    let result = h.processor.process_message(&order("A-1", false));

    assert!(result.was_successful(), "{:?}", result.error);
    assert_eq!(sorted(h.calls.all()), vec!["audit", "ship"]);
    assert_eq!(h.topics.published().len(), 1);
    assert_eq!(h.local.len(), 1);
}

// ============================================================================
// Test 2: One failing handler discards every handler's sends
// ============================================================================

#[test]
fn failure_discards_all_outboxes() {
    let h = harness(order_handlers());

    let result = h.processor.process_message(&order("A-2", true));

    assert!(!result.was_successful());
    let failing = ["AuditOrder"];
    assert!(matches!(
        result.error,
        Some(ProcessingError::Handler { handler, .. })
            if failing.iter().any(|name| handler.ends_with(name))
    ));
    assert_eq!(sorted(h.calls.all()), vec!["audit", "ship"]);
    assert!(h.topics.published().is_empty());
    assert!(h.local.is_empty());
}

#[test]
fn parallel_failure_discards_all_outboxes() {
    let h = harness(order_handlers());
    let processor = h.processor.with_execution(HandlerExecution::Parallel);

    let result = processor.process_message(&order("A-3", true));

    assert!(!result.was_successful());
    assert_eq!(h.calls.count("ship"), 1);
    assert_eq!(h.calls.count("audit"), 1);
    assert!(h.topics.published().is_empty());
    assert!(h.local.is_empty());

    let result = processor.process_message(&order("A-4", false));
    assert!(result.was_successful());
    assert_eq!(h.topics.published().len(), 1);
    assert_eq!(h.local.len(), 1);
}

// ============================================================================
// Test 3: Messages without handlers, and unresolved dependencies
// ============================================================================

#[test]
fn message_without_handler_fails() {
    let h = harness(HandlerRegistry::new().message_type::<OrderPlaced>());

    let result = h.processor.process_message(&order("A-5", false));

    assert!(matches!(result.error, Some(ProcessingError::NoHandler(ref name)) if name.ends_with("OrderPlaced")));
}

#[test]
fn missing_dependency_is_a_construction_failure() {
    let registry = order_handlers();
    let processor = MessageProcessor::new(Arc::new(registry), Scope::new());

    let result = processor.process_message(&order("A-6", false));

    assert!(matches!(result.error, Some(ProcessingError::Construction { .. })));
}

// ============================================================================
// Test 4: Fault handlers
// ============================================================================

#[test]
fn fault_handlers_run_typed_then_catch_all() {
    let h = harness(
        order_handlers()
            .fault_handler::<OrderPlaced, OrderFault>()
            .catch_all_fault_handler::<Alert>(),
    );
    let message = order("A-7", true);

    let invoked = h
        .processor
        .process_faulted_message(&message, &ProcessingError::ParseFailure);

    assert_eq!(invoked, 2);
    let calls = h.calls.all();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], "fault:A-7");
    assert!(calls[1].starts_with("alert:") && calls[1].ends_with("OrderPlaced"));
}

#[test]
fn unparsed_message_only_reaches_catch_all() {
    let h = harness(
        order_handlers()
            .fault_handler::<OrderPlaced, OrderFault>()
            .catch_all_fault_handler::<Alert>(),
    );
    let unparsed = TransportMessage::new("receipt", "???");

    let invoked = h
        .processor
        .process_faulted_message(&unparsed, &ProcessingError::ParseFailure);

    assert_eq!(invoked, 1);
    assert_eq!(h.calls.all(), vec!["alert:"]);
}

// ============================================================================
// Test 5: Statistics listeners registered in the root scope
// ============================================================================

#[test]
fn statistics_reach_every_listener() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let scope = Scope::new();
    for _ in 0..2 {
        let seen = seen.clone();
        scope.register::<dyn transit_bus::StatisticsListener>(Arc::new(move |s: &MessageStatistics| {
            seen.lock().unwrap().push(s.message_type.clone());
        }));
    }
    let processor = MessageProcessor::new(Arc::new(HandlerRegistry::new()), scope);

    processor.process_statistics(&MessageStatistics {
        message_type: "shop::OrderPlaced".into(),
        success: true,
        handler_run_time: std::time::Duration::from_millis(3),
        message_length: 42,
        previous_retry_count: 1,
        final_attempt: false,
    });

    assert_eq!(seen.lock().unwrap().len(), 2);
}
