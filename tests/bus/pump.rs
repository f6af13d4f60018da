use std::sync::{Arc, Mutex};

use crate::support::{fast_queue, init_tracing, metadata, wait_until, Alert, Calls, OrderFault, OrderPlaced};
use transit_bus::transport::{InMemoryQueue, MessageQueue};
use transit_bus::{
    CancellationToken, FaultTrigger, HandlerError, HandlerRegistry, MessageParser,
    MessageProcessor, MessagePump, MessageStatistics, NoOpMessageLogger, PumpStats, PumpThread,
    QueueExt, Scope, StatisticsListener, TransactionalQueue,
};

struct Rig {
    queue: InMemoryQueue,
    calls: Arc<Calls>,
    statistics: Arc<Mutex<Vec<MessageStatistics>>>,
    pump: MessagePump,
}

fn rig(queue: InMemoryQueue, retry_limit: u32, trigger: FaultTrigger) -> Rig {
    init_tracing();
    let calls = Arc::new(Calls::default());
    let statistics = Arc::new(Mutex::new(Vec::new()));

    let scope = Scope::new();
    scope.register(calls.clone());
    let sink = statistics.clone();
    scope.register::<dyn StatisticsListener>(Arc::new(move |s: &MessageStatistics| {
        sink.lock().unwrap().push(s.clone());
    }));

    let registry = HandlerRegistry::new()
        .handler_fn::<OrderPlaced, _>("place_order", |scope, order| {
            scope.require::<Calls>()?.push(format!("handle:{}", order.order_id));
            if order.reject {
                return Err(HandlerError::Rejected(order.order_id.clone()));
            }
            Ok(())
        })
        .fault_handler::<OrderPlaced, OrderFault>()
        .catch_all_fault_handler::<Alert>();
    let registry = Arc::new(registry);

    let processor = Arc::new(MessageProcessor::new(registry.clone(), scope));
    let pump = MessagePump::new(
        Arc::new(queue.clone()),
        MessageParser::new(registry.message_types()),
        processor,
    )
    .with_id("orders-pump-0")
    .with_retry_limit(retry_limit)
    .with_fault_trigger(trigger)
    .with_logger(Arc::new(NoOpMessageLogger));

    Rig {
        queue,
        calls,
        statistics,
        pump,
    }
}

fn sender(queue: &InMemoryQueue) -> TransactionalQueue {
    TransactionalQueue::with_metadata(Arc::new(queue.clone()), Arc::new(NoOpMessageLogger), metadata())
}

fn place(queue: &InMemoryQueue, id: &str, reject: bool) {
    sender(queue)
        .send(&OrderPlaced {
            order_id: id.to_string(),
            reject,
        })
        .unwrap();
}

// ============================================================================
// Test 1: Successful messages are removed exactly once
// ============================================================================

#[test]
fn success_removes_message() {
    let rig = rig(fast_queue("orders"), 3, FaultTrigger::OnExactAttempt);
    place(&rig.queue, "A-1", false);

    let mut stats = PumpStats::default();
    assert_eq!(rig.pump.run_once(&mut stats).unwrap(), 1);

    assert_eq!(stats.handled, 1);
    assert_eq!(rig.queue.removed().len(), 1);
    assert!(rig.queue.is_empty());

    let statistics = rig.statistics.lock().unwrap();
    assert_eq!(statistics.len(), 1);
    assert!(statistics[0].success);
    assert_eq!(statistics[0].previous_retry_count, 1);
    assert!(!statistics[0].final_attempt);
}

// ============================================================================
// Test 2: Failures stay on the queue until the retry limit
// ============================================================================

#[test]
fn failure_is_retried_then_faulted_on_the_limit() {
    let rig = rig(fast_queue("orders"), 3, FaultTrigger::OnExactAttempt);
    place(&rig.queue, "A-2", true);

    let mut stats = PumpStats::default();
    for _ in 0..3 {
        assert_eq!(rig.pump.run_once(&mut stats).unwrap(), 1);
        assert!(rig.queue.removed().is_empty());
        rig.queue.expire_visibility();
    }

    assert_eq!(stats.failed, 3);
    assert_eq!(stats.faulted, 1);
    assert_eq!(rig.calls.count("handle:A-2"), 3);
    assert_eq!(rig.calls.count("fault:A-2"), 1);
    assert_eq!(rig.queue.len(), 1);

    let retries: Vec<(u32, bool)> = rig
        .statistics
        .lock()
        .unwrap()
        .iter()
        .map(|s| (s.previous_retry_count, s.final_attempt))
        .collect();
    assert_eq!(retries, vec![(1, false), (2, false), (3, true)]);
}

// ============================================================================
// Test 3: Skipped attempt numbers and the fault trigger
// ============================================================================

/// Attempt 2 is the first the pump sees; the limit is 1.
fn run_past_limit(trigger: FaultTrigger) -> Rig {
    let rig = rig(fast_queue("orders"), 1, trigger);
    place(&rig.queue, "A-3", true);

    let lost = rig.queue.get_messages(&CancellationToken::new()).unwrap();
    assert_eq!(lost.len(), 1);
    rig.queue.expire_visibility();

    let mut stats = PumpStats::default();
    rig.pump.run_once(&mut stats).unwrap();
    assert_eq!(stats.failed, 1);
    rig
}

#[test]
fn exact_trigger_misses_a_skipped_limit() {
    let rig = run_past_limit(FaultTrigger::OnExactAttempt);
    assert_eq!(rig.calls.count("fault:A-3"), 0);

    let statistics = rig.statistics.lock().unwrap();
    assert_eq!(statistics[0].previous_retry_count, 2);
    assert!(!statistics[0].final_attempt);
}

#[test]
fn at_or_above_trigger_catches_a_skipped_limit() {
    let rig = run_past_limit(FaultTrigger::AtOrAboveLimit);
    assert_eq!(rig.calls.count("fault:A-3"), 1);
}

// ============================================================================
// Test 4: Unparseable records reach only catch-all fault handlers
// ============================================================================

#[test]
fn unparseable_record_goes_to_catch_all() {
    let rig = rig(fast_queue("orders"), 1, FaultTrigger::OnExactAttempt);
    rig.queue.add_message("not json", &[]).unwrap();

    let mut stats = PumpStats::default();
    rig.pump.run_once(&mut stats).unwrap();

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.faulted, 1);
    assert_eq!(rig.calls.all(), vec!["alert:"]);
    assert!(rig.queue.removed().is_empty());
    assert!(!rig.statistics.lock().unwrap()[0].success);
}

// ============================================================================
// Test 5: A pump thread drains the queue and stops on request
// ============================================================================

#[test]
fn pump_thread_drains_and_stops() {
    let rig = rig(fast_queue("orders"), 3, FaultTrigger::OnExactAttempt);
    for i in 0..5 {
        place(&rig.queue, &format!("T-{i}"), false);
    }
    let queue = rig.queue.clone();

    let worker = PumpThread::spawn(rig.pump);
    assert_eq!(worker.id(), "orders-pump-0");
    assert!(wait_until(|| queue.removed().len() == 5));
    let stats = worker.stop();

    assert_eq!(stats.handled, 5);
    assert_eq!(stats.failed, 0);
    assert!(queue.is_empty());
}
