use std::sync::{Arc, Barrier};
use std::thread;

use crate::support::{metadata, OrderPlaced, OrderShipped};
use transit_bus::message::{type_name_of, MESSAGE_TYPE_ATTRIBUTE, SENDER_VERSION_ATTRIBUTE};
use transit_bus::transport::{InMemoryQueue, InMemoryTopics};
use transit_bus::{
    with_unit_of_work, BusExt, HandlerError, NoOpMessageLogger, QueueExt, SendError,
    TopicNamer, TransactionScope, TransactionalBus, TransactionalQueue, TransportError,
};

fn queue_outbox(queue: &InMemoryQueue) -> TransactionalQueue {
    TransactionalQueue::with_metadata(Arc::new(queue.clone()), Arc::new(NoOpMessageLogger), metadata())
}

// ============================================================================
// Test 1: Without a transaction, sends go straight out
// ============================================================================

#[test]
fn send_outside_transaction_is_immediate() {
    let queue = InMemoryQueue::new();
    let outbox = queue_outbox(&queue);

    outbox.send(&OrderPlaced::default()).unwrap();

    assert_eq!(queue.len(), 1);
    assert_eq!(outbox.pending(), 0);
    let attributes = &queue.attributes()[0];
    assert_eq!(attributes[MESSAGE_TYPE_ATTRIBUTE], type_name_of::<OrderPlaced>());
    assert_eq!(attributes[SENDER_VERSION_ATTRIBUTE], "1.0.0");
}

// ============================================================================
// Test 2: Commit forwards exactly once, in order
// ============================================================================

#[test]
fn commit_forwards_buffered_sends_in_order() {
    let queue = InMemoryQueue::new();
    let outbox = queue_outbox(&queue);

    let result: Result<(), HandlerError> = with_unit_of_work(|_| {
        outbox.send_with::<OrderPlaced>(|o| o.order_id = "first".into())?;
        outbox.send_with::<OrderPlaced>(|o| o.order_id = "second".into())?;
        assert_eq!(outbox.pending(), 2);
        assert!(queue.is_empty());
        Ok(())
    });

    result.unwrap();
    assert_eq!(outbox.pending(), 0);
    let ids: Vec<String> = queue
        .bodies()
        .iter()
        .map(|b| serde_json::from_str::<OrderPlaced>(b).unwrap().order_id)
        .collect();
    assert_eq!(ids, vec!["first", "second"]);
}

// ============================================================================
// Test 3: Failed or abandoned units of work forward nothing
// ============================================================================

#[test]
fn failed_unit_of_work_discards_sends() {
    let queue = InMemoryQueue::new();
    let outbox = queue_outbox(&queue);

    let result: Result<(), HandlerError> = with_unit_of_work(|_| {
        outbox.send(&OrderPlaced::default())?;
        Err(HandlerError::Rejected("no stock".into()))
    });

    assert!(result.is_err());
    assert!(queue.is_empty());
    assert_eq!(outbox.pending(), 0);
}

#[test]
fn nested_scope_without_complete_dooms_the_outer() {
    let queue = InMemoryQueue::new();
    let outbox = queue_outbox(&queue);

    let mut outer = TransactionScope::new();
    outbox.send(&OrderPlaced::default()).unwrap();
    {
        let inner = TransactionScope::new();
        assert!(!inner.is_owner());
        outbox.send(&OrderShipped::default()).unwrap();
    }
    outer.complete();

    assert!(outer.finish().is_err());
    assert!(queue.is_empty());
}

// ============================================================================
// Test 4: Bus routes topics and local sends
// ============================================================================

#[test]
fn bus_publishes_to_named_topic_and_local_queue() {
    let topics = InMemoryTopics::new();
    let subscriber = InMemoryQueue::new().with_topics(topics.clone());
    let local = InMemoryQueue::new();
    let namer = TopicNamer::new(Some("shop"));
    topics
        .bind(&namer.topic_for(type_name_of::<OrderShipped>()), subscriber.clone())
        .unwrap();

    let bus = TransactionalBus::builder(Arc::new(NoOpMessageLogger))
        .with_publisher(Arc::new(topics.clone()))
        .with_local_queue(Arc::new(local.clone()))
        .with_topic_namer(namer.clone())
        .with_metadata(metadata())
        .build();

    let mut scope = TransactionScope::new();
    bus.publish(&OrderShipped { order_id: "S-1".into() }).unwrap();
    bus.publish_local(&OrderShipped { order_id: "S-2".into() }).unwrap();
    assert_eq!(bus.pending(), 2);
    scope.complete();
    scope.finish().unwrap();

    let published = topics.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, namer.topic_for(type_name_of::<OrderShipped>()));
    assert_eq!(subscriber.len(), 1);
    assert_eq!(local.len(), 1);
}

#[test]
fn bus_without_publisher_refuses_to_publish() {
    let bus = TransactionalBus::builder(Arc::new(NoOpMessageLogger))
        .with_metadata(metadata())
        .build();

    assert!(!bus.can_publish());
    assert!(matches!(
        bus.publish(&OrderShipped::default()),
        Err(SendError::Transport(TransportError::Disabled))
    ));
}

// ============================================================================
// Test 5: A bus shared between threads keeps units of work apart
// ============================================================================

#[test]
fn shared_bus_commits_only_its_own_unit_of_work() {
    let topics = InMemoryTopics::new();
    let bus = TransactionalBus::builder(Arc::new(NoOpMessageLogger))
        .with_publisher(Arc::new(topics.clone()))
        .with_metadata(metadata())
        .build();
    let both_buffered = Barrier::new(2);

    thread::scope(|s| {
        s.spawn(|| {
            let mut scope = TransactionScope::new();
            bus.publish(&OrderShipped { order_id: "kept".into() }).unwrap();
            both_buffered.wait();
            scope.complete();
            scope.finish().unwrap();
        });
        s.spawn(|| {
            let scope = TransactionScope::new();
            bus.publish(&OrderShipped { order_id: "rolled-back".into() }).unwrap();
            both_buffered.wait();
            drop(scope);
        });
    });

    let shipped: Vec<String> = topics
        .published()
        .iter()
        .map(|(_, body)| serde_json::from_str::<OrderShipped>(body).unwrap().order_id)
        .collect();
    assert_eq!(shipped, vec!["kept"]);
    assert_eq!(bus.pending(), 0);
}
