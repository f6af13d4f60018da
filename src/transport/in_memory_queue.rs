//! In-memory queue for testing and single-process scenarios.
//!
//! Models the parts of a cloud queue the pipeline relies on:
//! - receive counts reported as `ApproximateReceiveCount`
//! - a visibility timeout after which an unacknowledged delivery reappears
//! - redrive to a dead-letter list once `max_receive_count` is exhausted
//! - long-polling that gives up as soon as the cancellation token fires

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use uuid::Uuid;

use super::in_memory_topics::InMemoryTopics;
use super::queue::{MessageQueue, RawMessage, RECEIVE_COUNT_ATTRIBUTE};
use crate::cancellation::CancellationToken;
use crate::config::ReceiveConfig;
use crate::error::TransportError;

const POLL_STEP: Duration = Duration::from_millis(2);
const MIN_WAIT: Duration = Duration::from_millis(20);
/// Removed ids retained for `removed()`; older ids are forgotten.
const REMOVED_HISTORY: usize = 1024;

/// Tunables for an `InMemoryQueue`.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Longest time `get_messages` waits for a message to arrive.
    pub wait_time: Duration,
    /// Largest batch returned by one `get_messages` call.
    pub max_messages: usize,
    /// How long a received message stays hidden before redelivery.
    pub visibility_timeout: Duration,
    /// Receives allowed before redrive to the dead-letter list.
    pub max_receive_count: Option<u32>,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            wait_time: Duration::from_millis(20),
            max_messages: 10,
            visibility_timeout: Duration::from_secs(30),
            max_receive_count: None,
        }
    }
}

impl From<&ReceiveConfig> for QueueSettings {
    /// Mirror the receive settings; the redrive limit follows the retry
    /// count. A zero poll wait still waits briefly so idle pumps do not spin.
    fn from(config: &ReceiveConfig) -> Self {
        Self {
            wait_time: config.poll_wait().max(MIN_WAIT),
            max_messages: config.max_messages,
            visibility_timeout: Duration::from_secs(30),
            max_receive_count: Some(config.retry_count),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredMessage {
    id: String,
    body: String,
    attributes: HashMap<String, String>,
    receive_count: u32,
    receipt_handle: Option<String>,
    invisible_until: Option<Instant>,
}

#[derive(Default)]
struct QueueState {
    messages: Vec<StoredMessage>,
    dead_letters: Vec<StoredMessage>,
    removed: VecDeque<String>,
    subscriptions: Vec<String>,
}

/// In-memory queue. Cloning shares the same underlying queue.
///
/// ## Example
///
/// ```
/// use transit_bus::transport::{InMemoryQueue, MessageQueue};
/// use transit_bus::CancellationToken;
///
/// let queue = InMemoryQueue::new();
/// queue.add_message(r#"{"id":1}"#, &[("messageType".into(), "demo::Ping".into())]).unwrap();
///
/// let batch = queue.get_messages(&CancellationToken::new()).unwrap();
/// assert_eq!(batch.len(), 1);
/// queue.remove_message(&batch[0].receipt_handle).unwrap();
/// assert!(queue.is_empty());
/// ```
#[derive(Clone)]
pub struct InMemoryQueue {
    name: Arc<str>,
    state: Arc<Mutex<QueueState>>,
    settings: Arc<QueueSettings>,
    topics: Option<InMemoryTopics>,
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::with_settings("in-memory", QueueSettings::default())
    }

    pub fn with_settings(name: &str, settings: QueueSettings) -> Self {
        Self {
            name: Arc::from(name),
            state: Arc::new(Mutex::new(QueueState::default())),
            settings: Arc::new(settings),
            topics: None,
        }
    }

    /// Attach a topic broker so `subscribe` can bind this queue to topics.
    pub fn with_topics(mut self, topics: InMemoryTopics) -> Self {
        self.topics = Some(topics);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    /// True if both handles share the same underlying queue.
    pub fn same_queue(&self, other: &InMemoryQueue) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, QueueState>, TransportError> {
        self.state
            .lock()
            .map_err(|_| TransportError::LockPoisoned(operation))
    }

    fn snapshot<T>(&self, read: impl FnOnce(&QueueState) -> T) -> T {
        match self.state.lock() {
            Ok(state) => read(&state),
            Err(poisoned) => read(&poisoned.into_inner()),
        }
    }

    /// Messages still on the queue, visible or in flight.
    pub fn len(&self) -> usize {
        self.snapshot(|s| s.messages.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages received but neither removed nor visible again yet.
    pub fn in_flight(&self) -> usize {
        let now = Instant::now();
        self.snapshot(|s| {
            s.messages
                .iter()
                .filter(|m| m.invisible_until.is_some_and(|t| t > now))
                .count()
        })
    }

    /// Bodies of all messages still on the queue, oldest first.
    pub fn bodies(&self) -> Vec<String> {
        self.snapshot(|s| s.messages.iter().map(|m| m.body.clone()).collect())
    }

    /// Attributes of all messages still on the queue, oldest first.
    pub fn attributes(&self) -> Vec<HashMap<String, String>> {
        self.snapshot(|s| s.messages.iter().map(|m| m.attributes.clone()).collect())
    }

    /// Bodies of messages redriven after exceeding `max_receive_count`.
    pub fn dead_letters(&self) -> Vec<String> {
        self.snapshot(|s| s.dead_letters.iter().map(|m| m.body.clone()).collect())
    }

    /// Ids of the most recent messages removed via `remove_message`,
    /// oldest first.
    pub fn removed(&self) -> Vec<String> {
        self.snapshot(|s| s.removed.iter().cloned().collect())
    }

    /// Topics this queue subscribed to.
    pub fn subscriptions(&self) -> Vec<String> {
        self.snapshot(|s| s.subscriptions.clone())
    }

    /// Make every in-flight message visible again, as if its visibility
    /// timeout had elapsed.
    pub fn expire_visibility(&self) {
        if let Ok(mut state) = self.state.lock() {
            for message in state.messages.iter_mut() {
                message.invisible_until = None;
            }
        }
    }

    /// Drop all messages, dead letters and removal records.
    pub fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.messages.clear();
            state.dead_letters.clear();
            state.removed.clear();
        }
    }

    fn receive_batch(&self) -> Result<Vec<RawMessage>, TransportError> {
        let mut state = self.lock("receive")?;
        let now = Instant::now();
        let settings = &self.settings;

        let mut batch = Vec::new();
        let mut index = 0;
        while index < state.messages.len() && batch.len() < settings.max_messages {
            let visible = state.messages[index]
                .invisible_until
                .map_or(true, |t| t <= now);
            if !visible {
                index += 1;
                continue;
            }

            let exhausted = settings
                .max_receive_count
                .is_some_and(|max| state.messages[index].receive_count >= max);
            if exhausted {
                let mut dead = state.messages.remove(index);
                dead.receipt_handle = None;
                dead.invisible_until = None;
                state.dead_letters.push(dead);
                continue;
            }

            let message = &mut state.messages[index];
            message.receive_count += 1;
            let receipt_handle = Uuid::new_v4().to_string();
            message.receipt_handle = Some(receipt_handle.clone());
            message.invisible_until = Some(now + settings.visibility_timeout);

            batch.push(RawMessage {
                message_id: message.id.clone(),
                receipt_handle,
                body: message.body.clone(),
                attributes: HashMap::from([(
                    RECEIVE_COUNT_ATTRIBUTE.to_string(),
                    message.receive_count.to_string(),
                )]),
                message_attributes: message.attributes.clone(),
            });
            index += 1;
        }
        Ok(batch)
    }
}

impl MessageQueue for InMemoryQueue {
    fn get_messages(&self, cancel: &CancellationToken) -> Result<Vec<RawMessage>, TransportError> {
        let deadline = Instant::now() + self.settings.wait_time;

        loop {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }

            let batch = self.receive_batch()?;
            if !batch.is_empty() {
                return Ok(batch);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(batch);
            }
            if cancel.wait_timeout(POLL_STEP.min(deadline - now)) {
                return Err(TransportError::Cancelled);
            }
        }
    }

    fn remove_message(&self, receipt_handle: &str) -> Result<(), TransportError> {
        if receipt_handle.trim().is_empty() {
            return Err(TransportError::InvalidReceiptHandle);
        }
        let mut state = self.lock("remove")?;
        let position = state
            .messages
            .iter()
            .position(|m| m.receipt_handle.as_deref() == Some(receipt_handle))
            .ok_or(TransportError::InvalidReceiptHandle)?;
        let removed = state.messages.remove(position);
        if state.removed.len() == REMOVED_HISTORY {
            state.removed.pop_front();
        }
        state.removed.push_back(removed.id);
        Ok(())
    }

    fn add_message(&self, body: &str, metadata: &[(String, String)]) -> Result<(), TransportError> {
        let mut state = self.lock("add")?;
        state.messages.push(StoredMessage {
            id: Uuid::new_v4().to_string(),
            body: body.to_string(),
            attributes: metadata.iter().cloned().collect(),
            receive_count: 0,
            receipt_handle: None,
            invisible_until: None,
        });
        Ok(())
    }

    fn subscribe(&self, topics: &[String]) -> Result<(), TransportError> {
        let broker = self.topics.as_ref().ok_or_else(|| {
            TransportError::Rejected(format!("queue `{}` has no topic broker", self.name))
        })?;
        for topic in topics {
            broker.bind(topic, self.clone())?;
        }
        self.lock("subscribe")?.subscriptions.extend(topics.iter().cloned());
        Ok(())
    }
}
