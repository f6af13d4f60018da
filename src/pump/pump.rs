//! The polling loop.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, info_span, warn};

use crate::cancellation::CancellationToken;
use crate::config::FaultTrigger;
use crate::error::{panic_message, ProcessingError, TransportError};
use crate::logging::{MessageLogger, TracingMessageLogger};
use crate::message::MessageParser;
use crate::processor::{MessageProcessingResult, MessageProcessor, MessageStatistics};
use crate::transport::{MessageQueue, RawMessage};

const POLL_ERROR_BACKOFF: Duration = Duration::from_millis(250);

/// Counters collected by one pump over its lifetime.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PumpStats {
    pub polls: usize,
    pub received: usize,
    /// Processed successfully and acknowledged.
    pub handled: usize,
    /// Left on the queue for redelivery.
    pub failed: usize,
    /// Handed to fault handlers.
    pub faulted: usize,
    pub poll_errors: usize,
}

impl PumpStats {
    pub fn merge(&mut self, other: &PumpStats) {
        self.polls += other.polls;
        self.received += other.received;
        self.handled += other.handled;
        self.failed += other.failed;
        self.faulted += other.faulted;
        self.poll_errors += other.poll_errors;
    }
}

/// Pulls batches from a queue and drives each message through the processor.
///
/// A successfully processed message is removed from the queue. A failed one
/// is left for the transport to redeliver; on the attempt the fault trigger
/// selects it is also handed to fault handlers, but still not removed.
/// Dead-lettering is the transport's job.
pub struct MessagePump {
    id: String,
    queue: Arc<dyn MessageQueue>,
    parser: MessageParser,
    processor: Arc<MessageProcessor>,
    retry_limit: u32,
    fault_trigger: FaultTrigger,
    logger: Arc<dyn MessageLogger>,
    cancel: CancellationToken,
}

impl MessagePump {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        parser: MessageParser,
        processor: Arc<MessageProcessor>,
    ) -> Self {
        Self {
            id: "pump".to_string(),
            queue,
            parser,
            processor,
            retry_limit: 5,
            fault_trigger: FaultTrigger::default(),
            logger: Arc::new(TracingMessageLogger),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    pub fn with_fault_trigger(mut self, trigger: FaultTrigger) -> Self {
        self.fault_trigger = trigger;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn MessageLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request the loop to exit at the next poll boundary.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Poll and process until stopped. Never returns an error: every
    /// failure is logged and the loop carries on.
    pub fn run(&self) -> PumpStats {
        let span = info_span!("pump", pump = %self.id);
        let _entered = span.enter();
        info!(pump = %self.id, "pump started");

        let mut stats = PumpStats::default();
        while !self.cancel.is_cancelled() {
            match self.run_once(&mut stats) {
                Ok(_) => {}
                Err(TransportError::Cancelled) => break,
                Err(err) => {
                    stats.poll_errors += 1;
                    error!(pump = %self.id, error = %err, "failed to poll queue");
                    if self.cancel.wait_timeout(POLL_ERROR_BACKOFF) {
                        break;
                    }
                }
            }
        }

        info!(pump = %self.id, ?stats, "pump stopped");
        stats
    }

    /// One poll plus processing of the batch it returned.
    ///
    /// Returns the batch size, or the transport error that prevented the
    /// poll (`Cancelled` once stopped).
    pub fn run_once(&self, stats: &mut PumpStats) -> Result<usize, TransportError> {
        stats.polls += 1;
        let batch = self.queue.get_messages(&self.cancel)?;
        stats.received += batch.len();

        for raw in &batch {
            let outcome = catch_unwind(AssertUnwindSafe(|| self.handle(raw, stats)));
            if let Err(panic) = outcome {
                error!(
                    pump = %self.id,
                    message_id = %raw.message_id,
                    panic = %panic_message(panic.as_ref()),
                    "unexpected failure handling message"
                );
            }
        }
        Ok(batch.len())
    }

    fn handle(&self, raw: &RawMessage, stats: &mut PumpStats) {
        let message = self.parser.parse(raw);
        self.logger.inbound_log_message(
            &message.body,
            &message.message_type_name,
            &message.id,
            message.attempt_number,
        );

        let result = if message.parsing_succeeded() {
            self.processor.process_message(&message)
        } else {
            if let Some(err) = &message.parse_error {
                warn!(pump = %self.id, message_id = %message.id, error = %err, "failed to parse message");
            }
            MessageProcessingResult::failure(ProcessingError::ParseFailure, Duration::ZERO)
        };

        let final_attempt = self
            .fault_trigger
            .is_final_attempt(message.attempt_number, self.retry_limit);

        match &result.error {
            None => {
                stats.handled += 1;
                if let Err(err) = self.queue.remove_message(&message.receipt_handle) {
                    error!(pump = %self.id, message_id = %message.id, error = %err, "failed to remove message");
                }
            }
            Some(err) => {
                stats.failed += 1;
                debug!(
                    pump = %self.id,
                    message_id = %message.id,
                    attempt = message.attempt_number,
                    error = %err,
                    "message failed, leaving for redelivery"
                );
                if final_attempt {
                    warn!(
                        pump = %self.id,
                        message_id = %message.id,
                        attempt = message.attempt_number,
                        "retry limit reached, invoking fault handlers"
                    );
                    self.processor.process_faulted_message(&message, err);
                    stats.faulted += 1;
                }
            }
        }

        self.processor.process_statistics(&MessageStatistics {
            message_type: message.message_type_name.clone(),
            success: result.was_successful(),
            handler_run_time: result.runtime,
            message_length: message.body.len(),
            previous_retry_count: message.attempt_number,
            final_attempt,
        });
    }
}
