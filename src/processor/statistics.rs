//! Per-attempt processing statistics and their listeners.

use std::time::Duration;

/// Summary of one processing attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageStatistics {
    pub message_type: String,
    pub success: bool,
    pub handler_run_time: Duration,
    /// Body length in bytes.
    pub message_length: usize,
    /// Delivery attempt number as reported by the transport (1 on first
    /// delivery).
    pub previous_retry_count: u32,
    /// Whether this attempt escalated (or would have escalated) to fault
    /// handlers.
    pub final_attempt: bool,
}

/// Receives statistics for every processed attempt.
///
/// Register implementations in the bus scope as `dyn StatisticsListener`.
/// A listener that panics does not stop the others from being called.
pub trait StatisticsListener: Send + Sync {
    fn on_statistics(&self, statistics: &MessageStatistics);
}

impl<F> StatisticsListener for F
where
    F: Fn(&MessageStatistics) + Send + Sync,
{
    fn on_statistics(&self, statistics: &MessageStatistics) {
        self(statistics)
    }
}
