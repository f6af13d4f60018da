//! Background thread running a `MessagePump`.

use std::thread::{self, JoinHandle};

use super::pump::{MessagePump, PumpStats};
use crate::cancellation::CancellationToken;

/// A pump running on its own thread.
///
/// ## Example
///
/// ```ignore
/// let worker = PumpThread::spawn(pump);
///
/// // ... messages flow ...
///
/// let stats = worker.stop();
/// println!("handled {} messages", stats.handled);
/// ```
pub struct PumpThread {
    id: String,
    cancel: CancellationToken,
    handle: Option<JoinHandle<PumpStats>>,
}

impl PumpThread {
    pub fn spawn(pump: MessagePump) -> Self {
        let id = pump.id().to_string();
        let cancel = pump.cancellation_token();
        let handle = thread::spawn(move || pump.run());
        Self {
            id,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Signal the pump to stop and wait for it to finish.
    /// Returns the pump statistics.
    pub fn stop(mut self) -> PumpStats {
        self.cancel.cancel();
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_default(),
            None => PumpStats::default(),
        }
    }

    /// Signal the pump to stop without waiting.
    pub fn signal_stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for PumpThread {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
