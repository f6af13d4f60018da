use std::time::Duration;

use crate::error::ProcessingError;

/// Outcome of one dispatch attempt. Successful iff `error` is `None`.
#[derive(Debug)]
pub struct MessageProcessingResult {
    pub error: Option<ProcessingError>,
    pub runtime: Duration,
}

impl MessageProcessingResult {
    pub fn success(runtime: Duration) -> Self {
        Self {
            error: None,
            runtime,
        }
    }

    pub fn failure(error: ProcessingError, runtime: Duration) -> Self {
        Self {
            error: Some(error),
            runtime,
        }
    }

    pub fn was_successful(&self) -> bool {
        self.error.is_none()
    }
}
