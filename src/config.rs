//! Bus configuration.
//!
//! Loadable from JSON (every field but `queue_name` has a default) or built
//! in code with the `with_*` methods:
//!
//! ```
//! use transit_bus::{BusConfig, FaultTrigger};
//!
//! let config = BusConfig::from_json(r#"{
//!     "bus_name": "shop",
//!     "receive": { "queue_name": "orders", "retry_count": 3, "fault_trigger": "at_or_above_limit" }
//! }"#).unwrap();
//!
//! let receive = config.receive.as_ref().unwrap();
//! assert_eq!(receive.retry_count, 3);
//! assert_eq!(receive.fault_trigger, FaultTrigger::AtOrAboveLimit);
//! assert_eq!(config.queue_name().as_deref(), Some("shop_orders"));
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Largest long-poll wait a queue service accepts, in seconds.
pub const MAX_POLL_WAIT_SECONDS: u64 = 14;
pub const MAX_RETRY_COUNT: u32 = 1000;

/// When a failed message is handed to its fault handlers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultTrigger {
    /// Only when the attempt number equals the retry limit. An attempt count
    /// that skips the limit never escalates.
    #[default]
    OnExactAttempt,
    /// Whenever the attempt number has reached the retry limit.
    AtOrAboveLimit,
}

impl FaultTrigger {
    /// Whether `attempt_number` is the one that escalates.
    pub fn is_final_attempt(self, attempt_number: u32, retry_limit: u32) -> bool {
        match self {
            FaultTrigger::OnExactAttempt => attempt_number == retry_limit,
            FaultTrigger::AtOrAboveLimit => attempt_number >= retry_limit,
        }
    }
}

/// How the handlers registered for one message are run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerExecution {
    /// One after another on the pump thread.
    #[default]
    Sequential,
    /// Each on its own scoped thread, all within the same unit of work.
    Parallel,
}

fn default_retry_count() -> u32 {
    5
}

fn default_polling_instances() -> usize {
    1
}

fn default_max_messages() -> usize {
    10
}

/// Settings for receiving from the bus's input queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveConfig {
    pub queue_name: String,
    /// Attempt at which a failing message is escalated to fault handlers.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Number of concurrent pumps.
    #[serde(default = "default_polling_instances")]
    pub polling_instances: usize,
    #[serde(default)]
    pub poll_wait_seconds: u64,
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    #[serde(default)]
    pub fault_trigger: FaultTrigger,
    #[serde(default)]
    pub handler_execution: HandlerExecution,
}

impl ReceiveConfig {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            retry_count: default_retry_count(),
            polling_instances: default_polling_instances(),
            poll_wait_seconds: 0,
            max_messages: default_max_messages(),
            fault_trigger: FaultTrigger::default(),
            handler_execution: HandlerExecution::default(),
        }
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_polling_instances(mut self, instances: usize) -> Self {
        self.polling_instances = instances;
        self
    }

    pub fn with_poll_wait_seconds(mut self, seconds: u64) -> Self {
        self.poll_wait_seconds = seconds;
        self
    }

    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages;
        self
    }

    pub fn with_fault_trigger(mut self, trigger: FaultTrigger) -> Self {
        self.fault_trigger = trigger;
        self
    }

    pub fn with_handler_execution(mut self, execution: HandlerExecution) -> Self {
        self.handler_execution = execution;
        self
    }

    pub fn poll_wait(&self) -> Duration {
        Duration::from_secs(self.poll_wait_seconds)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_name.trim().is_empty() {
            return Err(ConfigError::invalid("queue_name", "must not be blank"));
        }
        if !(1..=MAX_RETRY_COUNT).contains(&self.retry_count) {
            return Err(ConfigError::invalid(
                "retry_count",
                format!("must be between 1 and {MAX_RETRY_COUNT}"),
            ));
        }
        if self.poll_wait_seconds > MAX_POLL_WAIT_SECONDS {
            return Err(ConfigError::invalid(
                "poll_wait_seconds",
                format!("must be between 0 and {MAX_POLL_WAIT_SECONDS}"),
            ));
        }
        if self.max_messages == 0 {
            return Err(ConfigError::invalid("max_messages", "must be at least 1"));
        }
        Ok(())
    }
}

/// Top-level bus settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Prefix for the queue and topic names this bus uses.
    #[serde(default)]
    pub bus_name: Option<String>,
    /// Reported as `SenderVersion` on every outbound message.
    #[serde(default)]
    pub application_version: Option<String>,
    #[serde(default)]
    pub receive: Option<ReceiveConfig>,
}

impl BusConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: BusConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_bus_name(mut self, name: impl Into<String>) -> Self {
        self.bus_name = Some(name.into());
        self
    }

    pub fn with_application_version(mut self, version: impl Into<String>) -> Self {
        self.application_version = Some(version.into());
        self
    }

    pub fn with_receive(mut self, receive: ReceiveConfig) -> Self {
        self.receive = Some(receive);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.bus_name {
            if name.trim().is_empty() {
                return Err(ConfigError::invalid("bus_name", "must not be blank"));
            }
        }
        match &self.receive {
            Some(receive) => receive.validate(),
            None => Ok(()),
        }
    }

    /// Input queue name, prefixed with the bus name when one is set.
    pub fn queue_name(&self) -> Option<String> {
        let receive = self.receive.as_ref()?;
        Some(match &self.bus_name {
            Some(bus) => format!("{bus}_{}", receive.queue_name),
            None => receive.queue_name.clone(),
        })
    }

    pub fn topic_namer(&self) -> TopicNamer {
        TopicNamer::new(self.bus_name.as_deref())
    }
}

type FormatFn = dyn Fn(&str) -> String + Send + Sync;

/// Maps a message type name to the topic it is published on.
///
/// By default `orders::events::Placed` becomes `orders_events_Placed`,
/// prefixed with `<bus_name>_` when the bus has a name. Characters a topic
/// name cannot hold are replaced with `_`.
#[derive(Clone, Default)]
pub struct TopicNamer {
    prefix: Option<String>,
    custom: Option<Arc<FormatFn>>,
}

impl TopicNamer {
    pub fn new(bus_name: Option<&str>) -> Self {
        Self {
            prefix: bus_name.map(str::to_string),
            custom: None,
        }
    }

    /// Replace the default naming entirely.
    pub fn custom(format: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self {
            prefix: None,
            custom: Some(Arc::new(format)),
        }
    }

    pub fn topic_for(&self, message_type: &str) -> String {
        if let Some(format) = &self.custom {
            return format(message_type);
        }
        let base: String = message_type
            .replace("::", "_")
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        match &self.prefix {
            Some(prefix) => format!("{prefix}_{base}"),
            None => base,
        }
    }
}

impl fmt::Debug for TopicNamer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicNamer")
            .field("prefix", &self.prefix)
            .field("custom", &self.custom.is_some())
            .finish()
    }
}
