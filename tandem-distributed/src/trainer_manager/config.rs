use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration of [`TrainerManager`](super::TrainerManager).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrainerManagerConfig {
    /// Prefix of worker names; the worker id is appended.
    ///
    /// The default value is `"trainer"`.
    pub name_prefix: String,

    /// Interval in milliseconds at which a training task checks whether its
    /// dataset is good to learn.
    ///
    /// The default value is 1000.
    pub poll_interval_ms: u64,
}

impl Default for TrainerManagerConfig {
    fn default() -> Self {
        Self {
            name_prefix: "trainer".to_string(),
            poll_interval_ms: 1000,
        }
    }
}

impl TrainerManagerConfig {
    /// Sets the prefix of worker names.
    pub fn name_prefix(mut self, v: impl Into<String>) -> Self {
        self.name_prefix = v.into();
        self
    }

    /// Sets the polling interval in milliseconds.
    pub fn poll_interval_ms(mut self, v: u64) -> Self {
        self.poll_interval_ms = v;
        self
    }

    /// Polling interval of training tasks.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
