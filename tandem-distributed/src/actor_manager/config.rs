use serde::{Deserialize, Serialize};

/// Configuration of [`ActorManager`](super::ActorManager).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ActorManagerConfig {
    /// Prefix of worker names; the worker id is appended.
    ///
    /// The default value is `"actor"`.
    pub name_prefix: String,
}

impl Default for ActorManagerConfig {
    fn default() -> Self {
        Self {
            name_prefix: "actor".to_string(),
        }
    }
}

impl ActorManagerConfig {
    /// Sets the prefix of worker names.
    pub fn name_prefix(mut self, v: impl Into<String>) -> Self {
        self.name_prefix = v.into();
        self
    }
}
