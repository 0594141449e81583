use serde::{Deserialize, Serialize};

/// Number of popped block numbers remembered to refuse re-initialization.
pub const DEFAULT_RETIRED_CAPACITY: usize = 1024;

/// What happens when a once-per-block field is written a second time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SingletonPolicy {
    /// Keep the first value; later writes are logged and discarded.
    #[default]
    FirstWins,
    /// Replace with the latest value; the overwrite is logged.
    LastWins,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Master switch. Off means no record is ever created.
    pub enabled: bool,
    pub singleton_policy: SingletonPolicy,
    /// How many popped block numbers are remembered. Must be at least 1.
    pub retired_capacity: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            singleton_policy: SingletonPolicy::FirstWins,
            retired_capacity: DEFAULT_RETIRED_CAPACITY,
        }
    }
}

impl CollectorConfig {
    pub fn enabled() -> Self {
        Self { enabled: true, ..Self::default() }
    }

    pub fn with_policy(mut self, policy: SingletonPolicy) -> Self {
        self.singleton_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.retired_capacity == 0 {
            return Err("collector.retired_capacity must be at least 1".to_string());
        }
        Ok(())
    }
}
