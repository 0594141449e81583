use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::retry::RetryPolicy;

pub const DEFAULT_TOPIC: &str = "exe-block-data";
pub const DEFAULT_GROUP_ID: &str = "account-checking-group";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    pub enabled: bool,
    pub topic: String,
    /// Payloads accepted but not yet sent. Publishing into a full queue drops.
    pub queue_capacity: usize,
    pub retry: RetryPolicy,
    /// How long shutdown waits for queued payloads to go out.
    pub flush_timeout_ms: u64,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            topic: DEFAULT_TOPIC.to_string(),
            queue_capacity: 256,
            retry: RetryPolicy::default(),
            flush_timeout_ms: 15_000,
        }
    }
}

impl ExporterConfig {
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.topic.trim().is_empty() {
            return Err("exporter.topic must not be empty".to_string());
        }
        if self.queue_capacity == 0 {
            return Err("exporter.queue_capacity must be at least 1".to_string());
        }
        self.retry.validate().map_err(|e| format!("exporter.{}", e))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub topic: String,
    pub group_id: String,
    pub retry: RetryPolicy,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            group_id: DEFAULT_GROUP_ID.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ConsumerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.topic.trim().is_empty() {
            return Err("consumer.topic must not be empty".to_string());
        }
        if self.group_id.trim().is_empty() {
            return Err("consumer.group_id must not be empty".to_string());
        }
        self.retry.validate().map_err(|e| format!("consumer.{}", e))
    }
}
