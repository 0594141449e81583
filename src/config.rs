//! Layered configuration for the whole pipeline.
//!
//! Values come from the built-in defaults, then an optional file (format by
//! extension), then `EXESTATS__SECTION__KEY` environment variables.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use exestats_collector::CollectorConfig;
use exestats_export::{ConsumerConfig, ExporterConfig};

pub const ENV_PREFIX: &str = "EXESTATS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub collector: CollectorConfig,
    pub exporter: ExporterConfig,
    pub consumer: ConsumerConfig,
}

impl StatsConfig {
    /// Loads defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(env.separator("__").try_parsing(true))
            .build()?;
        let loaded: StatsConfig = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.collector.validate().map_err(ConfigError::Invalid)?;
        self.exporter.validate().map_err(ConfigError::Invalid)?;
        self.consumer.validate().map_err(ConfigError::Invalid)?;
        if self.exporter.topic != self.consumer.topic {
            log::warn!(
                "exporter.topic ({}) differs from consumer.topic ({})",
                self.exporter.topic,
                self.consumer.topic
            );
        }
        Ok(())
    }
}
