//! # exestats
//!
//! Records the side effects a node produces while executing a block
//! (slashing, refunds, restricted releases, issuance, rewards, and
//! contract-triggered transfers and calls) and exports one record per block
//! to a downstream statistics consumer.
//!
//! - [`types`]: the record and its wire primitives
//! - [`collector`]: the per-block store written during execution
//! - [`export`]: encoding, publishing and consuming the records
//! - [`BlockStatsService`]: store and exporter wired together
//! - [`StatsConfig`]: layered configuration for all of the above

pub mod config;
pub mod service;

pub use exestats_collector as collector;
pub use exestats_export as export;
pub use exestats_types as types;

pub use config::{ConfigError, StatsConfig, ENV_PREFIX};
pub use service::BlockStatsService;
