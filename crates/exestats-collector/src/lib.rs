//! Block side-effect store.
//!
//! The execution engine opens a record with [`BlockStatsStore::init`] when it
//! starts a block, any execution context records side effects through the
//! `collect_*` family, and the engine takes the finished record with
//! [`BlockStatsStore::pop`] when the block ends. Collection never fails the
//! caller: anything that cannot be recorded is logged and dropped.

pub mod config;
pub mod store;

pub use config::{CollectorConfig, SingletonPolicy, DEFAULT_RETIRED_CAPACITY};
pub use store::{BlockState, BlockStatsStore};
