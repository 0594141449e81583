// BLOCK STATS SERVICE
//
// What the execution engine holds: the store its execution contexts write
// into, wired to the exporter that ships each finished block. Cloning the
// store handle out of `store()` is how collectors get access.

use log::debug;
use std::sync::Arc;

use exestats_collector::BlockStatsStore;
use exestats_export::{ExporterStats, PublishOutcome, StatsExporter, Transport};
use exestats_types::BlockType;

use crate::config::StatsConfig;

pub struct BlockStatsService {
    store: Arc<BlockStatsStore>,
    exporter: StatsExporter,
}

impl BlockStatsService {
    /// Must be called from within a tokio runtime.
    pub fn start(config: &StatsConfig, transport: Arc<dyn Transport>) -> Self {
        let store = Arc::new(BlockStatsStore::new(config.collector.clone()));
        let exporter = StatsExporter::start(config.exporter.clone(), transport);
        Self { store, exporter }
    }

    pub fn store(&self) -> &Arc<BlockStatsStore> {
        &self.store
    }

    /// Block start.
    pub fn begin_block(&self, block_number: u64) {
        self.store.init(block_number);
    }

    /// Block end: takes the record and hands it to the exporter. `None` when
    /// there was nothing to take (store disabled, block never started, or
    /// already finished).
    pub fn finish_block(&self, block_number: u64, block_type: Option<BlockType>) -> Option<PublishOutcome> {
        let data = self.store.pop(block_number)?;
        let outcome = self.exporter.publish_typed(block_number, block_type, data);
        debug!("Finished block {}: {:?}", block_number, outcome);
        Some(outcome)
    }

    pub fn exporter_stats(&self) -> ExporterStats {
        self.exporter.stats()
    }

    /// Flushes the exporter. Blocks still open in the store are discarded.
    pub async fn shutdown(self) -> ExporterStats {
        let open = self.store.active_count();
        if open > 0 {
            log::warn!("Shutting down with {} unfinished blocks", open);
        }
        self.exporter.shutdown().await
    }
}
