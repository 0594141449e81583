// STATS EXPORTER
//
// Block finalization hands a popped record to `publish`, which only enqueues
// it. A background worker encodes and sends, retrying transport failures
// with bounded backoff. Nothing here can block, fail or delay the caller:
// a full queue, an encode error or an exhausted retry budget drops that
// block's stats and logs it.

use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use exestats_types::{BlockType, ExeBlockData};

use crate::codec::{encode_payload, message_key, StatsPayload};
use crate::config::ExporterConfig;
use crate::retry::RetryPolicy;
use crate::transport::Transport;

/// Result of handing a record to the exporter. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Queued,
    Disabled,
    /// Queue full, payload dropped
    QueueFull,
    /// Exporter shut down, payload dropped
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExporterStats {
    pub queued: u64,
    pub published: u64,
    /// Queue full, retries exhausted, or abandoned at shutdown
    pub dropped: u64,
    pub encode_failed: u64,
}

#[derive(Default)]
struct Counters {
    queued: AtomicU64,
    published: AtomicU64,
    dropped: AtomicU64,
    encode_failed: AtomicU64,
    /// Queued payloads the worker has finished with, whatever the outcome
    settled: AtomicU64,
}

impl Counters {
    fn pending(&self) -> u64 {
        self.queued
            .load(Ordering::Acquire)
            .saturating_sub(self.settled.load(Ordering::Acquire))
    }

    fn snapshot(&self) -> ExporterStats {
        ExporterStats {
            queued: self.queued.load(Ordering::Acquire),
            published: self.published.load(Ordering::Acquire),
            dropped: self.dropped.load(Ordering::Acquire),
            encode_failed: self.encode_failed.load(Ordering::Acquire),
        }
    }
}

pub struct StatsExporter {
    config: ExporterConfig,
    sender: Option<mpsc::Sender<StatsPayload>>,
    worker: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl StatsExporter {
    /// Starts the background worker. Must be called from within a tokio
    /// runtime.
    pub fn start(config: ExporterConfig, transport: Arc<dyn Transport>) -> Self {
        let counters = Arc::new(Counters::default());
        if !config.enabled {
            info!("Stats exporter disabled");
            return Self { config, sender: None, worker: None, counters };
        }

        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let worker = tokio::spawn(run_worker(
            receiver,
            transport,
            config.topic.clone(),
            config.retry.clone(),
            Arc::clone(&counters),
        ));
        info!(
            "Stats exporter started: topic={} queue_capacity={}",
            config.topic, config.queue_capacity
        );
        Self { config, sender: Some(sender), worker: Some(worker), counters }
    }

    pub fn config(&self) -> &ExporterConfig {
        &self.config
    }

    pub fn publish(&self, block_number: u64, data: ExeBlockData) -> PublishOutcome {
        self.publish_typed(block_number, None, data)
    }

    /// Enqueues the record for `block_number` without waiting.
    pub fn publish_typed(
        &self,
        block_number: u64,
        block_type: Option<BlockType>,
        data: ExeBlockData,
    ) -> PublishOutcome {
        let Some(sender) = self.sender.as_ref() else {
            return if self.config.enabled { PublishOutcome::Closed } else { PublishOutcome::Disabled };
        };
        match sender.try_send(StatsPayload::new(block_number, block_type, data)) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::AcqRel);
                debug!("Queued stats for block {}", block_number);
                PublishOutcome::Queued
            }
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::AcqRel);
                error!("Stats queue full, dropping stats for block {}", block_number);
                PublishOutcome::QueueFull
            }
            Err(TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::AcqRel);
                error!("Stats exporter closed, dropping stats for block {}", block_number);
                PublishOutcome::Closed
            }
        }
    }

    pub fn stats(&self) -> ExporterStats {
        self.counters.snapshot()
    }

    /// Stops accepting payloads and waits up to `flush_timeout_ms` for the
    /// queue to drain. Whatever is still pending at the deadline is dropped.
    pub async fn shutdown(mut self) -> ExporterStats {
        self.sender.take();
        let Some(mut worker) = self.worker.take() else {
            return self.stats();
        };

        let timeout = self.config.flush_timeout();
        match tokio::time::timeout(timeout, &mut worker).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Stats exporter worker failed: {}", e),
            Err(_) => {
                worker.abort();
                let pending = self.counters.pending();
                self.counters.dropped.fetch_add(pending, Ordering::AcqRel);
                error!(
                    "Stats exporter flush timed out after {:?}, dropped {} pending payloads",
                    timeout, pending
                );
            }
        }

        let stats = self.stats();
        info!(
            "Stats exporter stopped: published={} dropped={} encode_failed={}",
            stats.published, stats.dropped, stats.encode_failed
        );
        stats
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<StatsPayload>,
    transport: Arc<dyn Transport>,
    topic: String,
    retry: RetryPolicy,
    counters: Arc<Counters>,
) {
    while let Some(payload) = receiver.recv().await {
        let block_number = payload.block_number;
        let bytes = match encode_payload(&payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                counters.encode_failed.fetch_add(1, Ordering::AcqRel);
                counters.settled.fetch_add(1, Ordering::AcqRel);
                error!("Failed to encode stats for block {}: {}", block_number, e);
                continue;
            }
        };
        let key = message_key(block_number);
        if deliver(transport.as_ref(), &topic, &key, &bytes, &retry, block_number).await {
            counters.published.fetch_add(1, Ordering::AcqRel);
        } else {
            counters.dropped.fetch_add(1, Ordering::AcqRel);
        }
        counters.settled.fetch_add(1, Ordering::AcqRel);
    }
    debug!("Stats exporter queue closed, worker exiting");
}

async fn deliver(
    transport: &dyn Transport,
    topic: &str,
    key: &[u8],
    bytes: &[u8],
    retry: &RetryPolicy,
    block_number: u64,
) -> bool {
    let mut attempt = 1;
    loop {
        match transport.send(topic, key, bytes).await {
            Ok(()) => {
                debug!("Published stats for block {} to {} ({} bytes)", block_number, topic, bytes.len());
                return true;
            }
            Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                let delay = retry.backoff(attempt);
                warn!(
                    "Publishing stats for block {} failed (attempt {}/{}): {}, retrying in {:?}",
                    block_number, attempt, retry.max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                error!(
                    "Dropping stats for block {} after {} attempts: {}",
                    block_number, attempt, e
                );
                return false;
            }
        }
    }
}
