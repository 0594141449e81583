//! Read side of the stats channel.
//!
//! A bad message never stops the loop: undecodable payloads and handler
//! failures are logged and skipped. Transport errors back off (capped) and,
//! after `retry.max_attempts` consecutive failures, re-subscribe. The loop
//! only ends on cancellation or when the stream closes.

use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::codec::{decode_payload, StatsPayload};
use crate::config::ConsumerConfig;
use crate::transport::{Message, MessageSource, Subscriber};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("handler error: {0}")]
pub struct HandlerError(pub String);

/// Downstream processing for each decoded payload.
#[async_trait]
pub trait PayloadHandler: Send {
    async fn handle(&mut self, message: &Message, payload: StatsPayload) -> Result<(), HandlerError>;
}

/// Keeps every payload it is given.
#[derive(Debug, Default)]
pub struct CollectingHandler {
    pub payloads: Vec<StatsPayload>,
}

#[async_trait]
impl PayloadHandler for CollectingHandler {
    async fn handle(&mut self, _message: &Message, payload: StatsPayload) -> Result<(), HandlerError> {
        self.payloads.push(payload);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub handled: u64,
    pub decode_errors: u64,
    pub handler_errors: u64,
    pub transport_errors: u64,
    pub resubscribes: u64,
}

pub struct StatsConsumer<S: Subscriber> {
    subscriber: Arc<S>,
    config: ConsumerConfig,
}

impl<S: Subscriber> StatsConsumer<S> {
    pub fn new(subscriber: Arc<S>, config: ConsumerConfig) -> Self {
        Self { subscriber, config }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Consumes until `cancel` fires or the stream ends.
    pub async fn run<H: PayloadHandler>(&self, handler: &mut H, cancel: CancellationToken) -> ConsumerStats {
        let mut stats = ConsumerStats::default();
        let Some(mut source) = self.connect(&cancel).await else {
            return stats;
        };
        info!(
            "Stats consumer subscribed: topic={} group={}",
            self.config.topic, self.config.group_id
        );

        let mut failures: u32 = 0;
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = source.recv() => next,
            };

            match next {
                Ok(Some(message)) => {
                    failures = 0;
                    stats.received += 1;
                    self.process(handler, &message, &mut stats).await;
                }
                Ok(None) => {
                    info!("Stats stream {} closed", self.config.topic);
                    break;
                }
                Err(e) => {
                    failures += 1;
                    stats.transport_errors += 1;
                    let delay = self.config.retry.backoff(failures);
                    warn!("Stats consumer receive failed ({}), retrying in {:?}", e, delay);
                    if !sleep_or_cancel(delay, &cancel).await {
                        break;
                    }
                    if failures >= self.config.retry.max_attempts {
                        warn!("Stats consumer re-subscribing after {} consecutive failures", failures);
                        source = match self.connect(&cancel).await {
                            Some(source) => source,
                            None => break,
                        };
                        stats.resubscribes += 1;
                        failures = 0;
                    }
                }
            }
        }

        info!(
            "Stats consumer stopped: received={} handled={} decode_errors={} handler_errors={}",
            stats.received, stats.handled, stats.decode_errors, stats.handler_errors
        );
        stats
    }

    async fn process<H: PayloadHandler>(&self, handler: &mut H, message: &Message, stats: &mut ConsumerStats) {
        let payload = match decode_payload(&message.payload) {
            Ok(payload) => payload,
            Err(e) => {
                stats.decode_errors += 1;
                warn!(
                    "Skipping undecodable stats message {}@{}: {}",
                    message.topic, message.offset, e
                );
                return;
            }
        };
        let block_number = payload.block_number;
        match handler.handle(message, payload).await {
            Ok(()) => {
                stats.handled += 1;
                debug!("Handled stats for block {}", block_number);
            }
            Err(e) => {
                stats.handler_errors += 1;
                error!("Stats handler failed for block {}: {}", block_number, e);
            }
        }
    }

    /// Subscribes, backing off between failed attempts. `None` if cancelled.
    async fn connect(&self, cancel: &CancellationToken) -> Option<S::Source> {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            match self.subscriber.subscribe(&self.config.topic, &self.config.group_id).await {
                Ok(source) => return Some(source),
                Err(e) if e.is_retryable() => {
                    attempt = attempt.saturating_add(1);
                    let delay = self.config.retry.backoff(attempt);
                    warn!("Stats consumer subscribe failed ({}), retrying in {:?}", e, delay);
                    if !sleep_or_cancel(delay, cancel).await {
                        return None;
                    }
                }
                Err(e) => {
                    error!("Stats consumer cannot subscribe: {}", e);
                    return None;
                }
            }
        }
    }
}

/// False if cancelled before `delay` elapsed.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
