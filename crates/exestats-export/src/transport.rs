//! Broker interface used by the exporter and the consumer.
//!
//! Delivery confirmation is the transport's concern; callers only see
//! whether a send was accepted.

use async_trait::async_trait;
use thiserror::Error;

/// A message as read back from a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub key: Vec<u8>,
    pub payload: Vec<u8>,
    /// Position in the topic log
    pub offset: u64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),
    #[error("message rejected: {0}")]
    Rejected(String),
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// A closed transport will never accept another message.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Closed)
    }
}

/// Producer side.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, topic: &str, key: &[u8], payload: &[u8]) -> Result<(), TransportError>;
}

/// One consumer's view of a topic.
#[async_trait]
pub trait MessageSource: Send {
    /// Next message, waiting if none is available. `Ok(None)` means the
    /// stream has ended.
    async fn recv(&mut self) -> Result<Option<Message>, TransportError>;
}

/// Consumer side. Every consumer group sees the whole stream once;
/// consumers sharing a group split it between them.
#[async_trait]
pub trait Subscriber: Send + Sync {
    type Source: MessageSource;

    async fn subscribe(&self, topic: &str, group_id: &str) -> Result<Self::Source, TransportError>;
}
