//! In-process broker.
//!
//! Topics are append-only logs. Each consumer group owns one read cursor per
//! topic, so independent groups each see every message once while consumers
//! in the same group share the stream. Used by tests and by the demo CLI;
//! fault injection lets tests drive the retry paths.

use async_trait::async_trait;
use dashmap::DashMap;
use log::debug;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::transport::{Message, MessageSource, Subscriber, Transport, TransportError};

#[derive(Default)]
struct TopicLog {
    messages: RwLock<Vec<Message>>,
    appended: Notify,
}

#[derive(Default)]
struct BrokerInner {
    topics: DashMap<String, Arc<TopicLog>>,
    /// (topic, group) -> next offset
    cursors: DashMap<(String, String), Arc<Mutex<u64>>>,
    closed: AtomicBool,
    send_failures: AtomicUsize,
    recv_failures: AtomicUsize,
}

impl BrokerInner {
    fn topic(&self, name: &str) -> Arc<TopicLog> {
        self.topics.entry(name.to_string()).or_default().clone()
    }

    /// Consumes one injected failure if any are pending.
    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Cheap to clone; clones share the same topics.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` sends fail with `Unavailable`.
    pub fn inject_send_failures(&self, count: usize) {
        self.inner.send_failures.store(count, Ordering::Release);
    }

    /// Makes the next `count` receives, across all subscriptions, fail with
    /// `Unavailable`.
    pub fn inject_recv_failures(&self, count: usize) {
        self.inner.recv_failures.store(count, Ordering::Release);
    }

    /// Rejects further sends and ends every subscription once it has read
    /// what was already published.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        for topic in self.inner.topics.iter() {
            topic.appended.notify_waiters();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Everything published to `topic` so far.
    pub fn messages(&self, topic: &str) -> Vec<Message> {
        match self.inner.topics.get(topic) {
            Some(log) => log.messages.read().clone(),
            None => Vec::new(),
        }
    }

    pub fn topic_len(&self, topic: &str) -> usize {
        self.inner
            .topics
            .get(topic)
            .map(|log| log.messages.read().len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Transport for MemoryBroker {
    async fn send(&self, topic: &str, key: &[u8], payload: &[u8]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if BrokerInner::take_failure(&self.inner.send_failures) {
            return Err(TransportError::Unavailable("injected send failure".to_string()));
        }
        let log = self.inner.topic(topic);
        {
            let mut messages = log.messages.write();
            let offset = messages.len() as u64;
            messages.push(Message {
                topic: topic.to_string(),
                key: key.to_vec(),
                payload: payload.to_vec(),
                offset,
            });
            debug!("memory broker: {}@{} ({} bytes)", topic, offset, payload.len());
        }
        log.appended.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl Subscriber for MemoryBroker {
    type Source = MemorySubscription;

    /// Subscribing to a closed broker still drains what was published.
    async fn subscribe(&self, topic: &str, group_id: &str) -> Result<MemorySubscription, TransportError> {
        let cursor = self
            .inner
            .cursors
            .entry((topic.to_string(), group_id.to_string()))
            .or_default()
            .clone();
        Ok(MemorySubscription {
            broker: Arc::clone(&self.inner),
            log: self.inner.topic(topic),
            cursor,
        })
    }
}

pub struct MemorySubscription {
    broker: Arc<BrokerInner>,
    log: Arc<TopicLog>,
    cursor: Arc<Mutex<u64>>,
}

impl MemorySubscription {
    fn try_next(&self) -> Option<Message> {
        let mut cursor = self.cursor.lock();
        let messages = self.log.messages.read();
        let next = messages.get(*cursor as usize).cloned();
        if next.is_some() {
            *cursor += 1;
        }
        next
    }
}

#[async_trait]
impl MessageSource for MemorySubscription {
    async fn recv(&mut self) -> Result<Option<Message>, TransportError> {
        if BrokerInner::take_failure(&self.broker.recv_failures) {
            return Err(TransportError::Unavailable("injected receive failure".to_string()));
        }
        loop {
            // Register for wake-up before looking, so an append between the
            // check and the await is not missed.
            let appended = self.log.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            if let Some(message) = self.try_next() {
                return Ok(Some(message));
            }
            if self.broker.closed.load(Ordering::Acquire) {
                return Ok(None);
            }
            appended.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_groups_each_see_full_stream() {
        let broker = MemoryBroker::new();
        for word in ["a", "b", "c"] {
            broker.send("t", b"k", word.as_bytes()).await.unwrap();
        }
        let mut auditors = broker.subscribe("t", "auditors").await.unwrap();
        let mut relay = broker.subscribe("t", "relay").await.unwrap();
        for expected in [b"a", b"b", b"c"] {
            assert_eq!(auditors.recv().await.unwrap().unwrap().payload, expected.to_vec());
            assert_eq!(relay.recv().await.unwrap().unwrap().payload, expected.to_vec());
        }
    }

    #[tokio::test]
    async fn test_same_group_splits_stream() {
        let broker = MemoryBroker::new();
        for i in 0..4u8 {
            broker.send("t", b"k", &[i]).await.unwrap();
        }
        let mut first = broker.subscribe("t", "g").await.unwrap();
        let mut second = broker.subscribe("t", "g").await.unwrap();
        let a = first.recv().await.unwrap().unwrap();
        let b = second.recv().await.unwrap().unwrap();
        assert_eq!((a.offset, b.offset), (0, 1));
    }

    #[tokio::test]
    async fn test_recv_waits_for_publish() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe("t", "g").await.unwrap();
        let producer = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.send("t", b"1", b"late").await.unwrap();
        });
        let message = tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .expect("recv should wake on publish")
            .unwrap()
            .unwrap();
        assert_eq!(message.payload, b"late".to_vec());
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let broker = MemoryBroker::new();
        broker.send("t", b"k", b"x").await.unwrap();
        let mut sub = broker.subscribe("t", "g").await.unwrap();
        broker.close();
        assert!(sub.recv().await.unwrap().is_some());
        assert!(sub.recv().await.unwrap().is_none());
        assert_eq!(broker.send("t", b"k", b"y").await, Err(TransportError::Closed));
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let broker = MemoryBroker::new();
        broker.inject_send_failures(2);
        assert!(broker.send("t", b"k", b"x").await.is_err());
        assert!(broker.send("t", b"k", b"x").await.is_err());
        assert!(broker.send("t", b"k", b"x").await.is_ok());
        assert_eq!(broker.topic_len("t"), 1);
    }
}
