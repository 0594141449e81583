//! Export pipeline for popped block side-effect records.
//!
//! - [`codec`]: the schema-tagged JSON envelope put on the wire
//! - [`transport`]: the broker interface the exporter and consumer talk to
//! - [`memory`]: an in-process broker with topics and consumer groups
//! - [`exporter`]: background publisher, decoupled from block finalization
//! - [`consumer`]: read loop for downstream auditors

pub mod codec;
pub mod config;
pub mod consumer;
pub mod exporter;
pub mod memory;
pub mod retry;
pub mod transport;

pub use codec::{decode_payload, encode_payload, message_key, CodecError, StatsPayload, SCHEMA};
pub use config::{ConsumerConfig, ExporterConfig, DEFAULT_GROUP_ID, DEFAULT_TOPIC};
pub use consumer::{CollectingHandler, ConsumerStats, HandlerError, PayloadHandler, StatsConsumer};
pub use exporter::{ExporterStats, PublishOutcome, StatsExporter};
pub use memory::{MemoryBroker, MemorySubscription};
pub use retry::RetryPolicy;
pub use transport::{Message, MessageSource, Subscriber, Transport, TransportError};
