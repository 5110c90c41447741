//! 🔌 Backends: where the real I/O happens.
//!
//! 🚰 The search API pours events out, publishers and sinks slurp them up.
//! And in between, we panic! (kidding, we return typed errors)
//!
//! 🎭 This module is the casting agency. Need to ask the aggregation store for the last
//! minute of firewall drama? Scroll a legacy index from the first doc to the last?
//! Shove a batch onto a Kafka topic? Bulk-write a page into daily indices?
//! We've got a backend for that. Plus in-memory understudies for the test suite.
//!
//! 🧠 Knowledge graph:
//! - `search_api`: `SearchApiClient`: both API generations + the scroll cursor. No trait,
//!   there's only one aggregation store and tests point it at a wiremock server.
//! - `Publisher` trait → `KafkaPublisher` | `InMemoryPublisher` → `PublisherBackend` enum
//! - `BulkSink` trait → `ElasticsearchSink` | `InMemorySink` → `SinkBackend` enum
//!
//! 🦆 The duck is here because every file must have one. This is law. Do not question the duck.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::common::Batch;
use crate::errors::{BulkWriteError, PublishError};

pub mod elasticsearch;
pub mod in_mem;
pub mod kafka;
pub mod search_api;

pub use elasticsearch::{ClusterConfig, ElasticsearchSink};
pub use in_mem::{InMemoryPublisher, InMemorySink};
pub use kafka::{KafkaPublisher, KafkaPublisherConfig};
pub use search_api::{Cursor, GenerationOutcome, SearchApiClient, SearchApiConfig};

// ===== Publisher Trait and Backend Enum =====

/// 📨 Something that takes a whole batch and puts it on a topic.
///
/// # Contract
/// - One call, one batch, one verdict. If any message fails, the batch fails.
/// - No retries. No reconnects. The caller logs the drop and moves on.
#[async_trait]
pub trait Publisher: std::fmt::Debug + Send {
    async fn publish(&mut self, batch: &Batch) -> Result<(), PublishError>;
}

/// 🎭 The many faces of a Publisher.
#[derive(Debug)]
pub enum PublisherBackend {
    Kafka(KafkaPublisher),
    InMemory(InMemoryPublisher),
}

#[async_trait]
impl Publisher for PublisherBackend {
    async fn publish(&mut self, batch: &Batch) -> Result<(), PublishError> {
        match self {
            PublisherBackend::Kafka(kafka) => kafka.publish(batch).await,
            PublisherBackend::InMemory(mem) => mem.publish(batch).await,
        }
    }
}

// ===== BulkSink Trait and Backend Enum =====

/// 📦 One staged write: put `source` into `index` under `id`.
///
/// Keyed on the ORIGINAL id, so writing it twice overwrites instead of duplicating.
/// That's the whole idempotence story. It fits on a sticky note.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOp {
    pub index: String,
    pub id: String,
    pub source: Map<String, Value>,
}

/// ✅ What a bulk call reports back when it goes well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BulkSummary {
    pub written: usize,
}

/// 🕳️ A sink that takes one page of staged writes per call.
///
/// # Contract
/// - `write` is one bulk request. All ops or an error describing how many didn't land.
/// - No retries. The migrator logs the failed page and keeps scrolling.
#[async_trait]
pub trait BulkSink: std::fmt::Debug + Send {
    async fn write(&mut self, ops: &[BulkOp]) -> Result<BulkSummary, BulkWriteError>;
}

/// 🎭 The many faces of a BulkSink.
#[derive(Debug)]
pub enum SinkBackend {
    Elasticsearch(ElasticsearchSink),
    InMemory(InMemorySink),
}

#[async_trait]
impl BulkSink for SinkBackend {
    async fn write(&mut self, ops: &[BulkOp]) -> Result<BulkSummary, BulkWriteError> {
        match self {
            SinkBackend::Elasticsearch(es) => es.write(ops).await,
            SinkBackend::InMemory(mem) => mem.write(ops).await,
        }
    }
}
