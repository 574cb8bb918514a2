//! Embedding index abstraction.
//!
//! The [`EmbeddingIndex`] trait is the only thing the version store knows
//! about persistence: it stores `(id, text, metadata)` triples, embeds the
//! text however it likes, and answers nearest-neighbour queries with a
//! distance per hit. Filtering happens inside the index, never in the
//! caller.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Metadata;

pub use memory::InMemoryIndex;

/// A record as read back by id.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
}

/// One nearest-neighbour result. Lower `distance` is more similar.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub distance: f64,
}

/// Metadata equality condition pushed down to the index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    conditions: Vec<(String, String)>,
}

impl MetadataFilter {
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            conditions: vec![(key.into(), value.into())],
        }
    }

    pub fn conditions(&self) -> &[(String, String)] {
        &self.conditions
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions
            .iter()
            .all(|(k, v)| metadata.get(k).is_some_and(|actual| actual == v))
    }
}

/// Abstract nearest-neighbour index over chapter text.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](EmbeddingIndex::upsert) | Insert or replace a record by id |
/// | [`get`](EmbeddingIndex::get) | Point lookup by id |
/// | [`query`](EmbeddingIndex::query) | Nearest records to a text, optionally filtered |
#[async_trait]
pub trait EmbeddingIndex: Send + Sync {
    /// Insert or replace the record at `id`.
    ///
    /// Returns `true` when an existing record was replaced.
    async fn upsert(&self, id: &str, text: &str, metadata: &Metadata) -> Result<bool>;

    /// Fetch a record by id. `Ok(None)` when absent.
    async fn get(&self, id: &str) -> Result<Option<IndexRecord>>;

    /// Up to `limit` records nearest to `text`, ascending by distance.
    async fn query(
        &self,
        text: &str,
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<IndexHit>>;
}
