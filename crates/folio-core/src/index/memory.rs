//! In-memory [`EmbeddingIndex`] for tests and embedding in other programs.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`, kept in insertion
//! order. Queries are brute-force cosine distance over every record that
//! passes the filter.

use std::sync::{PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::{cosine_distance, Embedder, HashingEmbedder};
use crate::models::Metadata;

use super::{EmbeddingIndex, IndexHit, IndexRecord, MetadataFilter};

struct Entry {
    id: String,
    text: String,
    metadata: Metadata,
    vector: Vec<f32>,
}

/// Brute-force in-memory index.
pub struct InMemoryIndex {
    embedder: Box<dyn Embedder>,
    entries: RwLock<Vec<Entry>>,
}

impl InMemoryIndex {
    pub fn new(embedder: Box<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder
            .embed(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new(Box::new(HashingEmbedder::new(256)))
    }
}

#[async_trait]
impl EmbeddingIndex for InMemoryIndex {
    async fn upsert(&self, id: &str, text: &str, metadata: &Metadata) -> Result<bool> {
        let vector = self.embed_one(text).await?;
        let entry = Entry {
            id: id.to_string(),
            text: text.to_string(),
            metadata: metadata.clone(),
            vector,
        };

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.iter_mut().find(|e| e.id == id) {
            Some(existing) => {
                *existing = entry;
                Ok(true)
            }
            None => {
                entries.push(entry);
                Ok(false)
            }
        }
    }

    async fn get(&self, id: &str) -> Result<Option<IndexRecord>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.iter().find(|e| e.id == id).map(|e| IndexRecord {
            id: e.id.clone(),
            text: e.text.clone(),
            metadata: e.metadata.clone(),
        }))
    }

    async fn query(
        &self,
        text: &str,
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<IndexHit>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self.embed_one(text).await?;

        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut hits: Vec<IndexHit> = entries
            .iter()
            .filter(|e| filter.map_or(true, |f| f.matches(&e.metadata)))
            .map(|e| IndexHit {
                id: e.id.clone(),
                text: e.text.clone(),
                metadata: e.metadata.clone(),
                distance: cosine_distance(&query_vec, &e.vector),
            })
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(limit);
        Ok(hits)
    }
}
