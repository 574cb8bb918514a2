//! SQLite-backed [`EmbeddingIndex`].
//!
//! One row per version in the `versions` table, scoped by collection.
//! Embeddings are stored as little-endian f32 BLOBs and compared by cosine
//! distance in Rust after SQL has applied the collection and metadata
//! filters.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use folio_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob, Embedder};
use folio_core::index::{EmbeddingIndex, IndexHit, IndexRecord, MetadataFilter};
use folio_core::models::{keys, Metadata};

pub struct SqliteIndex {
    pool: SqlitePool,
    collection: String,
    embedder: Arc<dyn Embedder>,
}

impl SqliteIndex {
    pub fn new(
        pool: SqlitePool,
        collection: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            pool,
            collection: collection.into(),
            embedder,
        }
    }

    /// Number of versions in this collection.
    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM versions WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder
            .embed(&[text.to_string()])
            .await
            .with_context(|| format!("embedding failed with model {}", self.embedder.model_name()))?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}

/// SQL predicate for one metadata equality condition.
///
/// `chapter` has its own indexed column; other keys go through
/// `json_extract` and must be plain identifiers.
fn condition_sql(key: &str) -> Result<(&'static str, Option<String>)> {
    if key == keys::CHAPTER {
        return Ok(("chapter = ?", None));
    }
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("unsupported metadata filter key: {:?}", key);
    }
    Ok((
        "json_extract(metadata_json, ?) = ?",
        Some(format!("$.{}", key)),
    ))
}

fn parse_metadata(id: &str, raw: &str) -> Result<Metadata> {
    serde_json::from_str(raw).with_context(|| format!("invalid metadata_json for {}", id))
}

#[async_trait]
impl EmbeddingIndex for SqliteIndex {
    async fn upsert(&self, id: &str, text: &str, metadata: &Metadata) -> Result<bool> {
        let vector = self.embed_one(text).await?;
        let metadata_json = serde_json::to_string(metadata)?;
        let chapter = metadata.get(keys::CHAPTER).cloned().unwrap_or_default();
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;

        let existed: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM versions WHERE collection = ? AND id = ?")
                .bind(&self.collection)
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;

        sqlx::query(
            r#"
            INSERT INTO versions (id, collection, chapter, content, metadata_json,
                                  embedding, model, dims, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(collection, id) DO UPDATE SET
                chapter = excluded.chapter,
                content = excluded.content,
                metadata_json = excluded.metadata_json,
                embedding = excluded.embedding,
                model = excluded.model,
                dims = excluded.dims,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(&self.collection)
        .bind(&chapter)
        .bind(text)
        .bind(&metadata_json)
        .bind(vec_to_blob(&vector))
        .bind(self.embedder.model_name())
        .bind(vector.len() as i64)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(existed)
    }

    async fn get(&self, id: &str) -> Result<Option<IndexRecord>> {
        let row = sqlx::query(
            "SELECT id, content, metadata_json FROM versions WHERE collection = ? AND id = ?",
        )
        .bind(&self.collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id: String = row.get("id");
        let raw: String = row.get("metadata_json");
        Ok(Some(IndexRecord {
            metadata: parse_metadata(&id, &raw)?,
            text: row.get("content"),
            id,
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

        let mut sql = String::from(
            "SELECT id, content, metadata_json, embedding FROM versions WHERE collection = ?",
        );
        let mut binds: Vec<String> = vec![self.collection.clone()];
        for (key, value) in filter.map(|f| f.conditions()).unwrap_or_default() {
            let (predicate, path) = condition_sql(key)?;
            sql.push_str(" AND ");
            sql.push_str(predicate);
            binds.extend(path);
            binds.push(value.clone());
        }

        let mut q = sqlx::query(&sql);
        for b in &binds {
            q = q.bind(b);
        }
        let rows = q.fetch_all(&self.pool).await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.get("id");
            let raw: String = row.get("metadata_json");
            let blob: Vec<u8> = row.get("embedding");
            let vector = blob_to_vec(&blob);
            if vector.len() != query_vec.len() {
                tracing::debug!(
                    version_id = %id,
                    stored_dims = vector.len(),
                    query_dims = query_vec.len(),
                    "embedding dimension mismatch"
                );
            }
            hits.push(IndexHit {
                metadata: parse_metadata(&id, &raw)?,
                text: row.get("content"),
                distance: cosine_distance(&query_vec, &vector),
                id,
            });
        }

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_sql() {
        assert_eq!(condition_sql("chapter").unwrap(), ("chapter = ?", None));
        let (sql, path) = condition_sql("status").unwrap();
        assert!(sql.contains("json_extract"));
        assert_eq!(path.as_deref(), Some("$.status"));
        assert!(condition_sql("bad\"key").is_err());
        assert!(condition_sql("").is_err());
    }
}
