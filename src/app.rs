//! Wiring from configuration to a ready [`RankingEngine`].

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use folio_core::{RankingEngine, VersionStore};

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::sqlite_index::SqliteIndex;

/// Everything a command or the server needs, built once per process.
pub struct App {
    pub pool: SqlitePool,
    pub store: Arc<VersionStore>,
    pub engine: Arc<RankingEngine>,
}

impl App {
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        Self::with_pool(config, pool)
    }

    /// Build on an existing pool. The schema must already exist.
    pub fn with_pool(config: &Config, pool: SqlitePool) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        tracing::debug!(
            provider = %config.embedding.provider,
            model = embedder.model_name(),
            dims = embedder.dims(),
            collection = %config.store.collection,
            "opening version store"
        );

        let index = Arc::new(SqliteIndex::new(
            pool.clone(),
            config.store.collection.clone(),
            embedder,
        ));
        let store = Arc::new(
            VersionStore::new(index).with_query_timeout(config.store.query_timeout()),
        );
        let engine = RankingEngine::new(store.clone(), config.ranking.to_core())
            .context("Invalid ranking configuration")?;

        Ok(Self {
            pool,
            store,
            engine: Arc::new(engine),
        })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
