//! Content-addressed chapter version store.
//!
//! Every revision is keyed by `chapter + "_" + content_hash`, so storing the
//! same text for the same chapter twice updates one record instead of
//! creating a second.
//!
//! Two read surfaces exist for search: [`VersionStore::try_search_versions`]
//! returns the fault to the caller, while [`VersionStore::search_versions`]
//! logs it and degrades to an empty list.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::index::{EmbeddingIndex, MetadataFilter};
use crate::models::{keys, ChapterVersion, SearchCandidate, StoredVersion};

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct VersionStore {
    index: Arc<dyn EmbeddingIndex>,
    query_timeout: Duration,
}

impl VersionStore {
    pub fn new(index: Arc<dyn EmbeddingIndex>) -> Self {
        Self {
            index,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Bound on each read against the index.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Upsert a version and return its id.
    ///
    /// A missing timestamp is filled with the current time. Index failures
    /// are returned as [`Error::Storage`]; nothing is retried here.
    pub async fn store_version(&self, version: &ChapterVersion) -> Result<String> {
        let id = version.version_id();
        let metadata = version.to_metadata(Utc::now());

        let replaced = self
            .index
            .upsert(&id, &version.content, &metadata)
            .await
            .map_err(Error::storage)?;

        if replaced {
            debug!(version_id = %id, "version already existed, metadata updated");
        }
        info!(
            version_id = %id,
            chapter = %version.chapter_name,
            status = %version.status,
            "stored version"
        );
        Ok(id)
    }

    /// Look up a version by id. `Ok(None)` when no such version exists.
    pub async fn get_version(&self, version_id: &str) -> Result<Option<StoredVersion>> {
        let record = tokio::time::timeout(self.query_timeout, self.index.get(version_id))
            .await
            .map_err(|_| Error::Timeout(self.query_timeout))?
            .map_err(Error::storage)?;

        match record {
            Some(r) => StoredVersion::from_metadata(&r.id, r.text, &r.metadata).map(Some),
            None => Ok(None),
        }
    }

    /// Nearest versions to `query_text`, ascending by distance.
    ///
    /// The chapter filter is evaluated by the index. `limit == 0` returns an
    /// empty list without touching the index.
    pub async fn try_search_versions(
        &self,
        query_text: &str,
        chapter_filter: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchCandidate>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let filter = chapter_filter.map(|c| MetadataFilter::eq(keys::CHAPTER, c));
        let hits = tokio::time::timeout(
            self.query_timeout,
            self.index.query(query_text, filter.as_ref(), limit),
        )
        .await
        .map_err(|_| Error::Timeout(self.query_timeout))?
        .map_err(Error::storage)?;

        Ok(hits
            .into_iter()
            .map(|hit| SearchCandidate {
                version_id: hit.id,
                content: hit.text,
                metadata: hit.metadata,
                distance: hit.distance,
            })
            .collect())
    }

    /// Like [`try_search_versions`](Self::try_search_versions), but a fault
    /// is logged and an empty list returned.
    pub async fn search_versions(
        &self,
        query_text: &str,
        chapter_filter: Option<&str>,
        limit: usize,
    ) -> Vec<SearchCandidate> {
        match self
            .try_search_versions(query_text, chapter_filter, limit)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, query = %query_text, "version search degraded to empty result");
                Vec::new()
            }
        }
    }
}
