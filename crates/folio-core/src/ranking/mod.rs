//! Adaptive multi-factor ranking over version search results.
//!
//! A search over-fetches [`OVERFETCH_FACTOR`]` × limit` candidates from the
//! [`VersionStore`], scores each one against a snapshot of the current
//! [`WeightVector`], stable-sorts descending (equal scores keep their
//! distance order), truncates, and records the session in a bounded
//! [`SessionHistory`].
//!
//! Feedback ([`RankingEngine::update_weights`]) finds the session that
//! showed the chosen version, marks it selected, and nudges each weight by
//! `learning_rate × feature` before renormalizing.
//!
//! # Locking
//!
//! The weight vector and the history each sit behind their own
//! `std::sync::Mutex`. Neither lock is held across an `.await`, and no code
//! path holds both at once.

pub mod history;
pub mod scoring;
pub mod weights;

use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::models::SearchCandidate;
use crate::version_store::VersionStore;

pub use history::SessionHistory;
pub use scoring::{Features, Signals};
pub use weights::WeightVector;

/// Candidates fetched per requested result.
pub const OVERFETCH_FACTOR: usize = 2;

pub const DEFAULT_LEARNING_RATE: f64 = 0.01;
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;
pub const DEFAULT_TRUSTED_AUTHOR: &str = "human_editor";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingConfig {
    pub learning_rate: f64,
    pub history_capacity: usize,
    /// Author whose versions get the multiplicative trust factor.
    pub trusted_author: String,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            trusted_author: DEFAULT_TRUSTED_AUTHOR.to_string(),
        }
    }
}

/// A candidate with its re-ranked score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    #[serde(flatten)]
    pub candidate: SearchCandidate,
    pub score: f64,
}

impl Deref for RankedResult {
    type Target = SearchCandidate;

    fn deref(&self) -> &SearchCandidate {
        &self.candidate
    }
}

/// One recorded search.
#[derive(Debug, Clone)]
pub struct RankingSession {
    pub query_text: String,
    pub chapter_filter: Option<String>,
    pub ranked_results: Vec<RankedResult>,
    /// Set at most once, by feedback.
    pub selected_result: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RankingSession {
    fn find(&self, version_id: &str) -> Option<&RankedResult> {
        self.ranked_results
            .iter()
            .find(|r| r.version_id == version_id)
    }

    fn accepts_feedback_for(&self, version_id: &str) -> bool {
        self.selected_result.is_none() && self.find(version_id).is_some()
    }
}

/// What a feedback call did. Callers are free to ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FeedbackOutcome {
    Applied { weights: WeightVector },
    SessionNotFound,
}

impl FeedbackOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, FeedbackOutcome::Applied { .. })
    }
}

pub struct RankingEngine {
    store: Arc<VersionStore>,
    weights: Mutex<WeightVector>,
    history: Mutex<SessionHistory<RankingSession>>,
    learning_rate: f64,
    trusted_author: String,
}

impl RankingEngine {
    /// Build an engine with the initial weight priors and an empty history.
    ///
    /// Fails with [`Error::InvalidConfig`] for a zero history capacity or a
    /// negative / non-finite learning rate.
    pub fn new(store: Arc<VersionStore>, config: RankingConfig) -> Result<Self> {
        if !config.learning_rate.is_finite() || config.learning_rate < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "learning_rate must be a non-negative number, got {}",
                config.learning_rate
            )));
        }
        let history = SessionHistory::with_capacity(config.history_capacity)?;

        Ok(Self {
            store,
            weights: Mutex::new(WeightVector::initial()),
            history: Mutex::new(history),
            learning_rate: config.learning_rate,
            trusted_author: config.trusted_author,
        })
    }

    /// Snapshot of the current weights.
    pub fn weights(&self) -> WeightVector {
        *self.weights.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn history_len(&self) -> usize {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn history_capacity(&self) -> usize {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .capacity()
    }

    /// Most recent sessions first, up to `n`.
    pub fn recent_sessions(&self, n: usize) -> Vec<RankingSession> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter_newest_first()
            .take(n)
            .cloned()
            .collect()
    }

    /// Ranked search that reports index faults.
    ///
    /// An empty fetch returns an empty list and records no session.
    pub async fn try_search(
        &self,
        query_text: &str,
        chapter_filter: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RankedResult>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let candidates = self
            .store
            .try_search_versions(
                query_text,
                chapter_filter,
                limit.saturating_mul(OVERFETCH_FACTOR),
            )
            .await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let weights = self.weights();
        let now = Utc::now();
        let mut ranked: Vec<RankedResult> = candidates
            .into_iter()
            .map(|candidate| {
                let score =
                    scoring::score_candidate(&candidate, &weights, &self.trusted_author, now);
                RankedResult { candidate, score }
            })
            .collect();

        // sort_by is stable: equal scores keep ascending-distance order
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(limit);

        debug!(
            query = %query_text,
            results = ranked.len(),
            top_score = ranked.first().map(|r| r.score),
            "ranked search"
        );

        let session = RankingSession {
            query_text: query_text.to_string(),
            chapter_filter: chapter_filter.map(str::to_string),
            ranked_results: ranked.clone(),
            selected_result: None,
            created_at: now,
        };
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(session);

        Ok(ranked)
    }

    /// Ranked search for callers that treat "no results" as a normal
    /// outcome. Faults are logged and yield an empty list.
    pub async fn search(
        &self,
        query_text: &str,
        chapter_filter: Option<&str>,
        limit: usize,
    ) -> Vec<RankedResult> {
        match self.try_search(query_text, chapter_filter, limit).await {
            Ok(results) => results,
            Err(e) => {
                error!(
                    error = %e,
                    query = %query_text,
                    "ranked search degraded to empty result"
                );
                Vec::new()
            }
        }
    }

    /// Record that `selected` was chosen and adapt the weights.
    ///
    /// Matches the newest session that showed this version and has no
    /// selection yet. No match (never shown, already selected, or evicted)
    /// is logged and leaves the weights untouched.
    pub fn update_weights(&self, selected: &SearchCandidate) -> FeedbackOutcome {
        if self.mark_selected(&selected.version_id).is_none() {
            return FeedbackOutcome::SessionNotFound;
        }
        self.apply(selected)
    }

    /// Feedback by id, using the candidate as it was shown in the session.
    pub fn update_weights_by_id(&self, version_id: &str) -> FeedbackOutcome {
        match self.mark_selected(version_id) {
            Some(shown) => self.apply(&shown),
            None => FeedbackOutcome::SessionNotFound,
        }
    }

    fn mark_selected(&self, version_id: &str) -> Option<SearchCandidate> {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(session) = history.find_newest_mut(|s| s.accepts_feedback_for(version_id))
        else {
            info!(
                version_id = %version_id,
                "feedback for a version not in any open session, ignoring"
            );
            return None;
        };
        session.selected_result = Some(version_id.to_string());
        session.find(version_id).map(|r| r.candidate.clone())
    }

    fn apply(&self, selected: &SearchCandidate) -> FeedbackOutcome {
        let features = match Signals::extract(selected, &self.trusted_author, Utc::now()) {
            Ok(signals) => signals.features(),
            Err(reason) => {
                warn!(
                    version_id = %selected.version_id,
                    %reason,
                    "malformed feedback candidate, using similarity feature only"
                );
                Features::similarity_only(selected.distance)
            }
        };

        let mut weights = self.weights.lock().unwrap_or_else(PoisonError::into_inner);
        weights.apply_feedback(&features, self.learning_rate);
        let updated = *weights;
        drop(weights);

        info!(
            version_id = %selected.version_id,
            content_relevance = updated.content_relevance,
            version_recency = updated.version_recency,
            human_rating = updated.human_rating,
            author_trust = updated.author_trust,
            "weights updated from feedback"
        );
        FeedbackOutcome::Applied { weights: updated }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{EmbeddingIndex, IndexHit, IndexRecord, MetadataFilter};
    use crate::models::{format_timestamp, keys, Metadata};
    use crate::version_store::tests::FailingIndex;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Index that answers each query text with preset hits, in the order given.
    #[derive(Default)]
    struct StubIndex {
        answers: HashMap<String, Vec<IndexHit>>,
        last_limit: AtomicUsize,
        last_filter: Mutex<Option<MetadataFilter>>,
    }

    impl StubIndex {
        fn answer(mut self, query: &str, hits: Vec<IndexHit>) -> Self {
            self.answers.insert(query.to_string(), hits);
            self
        }
    }

    #[async_trait]
    impl EmbeddingIndex for StubIndex {
        async fn upsert(&self, _: &str, _: &str, _: &Metadata) -> anyhow::Result<bool> {
            Ok(false)
        }
        async fn get(&self, _: &str) -> anyhow::Result<Option<IndexRecord>> {
            Ok(None)
        }
        async fn query(
            &self,
            text: &str,
            filter: Option<&MetadataFilter>,
            limit: usize,
        ) -> anyhow::Result<Vec<IndexHit>> {
            self.last_limit.store(limit, Ordering::SeqCst);
            *self.last_filter.lock().unwrap() = filter.cloned();
            let mut hits: Vec<IndexHit> = self
                .answers
                .get(text)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|h| filter.map_or(true, |f| f.matches(&h.metadata)))
                .collect();
            hits.truncate(limit);
            Ok(hits)
        }
    }

    fn hit(id: &str, distance: f64, fields: &[(&str, &str)]) -> IndexHit {
        let mut metadata: Metadata = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        metadata
            .entry(keys::CHAPTER.to_string())
            .or_insert_with(|| "ch1".to_string());
        IndexHit {
            id: id.to_string(),
            text: format!("content of {}", id),
            metadata,
            distance,
        }
    }

    fn engine_over(index: Arc<StubIndex>, capacity: usize) -> RankingEngine {
        let store = Arc::new(VersionStore::new(index));
        RankingEngine::new(
            store,
            RankingConfig {
                history_capacity: capacity,
                ..RankingConfig::default()
            },
        )
        .unwrap()
    }

    fn ids(results: &[RankedResult]) -> Vec<&str> {
        results.iter().map(|r| r.version_id.as_str()).collect()
    }

    #[test]
    fn test_engine_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RankingEngine>();
    }

    #[test]
    fn test_invalid_config() {
        let store = Arc::new(VersionStore::new(Arc::new(StubIndex::default())));
        let zero = RankingConfig {
            history_capacity: 0,
            ..RankingConfig::default()
        };
        assert!(matches!(
            RankingEngine::new(store.clone(), zero),
            Err(Error::InvalidConfig(_))
        ));
        let negative = RankingConfig {
            learning_rate: -0.1,
            ..RankingConfig::default()
        };
        assert!(matches!(
            RankingEngine::new(store, negative),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_basic_search_overfetches_and_truncates() {
        let index = Arc::new(StubIndex::default().answer(
            "storm",
            vec![hit("v1", 0.1, &[]), hit("v2", 0.4, &[]), hit("v3", 0.7, &[])],
        ));
        let engine = engine_over(index.clone(), 10);

        let results = engine.search("storm", None, 2).await;
        assert_eq!(ids(&results), vec!["v1", "v2"]);
        assert!(results[0].score > results[1].score);
        assert_eq!(index.last_limit.load(Ordering::SeqCst), 4);
        assert_eq!(engine.history_len(), 1);
    }

    #[tokio::test]
    async fn test_ties_keep_distance_order() {
        let index = Arc::new(StubIndex::default().answer(
            "q",
            vec![
                hit("first", 0.3, &[]),
                hit("second", 0.3, &[]),
                hit("third", 0.3, &[]),
            ],
        ));
        let engine = engine_over(index, 10);

        let results = engine.search("q", None, 3).await;
        assert_eq!(ids(&results), vec!["first", "second", "third"]);
        assert_eq!(results[0].score, results[2].score);
    }

    #[tokio::test]
    async fn test_recency_boost() {
        let now = Utc::now();
        let old = format_timestamp(now - chrono::Duration::days(400));
        let fresh = format_timestamp(now);
        let index = Arc::new(StubIndex::default().answer(
            "q",
            vec![
                hit("old", 0.2, &[(keys::TIMESTAMP, old.as_str())]),
                hit("new", 0.2, &[(keys::TIMESTAMP, fresh.as_str())]),
            ],
        ));
        let engine = engine_over(index, 10);

        let results = engine.search("q", None, 2).await;
        assert_eq!(ids(&results), vec!["new", "old"]);
        let base = 0.8 * engine.weights().content_relevance;
        assert!((results[1].score - base).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_chapter_filter_reaches_index() {
        let index = Arc::new(StubIndex::default().answer(
            "q",
            vec![
                hit("a", 0.1, &[(keys::CHAPTER, "ch2")]),
                hit("b", 0.2, &[(keys::CHAPTER, "ch1")]),
            ],
        ));
        let engine = engine_over(index.clone(), 10);

        let results = engine.search("q", Some("ch1"), 5).await;
        assert_eq!(ids(&results), vec!["b"]);
        assert_eq!(
            index.last_filter.lock().unwrap().clone(),
            Some(MetadataFilter::eq(keys::CHAPTER, "ch1"))
        );
        assert_eq!(
            engine.recent_sessions(1)[0].chapter_filter.as_deref(),
            Some("ch1")
        );
    }

    #[tokio::test]
    async fn test_feedback_loop() {
        let now = format_timestamp(Utc::now());
        let index = Arc::new(StubIndex::default().answer(
            "q",
            vec![
                hit("v1", 0.05, &[(keys::TIMESTAMP, now.as_str())]),
                hit("v2", 0.08, &[(keys::TIMESTAMP, now.as_str())]),
            ],
        ));
        let engine = engine_over(index, 10);

        let results = engine.search("q", None, 2).await;
        let before = engine.weights();
        let outcome = engine.update_weights(&results[1]);
        let after = engine.weights();

        assert!(outcome.is_applied());
        assert!(after.content_relevance > before.content_relevance);
        assert!((after.sum() - 1.0).abs() < 1e-9);
        assert_eq!(
            engine.recent_sessions(1)[0].selected_result.as_deref(),
            Some(results[1].version_id.as_str())
        );

        // a session accepts one selection
        assert_eq!(
            engine.update_weights(&results[0]),
            FeedbackOutcome::SessionNotFound
        );
        assert_eq!(engine.weights(), after);
    }

    #[tokio::test]
    async fn test_feedback_by_id_uses_shown_candidate() {
        let index = Arc::new(StubIndex::default().answer("q", vec![hit("v1", 0.1, &[])]));
        let engine = engine_over(index, 10);
        engine.search("q", None, 1).await;

        assert!(engine.update_weights_by_id("v1").is_applied());
        assert!(!engine.update_weights_by_id("v1").is_applied());
        assert!(!engine.update_weights_by_id("unknown").is_applied());
    }

    #[tokio::test]
    async fn test_feedback_with_malformed_metadata_uses_similarity_only() {
        let now = format_timestamp(Utc::now());
        let index = Arc::new(StubIndex::default().answer(
            "q",
            vec![hit("v1", 0.2, &[(keys::TIMESTAMP, now.as_str())])],
        ));
        let engine = engine_over(index, 10);

        let malformed = [
            (keys::TIMESTAMP, "yesterday-ish"),
            (keys::HUMAN_RATING, "5 stars"),
        ];
        for (key, garbage) in malformed {
            let results = engine.search("q", None, 1).await;
            let mut selected = results[0].candidate.clone();
            selected.metadata.insert(key.to_string(), garbage.to_string());

            let before = engine.weights();
            let outcome = engine.update_weights(&selected);
            let after = engine.weights();

            assert!(outcome.is_applied(), "{} = {:?} was not applied", key, garbage);
            let mut expected = before;
            expected.apply_feedback(
                &Features::similarity_only(selected.distance),
                DEFAULT_LEARNING_RATE,
            );
            assert_eq!(after, expected);
            assert!(after.content_relevance > before.content_relevance);
            // recency got no increment, so renormalization shrinks it
            assert!(after.version_recency < before.version_recency);
            assert!((after.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_feedback_for_evicted_session_is_noop() {
        let index = Arc::new(
            StubIndex::default()
                .answer("first", vec![hit("early", 0.1, &[])])
                .answer("second", vec![hit("b", 0.1, &[])])
                .answer("third", vec![hit("c", 0.1, &[])]),
        );
        let engine = engine_over(index, 2);

        let early = engine.search("first", None, 1).await;
        engine.search("second", None, 1).await;
        engine.search("third", None, 1).await;
        assert_eq!(engine.history_len(), 2);
        assert_eq!(engine.history_capacity(), 2);

        let before = engine.weights();
        assert_eq!(
            engine.update_weights(&early[0]),
            FeedbackOutcome::SessionNotFound
        );
        assert_eq!(engine.weights(), before);
    }

    #[tokio::test]
    async fn test_empty_and_failed_fetch_record_nothing() {
        let engine = engine_over(Arc::new(StubIndex::default()), 10);
        assert!(engine.search("nothing", None, 5).await.is_empty());
        assert!(engine.search("nothing", None, 0).await.is_empty());
        assert_eq!(engine.history_len(), 0);

        let store = Arc::new(VersionStore::new(Arc::new(FailingIndex)));
        let failing = RankingEngine::new(store, RankingConfig::default()).unwrap();
        assert!(failing.search("q", None, 5).await.is_empty());
        assert!(matches!(
            failing.try_search("q", None, 5).await,
            Err(Error::Storage(_))
        ));
        assert_eq!(failing.history_len(), 0);
    }

    #[tokio::test]
    async fn test_engines_have_independent_weights() {
        let index = Arc::new(StubIndex::default().answer("q", vec![hit("v1", 0.1, &[])]));
        let a = engine_over(index.clone(), 10);
        let b = engine_over(index, 10);

        let results = a.search("q", None, 1).await;
        b.search("q", None, 1).await;
        assert!(a.update_weights(&results[0]).is_applied());

        assert_ne!(a.weights(), b.weights());
        assert_eq!(b.weights(), WeightVector::initial());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_search_and_feedback_stay_normalized() {
        let index = Arc::new(StubIndex::default().answer(
            "q",
            vec![hit("v1", 0.1, &[]), hit("v2", 0.2, &[(keys::AUTHOR, "human_editor")])],
        ));
        let engine = Arc::new(engine_over(index, 16));

        let mut tasks = Vec::new();
        for i in 0..32 {
            let engine = engine.clone();
            tasks.push(tokio::spawn(async move {
                let results = engine.search("q", None, 2).await;
                engine.update_weights(&results[i % 2]);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let w = engine.weights();
        assert!((w.sum() - 1.0).abs() < 1e-9);
        assert!(engine.history_len() <= 16);
    }
}
