//! # Folio Core
//!
//! Shared logic for Folio: chapter version records, content addressing,
//! the embedding index abstraction, the version store, and the adaptive
//! ranking engine.
//!
//! This crate contains no sqlx, HTTP, or filesystem I/O. The only runtime
//! dependency is `tokio::time`, used to bound index queries.
//!
//! ```text
//! caller ──search──▶ RankingEngine ──2×limit──▶ VersionStore ──query──▶ EmbeddingIndex
//!    │                    │  score / sort / truncate
//!    │                    ▼
//!    └──feedback──▶ SessionHistory ──features──▶ WeightVector
//! ```

pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod ranking;
pub mod version_store;

pub use error::{Error, Result};
pub use models::{ChapterVersion, SearchCandidate, StoredVersion, VersionStatus};
pub use ranking::{FeedbackOutcome, RankedResult, RankingConfig, RankingEngine, WeightVector};
pub use version_store::VersionStore;
