//! # Folio
//!
//! A content-addressed store for chapter revisions with adaptive,
//! feedback-driven ranking.
//!
//! Every stored revision is keyed by its chapter and a hash of its text, so
//! re-storing identical text updates one record. Searches re-rank
//! nearest-neighbour hits with a learned weight vector, and feedback about
//! which result was chosen nudges those weights.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ CLI/HTTP │──▶│ RankingEngine│──▶│ VersionStore │──▶│ SqliteIndex │
//! └──────────┘   └──────────────┘   └──────────────┘   └──────┬──────┘
//!                                                              ▼
//!                                                         ┌──────────┐
//!                                                         │ Embedder │
//!                                                         └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! folio init
//! folio store chapter-1 --file ch1.txt --status scraped
//! folio search "storm at sea" --chapter chapter-1
//! folio serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_index`] | SQLite-backed embedding index |
//! | [`embedding`] | Embedder selection and implementations |
//! | [`app`] | Wiring config into a ranking engine |
//! | [`server`] | HTTP server |

pub mod app;
pub mod config;
pub mod db;
pub mod embedding;
pub mod get;
pub mod logging;
pub mod migrate;
pub mod search;
pub mod server;
pub mod sqlite_index;
pub mod store_cmd;
