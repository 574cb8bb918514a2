//! HTTP server for storing, retrieving, and ranking chapter versions.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/versions` | Store a chapter version, returns its id |
//! | `GET`  | `/versions/{id}` | Fetch a stored version |
//! | `POST` | `/search` | Ranked search |
//! | `POST` | `/feedback` | Report the result a user chose |
//! | `GET`  | `/weights` | Current ranking weights |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `storage_error` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use folio_core::models::{ChapterVersion, StoredVersion};
use folio_core::{RankingEngine, VersionStore, WeightVector};

use crate::app::App;
use crate::config::Config;
use crate::search::DEFAULT_PREVIEW_CHARS;

/// Shared state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<VersionStore>,
    pub engine: Arc<RankingEngine>,
    pub default_limit: usize,
}

impl AppState {
    pub fn new(app: &App, config: &Config) -> Self {
        Self {
            store: app.store.clone(),
            engine: app.engine.clone(),
            default_limit: config.ranking.default_limit,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/versions", post(handle_store))
        .route("/versions/{id}", get(handle_get))
        .route("/search", post(handle_search))
        .route("/feedback", post(handle_feedback))
        .route("/weights", get(handle_weights))
        .layer(cors)
        .with_state(state)
}

/// Bind to `[server].bind` and serve until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let app = App::open(config).await?;
    let state = AppState::new(&app, config);
    let bind_addr = config.server.bind.clone();

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "server listening");
    println!("Folio server listening on http://{}", bind_addr);

    axum::serve(listener, router(state)).await?;
    app.close().await;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn storage_error(err: folio_core::Error) -> AppError {
    tracing::error!(error = %err, "storage error");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "storage_error",
        message: err.to_string(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /versions ============

#[derive(Serialize)]
struct StoreResponse {
    version_id: String,
}

async fn handle_store(
    State(state): State<AppState>,
    Json(version): Json<ChapterVersion>,
) -> Result<Json<StoreResponse>, AppError> {
    if version.chapter_name.trim().is_empty() {
        return Err(bad_request("chapter_name must not be empty"));
    }
    if version.content.trim().is_empty() {
        return Err(bad_request("content must not be empty"));
    }

    let version_id = state
        .store
        .store_version(&version)
        .await
        .map_err(storage_error)?;
    Ok(Json(StoreResponse { version_id }))
}

// ============ GET /versions/{id} ============

async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StoredVersion>, AppError> {
    match state.store.get_version(&id).await {
        Ok(Some(v)) => Ok(Json(v)),
        Ok(None) => Err(not_found(format!("version not found: {}", id))),
        Err(e) => Err(storage_error(e)),
    }
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    chapter: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Serialize)]
struct SearchResultItem {
    version_id: String,
    score: f64,
    distance: f64,
    author: String,
    status: String,
    chapter: String,
    preview: String,
    content: String,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchResultItem>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let limit = req.limit.unwrap_or(state.default_limit);

    let results = state
        .engine
        .search(&req.query, req.chapter.as_deref(), limit)
        .await
        .into_iter()
        .map(|r| SearchResultItem {
            version_id: r.version_id.clone(),
            score: r.score,
            distance: r.distance,
            author: r.author().to_string(),
            status: r.status().to_string(),
            chapter: r.chapter().to_string(),
            preview: r.preview(DEFAULT_PREVIEW_CHARS),
            content: r.candidate.content,
        })
        .collect();

    Ok(Json(SearchResponse { results }))
}

// ============ POST /feedback ============

#[derive(Deserialize)]
struct FeedbackRequest {
    version_id: String,
}

#[derive(Serialize)]
struct FeedbackResponse {
    applied: bool,
    weights: WeightVector,
}

async fn handle_feedback(
    State(state): State<AppState>,
    Json(req): Json<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>, AppError> {
    if req.version_id.trim().is_empty() {
        return Err(bad_request("version_id must not be empty"));
    }
    let outcome = state.engine.update_weights_by_id(&req.version_id);
    Ok(Json(FeedbackResponse {
        applied: outcome.is_applied(),
        weights: state.engine.weights(),
    }))
}

// ============ GET /weights ============

async fn handle_weights(State(state): State<AppState>) -> Json<WeightVector> {
    Json(state.engine.weights())
}
