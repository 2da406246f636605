//! JSON HTTP API over the ingestion and retrieval pipelines.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/documents/ingest` | (Re)ingest one document |
//! | `GET`  | `/search?q=...` | Semantic search over ingested documents |
//! | `GET`  | `/blobs/{path}?expires&token` | Serve a blob for a valid signed URL |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Ingestion failures carry the concrete cause in `message` (the caller is
//! a trusted internal subsystem). Search failures return only a generic
//! message; the cause is logged server-side.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! search clients.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::blob::LocalBlobStore;
use crate::config::Config;
use crate::embedding;
use crate::error::{ExtractError, IngestError, SearchError};
use crate::extract::DefaultExtractor;
use crate::ingest::{IngestOptions, IngestRequest, IngestionPipeline};
use crate::models::SearchResult;
use crate::search::SearchPipeline;
use crate::store::sqlite::SqliteChunkStore;
use crate::tokenize;
use crate::{db, migrate};

/// Shared application state passed to all route handlers via Axum's
/// `State` extractor.
#[derive(Clone)]
struct AppState {
    ingest: Arc<IngestionPipeline>,
    search: Arc<SearchPipeline>,
    blobs: Arc<LocalBlobStore>,
}

/// Starts the HTTP server.
///
/// Binds to the address configured in `[server].bind` and runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    migrate::run_migrations(config).await?;

    if !config.embedding.is_enabled() {
        warn!("embedding provider is disabled; ingest and search requests will fail");
    }

    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteChunkStore::new(pool));
    let blobs = Arc::new(LocalBlobStore::new(&config.blob));
    let embedder = embedding::create_provider(&config.embedding)?;

    let ingest = Arc::new(IngestionPipeline::new(
        blobs.clone(),
        store.clone(),
        embedder.clone(),
        tokenize::create_tokenizer(&config.chunking)?,
        Arc::new(DefaultExtractor),
        IngestOptions::from_config(config),
    ));
    let search = Arc::new(SearchPipeline::new(
        store,
        blobs.clone(),
        embedder,
        config.retrieval.clone(),
    ));

    let app = build_router(AppState {
        ingest,
        search,
        blobs,
    });

    let bind_addr = config.server.bind.clone();
    info!("listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/documents/ingest", post(handle_ingest))
        .route("/search", get(handle_search))
        .route("/blobs/{*path}", get(handle_blob))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Maps pipeline errors onto the HTTP contract: invalid request fields are
/// 400, an unsupported mime type is 415, every downstream failure is a 500
/// with the concrete cause in the message.
fn classify_ingest_error(err: IngestError) -> AppError {
    match err {
        IngestError::InvalidRequest(msg) => bad_request(msg),
        IngestError::Extract(ExtractError::UnsupportedMimeType(mime)) => AppError {
            status: StatusCode::UNSUPPORTED_MEDIA_TYPE,
            code: "unsupported_media_type".to_string(),
            message: format!("unsupported mime type: {mime}"),
        },
        other => internal(other.to_string()),
    }
}

// ============ POST /documents/ingest ============

#[derive(Serialize)]
struct IngestResponse {
    ok: bool,
    chunks: usize,
}

/// Handler for `POST /documents/ingest`.
///
/// Body deserialization failures (missing fields, malformed JSON, wrong
/// content type) are client errors; 415 is reserved for an unsupported
/// document mime type.
async fn handle_ingest(
    State(state): State<AppState>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<IngestResponse>, AppError> {
    let Json(req) = payload.map_err(|rejection| bad_request(rejection.body_text()))?;
    let report = state
        .ingest
        .run(&req)
        .await
        .map_err(classify_ingest_error)?;
    Ok(Json(IngestResponse {
        ok: true,
        chunks: report.chunks,
    }))
}

// ============ GET /search ============

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

#[derive(Serialize)]
struct SearchResponse {
    query: String,
    results: Vec<SearchResult>,
}

/// Handler for `GET /search?q=...`.
///
/// Downstream failures are logged with their cause but surface to the
/// client as a generic message.
async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, AppError> {
    let query = params.q.trim().to_string();
    if query.is_empty() {
        return Err(bad_request("query parameter q must not be empty"));
    }

    let results = state.search.run(&query).await.map_err(|err| match err {
        SearchError::EmptyQuery => bad_request("query parameter q must not be empty"),
        other => {
            error!(error = %other, "search failed");
            internal("search failed")
        }
    })?;

    Ok(Json(SearchResponse { query, results }))
}

// ============ GET /blobs/{path} ============

#[derive(Deserialize)]
struct BlobQuery {
    expires: i64,
    token: String,
}

/// Handler for `GET /blobs/{path}`.
///
/// Serves blob bytes only when the request carries a valid, unexpired
/// signature produced by [`LocalBlobStore::create_signed_url`].
async fn handle_blob(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(params): Query<BlobQuery>,
) -> Result<Response, AppError> {
    if !state.blobs.verify_token(&path, params.expires, &params.token) {
        return Err(AppError {
            status: StatusCode::FORBIDDEN,
            code: "forbidden".to_string(),
            message: "invalid or expired signature".to_string(),
        });
    }

    let bytes = state
        .blobs
        .read_verified(&path, params.expires, &params.token)
        .await
        .map_err(|e| internal(e.to_string()))?;

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    )
        .into_response())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Handler for `GET /health`.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
