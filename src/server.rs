//! JSON HTTP API over a shared [`Session`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Version and configured models |
//! | `GET`  | `/stats` | Chunk count and distinct sources |
//! | `GET`  | `/documents` | Documents ingested this session |
//! | `POST` | `/ingest` | Upload base64-encoded files |
//! | `POST` | `/ingest/text` | Add typed or pasted text |
//! | `POST` | `/query` | Ask a question |
//! | `POST` | `/reset` | Empty the knowledge base |
//!
//! # Error Contract
//!
//! `/query` always answers `200`; problems are carried by its `outcome`
//! field. Malformed requests anywhere get:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must be a string" } }
//! ```
//!
//! An `/ingest` entry whose content is not valid base64 is listed under
//! `skipped` like any other unreadable file.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! front ends.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use docqa_core::index::ClearOutcome;
use docqa_core::models::{
    DocumentRecord, FileType, IngestFile, IngestReport, QueryOutcome, QueryResult, SkippedFile,
    EXCERPT_CHARS,
};

use crate::session::Session;

/// Request body cap; base64 inflates uploads by a third.
const MAX_BODY_BYTES: usize = 128 * 1024 * 1024;

/// Build the router. Exposed separately from [`run_server`] so tests can
/// serve it on an ephemeral port.
pub fn router(session: Arc<Session>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/stats", get(handle_stats))
        .route("/documents", get(handle_documents))
        .route("/ingest", post(handle_ingest))
        .route("/ingest/text", post(handle_ingest_text))
        .route("/query", post(handle_query))
        .route("/reset", post(handle_reset))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(session)
}

/// Serve the API on `bind` until the process is terminated.
pub async fn run_server(session: Arc<Session>, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "server listening");
    axum::serve(listener, router(session)).await?;
    Ok(())
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
    message: String,
}

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

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    embedding_model: String,
    /// `null` when questions cannot be answered (no credentials).
    generation_model: Option<String>,
}

async fn handle_health(State(session): State<Arc<Session>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        embedding_model: session.embedding_model().to_string(),
        generation_model: session.generation_model().map(str::to_string),
    })
}

// ============ GET /stats, GET /documents ============

#[derive(Serialize)]
struct StatsResponse {
    total_chunks: usize,
    distinct_sources: BTreeSet<String>,
}

async fn handle_stats(State(session): State<Arc<Session>>) -> Json<StatsResponse> {
    let stats = session.stats().await;
    Json(StatsResponse {
        total_chunks: stats.total_chunks,
        distinct_sources: stats.distinct_sources,
    })
}

#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<DocumentRecord>,
}

async fn handle_documents(State(session): State<Arc<Session>>) -> Json<DocumentsResponse> {
    Json(DocumentsResponse {
        documents: session.documents().await,
    })
}

// ============ POST /ingest ============

#[derive(Deserialize)]
struct IngestRequest {
    files: Vec<UploadedFile>,
    /// Skip files whose name was already ingested this session.
    #[serde(default)]
    skip_existing: bool,
}

#[derive(Deserialize)]
struct UploadedFile {
    name: String,
    /// Declared type; defaults to the name's extension.
    #[serde(default)]
    file_type: Option<String>,
    content_base64: String,
}

async fn handle_ingest(
    State(session): State<Arc<Session>>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<IngestReport>, AppError> {
    let Json(request) = payload?;
    if request.files.is_empty() {
        return Err(bad_request("files must not be empty"));
    }

    let mut uploads = Vec::with_capacity(request.files.len());
    let mut undecodable = Vec::new();
    for file in request.files {
        match base64::engine::general_purpose::STANDARD.decode(file.content_base64.as_bytes()) {
            Ok(bytes) => uploads.push(match file.file_type {
                Some(declared) => IngestFile::new(bytes, file.name, declared),
                None => IngestFile::from_name(bytes, file.name),
            }),
            Err(e) => undecodable.push(SkippedFile {
                name: file.name,
                reason: format!("invalid base64 content: {}", e),
            }),
        }
    }

    let mut report = if request.skip_existing {
        session.ingest_new(&uploads).await
    } else {
        session.ingest(&uploads).await
    };
    report.skipped.extend(undecodable);
    Ok(Json(report))
}

// ============ POST /ingest/text ============

#[derive(Deserialize)]
struct IngestTextRequest {
    name: String,
    text: String,
}

#[derive(Serialize)]
struct IngestTextResponse {
    ingested: bool,
}

async fn handle_ingest_text(
    State(session): State<Arc<Session>>,
    payload: Result<Json<IngestTextRequest>, JsonRejection>,
) -> Result<Json<IngestTextResponse>, AppError> {
    let Json(request) = payload?;
    if request.name.trim().is_empty() {
        return Err(bad_request("name must not be empty"));
    }
    let ingested = session.ingest_text(&request.text, request.name.trim()).await;
    Ok(Json(IngestTextResponse { ingested }))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
}

#[derive(Serialize)]
struct QueryResponse {
    answer: String,
    outcome: QueryOutcome,
    cited_chunks: Vec<CitedChunk>,
}

#[derive(Serialize)]
struct CitedChunk {
    source_name: String,
    file_type: FileType,
    text_excerpt: String,
}

impl From<QueryResult> for QueryResponse {
    fn from(result: QueryResult) -> Self {
        let cited_chunks = result
            .cited_chunks
            .iter()
            .map(|c| CitedChunk {
                source_name: c.source_name.clone(),
                file_type: c.file_type,
                text_excerpt: c.excerpt(EXCERPT_CHARS),
            })
            .collect();
        Self {
            answer: result.answer,
            outcome: result.outcome,
            cited_chunks,
        }
    }
}

async fn handle_query(
    State(session): State<Arc<Session>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError> {
    let Json(request) = payload?;
    Ok(Json(session.query(&request.question).await.into()))
}

// ============ POST /reset ============

#[derive(Serialize)]
struct ResetResponse {
    /// `"cleared"` or `"rebuilt"`.
    outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

async fn handle_reset(State(session): State<Arc<Session>>) -> Result<Json<ResetResponse>, AppError> {
    let outcome = session
        .reset()
        .await
        .map_err(|e| internal(e.to_string()))?;
    let response = match outcome {
        ClearOutcome::Cleared => ResetResponse {
            outcome: "cleared".to_string(),
            location: None,
            reason: None,
        },
        ClearOutcome::Rebuilt { location, reason } => ResetResponse {
            outcome: "rebuilt".to_string(),
            location: Some(location),
            reason: Some(reason),
        },
    };
    Ok(Json(response))
}
