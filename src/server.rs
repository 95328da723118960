//! HTTP API server.
//!
//! Exposes embedding and similarity search over a JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Version and vector-store reachability |
//! | `POST` | `/embed` | Embed a root: `{"file_system_path": "..."}` |
//! | `POST` | `/qry` | Search a root: `{"file_system_path": "...", "qry": "...", "limit": 5}` |
//! | `GET`  | `/collections` | Collections in the vector store |
//! | `GET`  | `/files?file_system_path=...` | Files tracked for a root |
//! | `GET`  | `/stats` | Totals per tracked root |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "root_not_found", "message": "root not found or not a directory: /nope" } }
//! ```
//!
//! Error codes: `bad_request` (400), `root_not_found` (404),
//! `collection_not_found` (404), `upstream` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::admin::{self, CollectionSummary, FileListing, StatsReport};
use crate::error::IndexError;
use crate::models::QueryHit;
use crate::pipeline::EmbedReport;
use crate::progress::NoProgress;
use crate::runtime::Services;

/// Build the router. Exposed for tests and embedding in other servers.
pub fn router(services: Services) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/embed", post(handle_embed))
        .route("/qry", post(handle_query))
        .route("/collections", get(handle_collections))
        .route("/files", get(handle_files))
        .route("/stats", get(handle_stats))
        .layer(cors)
        .with_state(services)
}

/// Serve on an already-bound listener until the process is terminated.
pub async fn serve(listener: tokio::net::TcpListener, services: Services) -> anyhow::Result<()> {
    axum::serve(listener, router(services)).await?;
    Ok(())
}

/// Starts the HTTP server on `[server].bind`.
pub async fn run_server(services: Services) -> anyhow::Result<()> {
    let bind_addr = services.config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    println!("fsembed API listening on http://{}", bind_addr);
    tracing::info!(bind = %bind_addr, "server started");

    serve(listener, services).await
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

fn internal(err: anyhow::Error) -> AppError {
    tracing::error!(error = %format!("{:#}", err), "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: format!("{:#}", err),
    }
}

impl From<IndexError> for AppError {
    fn from(err: IndexError) -> Self {
        let status = match &err {
            IndexError::InvalidQuery(_) | IndexError::InvalidRoot { .. } => {
                StatusCode::BAD_REQUEST
            }
            IndexError::RootNotFound { .. } | IndexError::CollectionNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            IndexError::EmbeddingProvider(_) | IndexError::VectorStore(_) => {
                StatusCode::BAD_GATEWAY
            }
            IndexError::UnreadableFile { .. }
            | IndexError::FingerprintLoad { .. }
            | IndexError::FingerprintPersist { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Unwrap a JSON body, turning extractor rejections into `bad_request`.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(v)| v).map_err(|e| bad_request(e.body_text()))
}

fn require_path(path: &str) -> Result<(), AppError> {
    if path.trim().is_empty() {
        return Err(bad_request("file_system_path must not be empty"));
    }
    Ok(())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    vector_store: String,
}

/// Always 200; `vector_store` reports whether the store answers its heartbeat.
async fn handle_health(State(services): State<Services>) -> Json<HealthResponse> {
    let vector_store = match services.store.heartbeat().await {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            tracing::warn!(error = %format!("{:#}", e), "vector store heartbeat failed");
            "unreachable".to_string()
        }
    };
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        vector_store,
    })
}

// ============ POST /embed ============

/// Request body for `POST /embed`.
#[derive(Debug, Serialize, Deserialize)]
pub struct EmbedRequest {
    pub file_system_path: String,
}

async fn handle_embed(
    State(services): State<Services>,
    body: Result<Json<EmbedRequest>, JsonRejection>,
) -> Result<Json<EmbedReport>, AppError> {
    let req = json_body(body)?;
    require_path(&req.file_system_path)?;

    let report = services
        .pipeline
        .run(&req.file_system_path, &NoProgress)
        .await?;
    Ok(Json(report))
}

// ============ POST /qry ============

/// Request body for `POST /qry`.
#[derive(Debug, Serialize, Deserialize)]
pub struct QueryRequest {
    pub file_system_path: String,
    pub qry: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// One retrieved chunk in a `/qry` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDocument {
    pub id: String,
    pub source: String,
    pub page_content: String,
    pub score: f32,
}

impl From<QueryHit> for QueryDocument {
    fn from(hit: QueryHit) -> Self {
        QueryDocument {
            id: hit.id,
            source: hit.source,
            page_content: hit.document,
            score: hit.score,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryOutput {
    pub documents: Vec<QueryDocument>,
}

/// Response body for `POST /qry`.
#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub output: QueryOutput,
}

async fn handle_query(
    State(services): State<Services>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError> {
    let req = json_body(body)?;
    require_path(&req.file_system_path)?;

    let hits = services
        .query
        .search(&req.file_system_path, &req.qry, req.limit)
        .await?;

    Ok(Json(QueryResponse {
        output: QueryOutput {
            documents: hits.into_iter().map(QueryDocument::from).collect(),
        },
    }))
}

// ============ GET /collections ============

#[derive(Serialize)]
struct CollectionsResponse {
    collections: Vec<CollectionSummary>,
}

async fn handle_collections(
    State(services): State<Services>,
) -> Result<Json<CollectionsResponse>, AppError> {
    let collections = admin::collections(services.store.as_ref())
        .await
        .map_err(|e| IndexError::VectorStore(format!("{:#}", e)))?;
    Ok(Json(CollectionsResponse { collections }))
}

// ============ GET /files ============

#[derive(Deserialize)]
struct FilesParams {
    file_system_path: String,
}

async fn handle_files(
    State(services): State<Services>,
    Query(params): Query<FilesParams>,
) -> Result<Json<FileListing>, AppError> {
    require_path(&params.file_system_path)?;
    let listing = admin::files(&services.fingerprints, &params.file_system_path)
        .await
        .map_err(internal)?;
    Ok(Json(listing))
}

// ============ GET /stats ============

async fn handle_stats(State(services): State<Services>) -> Result<Json<StatsReport>, AppError> {
    let report = admin::stats(&services).await.map_err(internal)?;
    Ok(Json(report))
}
