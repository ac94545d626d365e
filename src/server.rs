//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Liveness check, returns `{"Hello": "World"}` |
//! | `GET`  | `/get_query?query_id=` | Fetch a query record |
//! | `POST` | `/submit_query` | Submit `{"query_text": "..."}`, returns the record |
//! | `POST` | `/upload_pdf` | Multipart field `file`; replaces the source PDF and re-ingests |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "query not found: 1234" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::dispatch::{get_query, submit_query, AppContext};
use crate::ingest::{run_ingest, save_upload};
use crate::models::QueryRecord;
use crate::pdf::looks_like_pdf;

/// Build the router with all routes and layers attached.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = ctx.config.server.max_upload_bytes;

    Router::new()
        .route("/", get(handle_root))
        .route("/get_query", get(handle_get_query))
        .route("/submit_query", post(handle_submit_query))
        .route("/upload_pdf", post(handle_upload_pdf))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Bind to `[server].bind` and serve until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let ctx = AppContext::from_config(config).await?;
    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

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

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        error!("request failed: {:#}", err);
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: format!("{:#}", err),
        }
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

// ============ GET / ============

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "Hello": "World" }))
}

// ============ GET /get_query ============

#[derive(Deserialize)]
struct GetQueryParams {
    query_id: Option<String>,
}

async fn handle_get_query(
    State(ctx): State<AppContext>,
    Query(params): Query<GetQueryParams>,
) -> Result<Json<QueryRecord>, AppError> {
    let query_id = params
        .query_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| bad_request("query_id is required"))?;

    match get_query(&ctx, &query_id).await? {
        Some(record) => Ok(Json(record)),
        None => Err(not_found(format!("query not found: {}", query_id))),
    }
}

// ============ POST /submit_query ============

#[derive(Deserialize)]
struct SubmitQueryRequest {
    query_text: String,
}

async fn handle_submit_query(
    State(ctx): State<AppContext>,
    Json(req): Json<SubmitQueryRequest>,
) -> Result<Json<QueryRecord>, AppError> {
    if req.query_text.trim().is_empty() {
        return Err(bad_request("query_text must not be empty"));
    }
    let record = submit_query(&ctx, &req.query_text).await?;
    Ok(Json(record))
}

// ============ POST /upload_pdf ============

async fn handle_upload_pdf(
    State(ctx): State<AppContext>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;
            upload = Some(bytes);
            break;
        }
    }

    let bytes = upload.ok_or_else(|| bad_request("multipart field 'file' is required"))?;
    if !looks_like_pdf(&bytes) {
        return Err(bad_request("uploaded file is not a PDF"));
    }

    let path = save_upload(&ctx.config, &bytes)?;
    info!(path = %path.display(), bytes = bytes.len(), "saved upload");

    let report = run_ingest(&ctx.config, ctx.embedder.as_ref(), true).await?;
    info!(added = report.added, "re-ingested after upload");

    Ok(Json(serde_json::json!({ "status": "PDF processed" })))
}
