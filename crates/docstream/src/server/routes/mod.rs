//! API routes for the ingestion server

pub mod documents;
pub mod jobs;
pub mod stream;

use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts},
    http::request::Parts,
    routing::{get, post},
    Router,
};

use crate::error::Error;
use crate::server::state::AppState;

/// Header carrying the caller's identity
pub const OWNER_HEADER: &str = "x-owner-id";

/// Multipart framing allowance on top of the file size limit
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Owner identity taken from the `x-owner-id` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|owner| !owner.is_empty())
            .map(|owner| OwnerId(owner.to_string()))
            .ok_or_else(|| Error::validation(format!("missing {} header", OWNER_HEADER)))
    }
}

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    let body_limit = DefaultBodyLimit::max(max_upload_size.saturating_add(MULTIPART_OVERHEAD));

    Router::new()
        // Ingestion - with larger body limit for file uploads
        .route(
            "/documents",
            post(documents::upload_document)
                .layer(body_limit)
                .get(documents::list_documents),
        )
        .route(
            "/documents/sync",
            post(documents::upload_document_sync).layer(body_limit),
        )
        .route("/documents/:id", get(documents::get_document))
        .route("/documents/:id/content", get(documents::get_content))
        // Job management
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/:id", get(jobs::get_job))
        // Live status stream
        .route("/stream", get(stream::stream_events))
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "docstream",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Document ingestion with live processing status",
        "endpoints": {
            "POST /api/documents": "Upload a document for background processing",
            "POST /api/documents/sync": "Upload and process a document before responding",
            "GET /api/documents": "List your documents",
            "GET /api/documents/:id": "Document status with recent events (?limit=N)",
            "GET /api/documents/:id/content": "Extracted text and chunks",
            "GET /api/jobs": "Queue stats and your jobs",
            "GET /api/jobs/:id": "Job details",
            "GET /api/stream": "Server-sent events for your documents"
        },
        "identity": format!("send the {} header with every request", OWNER_HEADER)
    }))
}
