//! Document upload, listing, and status endpoints

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::OwnerId;
use crate::error::{Error, Result};
use crate::ingestion::{DocumentReport, IngestReceipt, Upload};
use crate::server::state::AppState;
use crate::types::{Document, DocumentContent};

/// Documents list response
#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentListResponse {
    pub documents: Vec<Document>,
    pub total: usize,
}

/// Query parameters for the status endpoint
#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    /// Number of recent events to include
    pub limit: Option<usize>,
}

/// Read the `file` field (and optional `kind` field) of an upload form
async fn read_upload(owner_id: String, mut multipart: Multipart) -> Result<Upload> {
    let mut file: Option<(String, Option<String>, Bytes)> = None;
    let mut kind = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::validation(format!("Failed to read multipart field: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                let name = field.file_name().unwrap_or("").to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| Error::validation(format!("Failed to read file {}: {}", name, e)))?;
                file = Some((name, content_type, data));
            }
            "kind" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| Error::validation(format!("Failed to read kind: {}", e)))?;
                kind = Some(text);
            }
            other => tracing::debug!("Ignoring multipart field {}", other),
        }
    }

    let (name, content_type, data) =
        file.ok_or_else(|| Error::validation("No file provided"))?;
    Ok(Upload {
        owner_id,
        name,
        kind,
        content_type,
        data,
    })
}

/// POST /api/documents - Upload a document for background processing
pub async fn upload_document(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    multipart: Multipart,
) -> Result<(StatusCode, Json<IngestReceipt>)> {
    let upload = read_upload(owner_id, multipart).await?;
    let receipt = state.ingest().submit(upload).await?;
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

/// POST /api/documents/sync - Upload and process before responding
pub async fn upload_document_sync(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    multipart: Multipart,
) -> Result<Json<Document>> {
    let upload = read_upload(owner_id, multipart).await?;
    let document = state.ingest().process_inline(upload).await?;
    Ok(Json(document))
}

/// GET /api/documents - List the caller's documents
pub async fn list_documents(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
) -> Result<Json<DocumentListResponse>> {
    let documents = state.ingest().list(&owner_id).await?;
    let total = documents.len();
    Ok(Json(DocumentListResponse { documents, total }))
}

/// GET /api/documents/:id - Document with its most recent events
pub async fn get_document(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<DocumentReport>> {
    let report = state.ingest().status(&id, &owner_id, query.limit).await?;
    Ok(Json(report))
}

/// GET /api/documents/:id/content - Extracted text and chunks
pub async fn get_content(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<String>,
) -> Result<Json<DocumentContent>> {
    let content = state.ingest().content(&id, &owner_id).await?;
    Ok(Json(content))
}
