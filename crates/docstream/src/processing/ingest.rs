//! Ingestion job handler
//!
//! Drives a document through `parsing → processing → generating → completed`.
//! Each stage is only entered if the document has not reached it yet, so a
//! retried job resumes where the previous attempt left off.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::handler::JobHandler;
use super::job::Job;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::ingestion::{TextChunker, TextExtractor};
use crate::storage::DocumentRepository;
use crate::types::{
    Document, DocumentContent, DocumentStatus, DocumentSummary, MimeClass, StatusUpdate,
};

/// Job type handled by [`IngestHandler`]
pub const INGEST_JOB_TYPE: &str = "ingest_document";

/// Payload of an ingestion job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestPayload {
    pub document_id: String,
    pub owner_id: String,
    pub mime_class: MimeClass,
    /// Upload bytes, base64 encoded
    pub data: String,
}

impl IngestPayload {
    pub fn new(document: &Document, data: &[u8]) -> Self {
        Self {
            document_id: document.id.clone(),
            owner_id: document.owner_id.clone(),
            mime_class: document.mime_class,
            data: STANDARD.encode(data),
        }
    }

    pub fn decode_data(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.data)
            .map_err(|e| Error::permanent(format!("corrupt job payload: {}", e)))
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Extracts, chunks, and summarizes uploaded documents
pub struct IngestHandler {
    repository: Arc<dyn DocumentRepository>,
    extractor: Arc<dyn TextExtractor>,
    chunker: TextChunker,
    preview_chars: usize,
    ocr_timeout_multiplier: u32,
}

impl IngestHandler {
    pub fn new(
        repository: Arc<dyn DocumentRepository>,
        extractor: Arc<dyn TextExtractor>,
        chunker: TextChunker,
    ) -> Self {
        Self {
            repository,
            extractor,
            chunker,
            preview_chars: 200,
            ocr_timeout_multiplier: 1,
        }
    }

    pub fn from_config(
        config: &PipelineConfig,
        repository: Arc<dyn DocumentRepository>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Result<Self> {
        let chunker = TextChunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
        Ok(Self::new(repository, extractor, chunker)
            .with_preview_chars(config.chunking.preview_chars)
            .with_ocr_timeout_multiplier(config.queue.ocr_timeout_multiplier))
    }

    pub fn with_preview_chars(mut self, preview_chars: usize) -> Self {
        self.preview_chars = preview_chars;
        self
    }

    pub fn with_ocr_timeout_multiplier(mut self, multiplier: u32) -> Self {
        self.ocr_timeout_multiplier = multiplier.max(1);
        self
    }

    /// Whether the extractor can read `kind` at all
    pub fn supports(&self, kind: MimeClass) -> bool {
        self.extractor.supports(kind)
    }

    /// Time allowed for one run over a document of `kind`
    pub fn budget(&self, kind: MimeClass, base: Duration) -> Duration {
        if kind.requires_ocr() {
            base.saturating_mul(self.ocr_timeout_multiplier)
        } else {
            base
        }
    }

    /// Run the remaining stages for a document
    ///
    /// Extraction and chunking run on the blocking pool, so dropping this
    /// future stops the run at the next stage boundary.
    pub async fn process(&self, document_id: &str, owner_id: &str, data: Bytes) -> Result<Document> {
        let document = self.repository.get(document_id, owner_id).await?;
        if document.is_terminal() {
            tracing::debug!(
                "Document {} already {}, nothing to do",
                document_id,
                document.status
            );
            return Ok(document);
        }
        let mut status = document.status;

        self.advance(document_id, &mut status, DocumentStatus::Parsing, 20, "Extracting text")
            .await?;
        let extractor = self.extractor.clone();
        let name = document.name.clone();
        let kind = document.mime_class;
        let text = run_blocking(move || extractor.extract(&name, kind, &data)).await?;

        self.advance(document_id, &mut status, DocumentStatus::Processing, 40, "Chunking text")
            .await?;
        let chunker = self.chunker;
        let (text, chunks) = run_blocking(move || {
            let chunks = chunker.chunk(&text);
            Ok((text, chunks))
        })
        .await?;
        let chunk_count = chunks.len();
        let word_count = text.split_whitespace().count();
        let text_preview: String = text.trim().chars().take(self.preview_chars).collect();

        self.repository
            .set_content(
                document_id,
                DocumentContent {
                    document_id: document_id.to_string(),
                    full_text: text,
                    chunks,
                },
            )
            .await?;
        self.advance(
            document_id,
            &mut status,
            DocumentStatus::Processing,
            70,
            format!("Stored {} chunks", chunk_count),
        )
        .await?;

        self.advance(
            document_id,
            &mut status,
            DocumentStatus::Generating,
            90,
            "Generating summary",
        )
        .await?;

        let document = self
            .repository
            .set_status(
                document_id,
                StatusUpdate::completed(DocumentSummary {
                    word_count,
                    chunk_count,
                    text_preview,
                }),
            )
            .await?;

        tracing::info!(
            "Processed document {}: {} words, {} chunks",
            document_id,
            word_count,
            chunk_count
        );
        Ok(document)
    }

    /// Write `target` unless the document is already past it
    async fn advance(
        &self,
        document_id: &str,
        current: &mut DocumentStatus,
        target: DocumentStatus,
        progress: u8,
        message: impl Into<String>,
    ) -> Result<()> {
        if current.rank() > target.rank() {
            return Ok(());
        }
        let document = self
            .repository
            .set_status(document_id, StatusUpdate::stage(target, progress, message))
            .await?;
        *current = document.status;
        Ok(())
    }
}

/// Run sync work on the blocking pool
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::transient(format!("Task join error: {}", e)))?
}

#[async_trait]
impl JobHandler for IngestHandler {
    fn job_type(&self) -> &str {
        INGEST_JOB_TYPE
    }

    async fn handle(&self, job: &Job) -> Result<()> {
        let payload: IngestPayload = serde_json::from_value(job.payload.clone())
            .map_err(|e| Error::permanent(format!("invalid ingest payload: {}", e)))?;
        let data = Bytes::from(payload.decode_data()?);
        self.process(&payload.document_id, &payload.owner_id, data)
            .await?;
        Ok(())
    }

    fn timeout(&self, job: &Job, base: Duration) -> Duration {
        job.payload
            .get("mime_class")
            .and_then(|v| serde_json::from_value::<MimeClass>(v.clone()).ok())
            .map_or(base, |kind| self.budget(kind, base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::PlainTextExtractor;
    use crate::processing::job::JobOptions;
    use crate::storage::InMemoryDocumentRepository;
    use crate::types::NewDocument;

    fn handler(repo: Arc<InMemoryDocumentRepository>) -> IngestHandler {
        IngestHandler::new(
            repo,
            Arc::new(PlainTextExtractor::new()),
            TextChunker::new(1000, 200).unwrap(),
        )
        .with_ocr_timeout_multiplier(3)
    }

    async fn create(repo: &InMemoryDocumentRepository, kind: MimeClass) -> Document {
        repo.create(NewDocument {
            owner_id: "alice".into(),
            name: "doc".into(),
            mime_class: kind,
            size_bytes: 10,
        })
        .await
        .unwrap()
    }

    fn fifty_words() -> String {
        (0..50).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[tokio::test]
    async fn test_processes_to_completion() {
        let repo = Arc::new(InMemoryDocumentRepository::default());
        let doc = create(&repo, MimeClass::Text).await;

        let done = handler(repo.clone())
            .process(&doc.id, "alice", Bytes::from(fifty_words()))
            .await
            .unwrap();
        assert_eq!(done.status, DocumentStatus::Completed);
        assert_eq!(done.progress, 100);
        assert_eq!(done.word_count, Some(50));
        assert_eq!(done.chunk_count, Some(1));

        let statuses: Vec<(DocumentStatus, u8)> = repo
            .recent_events(&doc.id, 10)
            .await
            .unwrap()
            .iter()
            .map(|e| (e.status, e.progress))
            .collect();
        assert_eq!(
            statuses,
            vec![
                (DocumentStatus::Uploading, 0),
                (DocumentStatus::Parsing, 20),
                (DocumentStatus::Processing, 40),
                (DocumentStatus::Processing, 70),
                (DocumentStatus::Generating, 90),
                (DocumentStatus::Completed, 100),
            ]
        );

        let content = repo.get_content(&doc.id, "alice").await.unwrap();
        assert_eq!(content.chunks.len(), 1);
        assert_eq!(content.full_text, fifty_words());
    }

    #[tokio::test]
    async fn test_rerun_resumes_forward_only() {
        let repo = Arc::new(InMemoryDocumentRepository::default());
        let doc = create(&repo, MimeClass::Text).await;
        for (status, progress) in [(DocumentStatus::Parsing, 20), (DocumentStatus::Processing, 40), (DocumentStatus::Generating, 90)] {
            repo.set_status(&doc.id, StatusUpdate::stage(status, progress, "earlier attempt"))
                .await
                .unwrap();
        }

        let done = handler(repo.clone())
            .process(&doc.id, "alice", Bytes::from_static(b"some words here"))
            .await
            .unwrap();
        assert_eq!(done.status, DocumentStatus::Completed);

        // Only the remaining stages were written
        let events = repo.recent_events(&doc.id, 2).await.unwrap();
        assert_eq!(events[0].status, DocumentStatus::Generating);
        assert_eq!(events[0].message, "Generating summary");
        assert_eq!(events[1].status, DocumentStatus::Completed);

        // Terminal documents are left alone
        let again = handler(repo.clone())
            .process(&doc.id, "alice", Bytes::from_static(b"other"))
            .await
            .unwrap();
        assert_eq!(again.word_count, Some(3));
    }

    #[tokio::test]
    async fn test_unsupported_kind_is_permanent() {
        let repo = Arc::new(InMemoryDocumentRepository::default());
        let doc = create(&repo, MimeClass::Pdf).await;

        let err = handler(repo.clone())
            .process(&doc.id, "alice", Bytes::from_static(b"%PDF"))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());

        let doc = repo.get(&doc.id, "alice").await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Parsing);
    }

    #[tokio::test]
    async fn test_job_payload_and_timeout() {
        let repo = Arc::new(InMemoryDocumentRepository::default());
        let image = create(&repo, MimeClass::Image).await;
        let text = create(&repo, MimeClass::Text).await;
        let handler = handler(repo.clone());
        let base = Duration::from_secs(10);

        let image_job = Job::new(
            INGEST_JOB_TYPE.into(),
            IngestPayload::new(&image, b"png").to_value().unwrap(),
            JobOptions::default(),
        );
        assert_eq!(handler.timeout(&image_job, base), Duration::from_secs(30));

        let text_job = Job::new(
            INGEST_JOB_TYPE.into(),
            IngestPayload::new(&text, b"hello there").to_value().unwrap(),
            JobOptions::default(),
        );
        assert_eq!(handler.timeout(&text_job, base), base);
        handler.handle(&text_job).await.unwrap();
        assert_eq!(
            repo.get(&text.id, "alice").await.unwrap().status,
            DocumentStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_permanent() {
        let repo = Arc::new(InMemoryDocumentRepository::default());
        let job = Job::new(
            INGEST_JOB_TYPE.into(),
            serde_json::json!({"document_id": 1}),
            JobOptions::default(),
        );
        let err = handler(repo).handle(&job).await.unwrap_err();
        assert!(matches!(err, Error::PermanentProcessing(_)));
    }
}
