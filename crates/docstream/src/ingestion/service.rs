//! Upload validation and the two ingestion paths (queued and inline)

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::processing::{IngestHandler, IngestPayload, JobQueue, INGEST_JOB_TYPE};
use crate::storage::DocumentRepository;
use crate::types::{
    Document, DocumentContent, DocumentStatus, MimeClass, NewDocument, ProcessingEvent,
    StatusUpdate,
};

/// A file submitted for ingestion
#[derive(Debug, Clone)]
pub struct Upload {
    pub owner_id: String,
    pub name: String,
    /// Explicit content kind (`pdf`, `text`, ... or a MIME type)
    pub kind: Option<String>,
    /// Content type reported by the client
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Returned as soon as a queued upload is accepted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub document_id: String,
    pub job_id: Uuid,
    pub status: DocumentStatus,
}

/// Document plus its most recent processing events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentReport {
    pub document: Document,
    pub events: Vec<ProcessingEvent>,
}

pub struct IngestService {
    repository: Arc<dyn DocumentRepository>,
    queue: Arc<JobQueue>,
    handler: Arc<IngestHandler>,
    config: PipelineConfig,
}

impl IngestService {
    pub fn new(
        config: PipelineConfig,
        repository: Arc<dyn DocumentRepository>,
        queue: Arc<JobQueue>,
        handler: Arc<IngestHandler>,
    ) -> Self {
        Self {
            repository,
            queue,
            handler,
            config,
        }
    }

    /// Check owner, name, size, and kind; returns the resolved kind
    pub fn validate(&self, upload: &Upload) -> Result<MimeClass> {
        if upload.owner_id.trim().is_empty() {
            return Err(Error::validation("owner id is required"));
        }
        if upload.name.trim().is_empty() {
            return Err(Error::validation("file name is required"));
        }
        if upload.data.is_empty() {
            return Err(Error::validation(format!("{} is empty", upload.name)));
        }
        let max = self.config.upload.max_file_size;
        if upload.data.len() > max {
            return Err(Error::validation(format!(
                "{} is {} bytes, larger than the {} byte limit",
                upload.name,
                upload.data.len(),
                max
            )));
        }

        let kind = MimeClass::detect(&upload.name, upload.kind.as_deref())
            .or_else(|| {
                upload
                    .content_type
                    .as_deref()
                    .and_then(MimeClass::from_mime)
            })
            .ok_or_else(|| {
                Error::validation(format!("unsupported content kind for {}", upload.name))
            })?;
        if !self.config.upload.allows(kind) {
            return Err(Error::validation(format!("{} uploads are not accepted", kind)));
        }
        if !self.handler.supports(kind) {
            return Err(Error::validation(format!(
                "no extractor available for {} uploads",
                kind
            )));
        }
        Ok(kind)
    }

    async fn create(&self, upload: &Upload) -> Result<Document> {
        let mime_class = self.validate(upload)?;
        self.repository
            .create(NewDocument {
                owner_id: upload.owner_id.clone(),
                name: upload.name.clone(),
                mime_class,
                size_bytes: upload.data.len() as u64,
            })
            .await
    }

    /// Create the document and queue it for background processing
    pub async fn submit(&self, upload: Upload) -> Result<IngestReceipt> {
        let document = self.create(&upload).await?;
        let payload = IngestPayload::new(&document, &upload.data).to_value()?;
        let job_id = self.queue.enqueue(
            INGEST_JOB_TYPE,
            payload,
            self.queue
                .default_options()
                .for_document(&document.id)
                .for_owner(&document.owner_id),
        );

        tracing::info!(
            "Queued {} ({}, {} bytes) as document {} job {}",
            document.name,
            document.mime_class,
            document.size_bytes,
            document.id,
            job_id
        );

        Ok(IngestReceipt {
            document_id: document.id,
            job_id,
            status: document.status,
        })
    }

    /// Create and fully process the document before returning, without retries
    ///
    /// Bounded by the same time budget as a queued attempt.
    pub async fn process_inline(&self, upload: Upload) -> Result<Document> {
        let document = self.create(&upload).await?;
        let budget = self
            .handler
            .budget(document.mime_class, self.config.queue.job_timeout());
        let run = self
            .handler
            .process(&document.id, &document.owner_id, upload.data.clone());
        let outcome = match tokio::time::timeout(budget, run).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::transient(format!(
                "processing of {} timed out after {}s",
                document.id,
                budget.as_secs_f64()
            ))),
        };
        match outcome {
            Ok(document) => Ok(document),
            Err(e) => {
                tracing::error!("Inline processing of {} failed: {}", document.id, e);
                self.repository
                    .set_status(&document.id, StatusUpdate::failed(e.to_string()))
                    .await
            }
        }
    }

    /// Document snapshot plus up to `limit` recent events
    pub async fn status(
        &self,
        document_id: &str,
        owner_id: &str,
        limit: Option<usize>,
    ) -> Result<DocumentReport> {
        let document = self.repository.get(document_id, owner_id).await?;
        let limit = limit.unwrap_or(self.config.events.recent_events_default);
        let events = self.repository.recent_events(document_id, limit).await?;
        Ok(DocumentReport { document, events })
    }

    pub async fn list(&self, owner_id: &str) -> Result<Vec<Document>> {
        self.repository.list_by_owner(owner_id).await
    }

    pub async fn content(&self, document_id: &str, owner_id: &str) -> Result<DocumentContent> {
        self.repository.get_content(document_id, owner_id).await
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::{PlainTextExtractor, TextChunker};
    use crate::processing::JobStatus;
    use crate::storage::InMemoryDocumentRepository;

    use crate::ingestion::TextExtractor;
    use std::time::Duration;

    /// Reads plain text slowly, on the calling thread
    struct SlowExtractor(Duration);

    impl TextExtractor for SlowExtractor {
        fn extract(&self, name: &str, kind: MimeClass, data: &[u8]) -> Result<String> {
            std::thread::sleep(self.0);
            PlainTextExtractor::new().extract(name, kind, data)
        }
    }

    fn service(config: PipelineConfig) -> (IngestService, Arc<JobQueue>) {
        service_with(config, Arc::new(PlainTextExtractor::new()))
    }

    fn service_with(
        config: PipelineConfig,
        extractor: Arc<dyn TextExtractor>,
    ) -> (IngestService, Arc<JobQueue>) {
        let repo: Arc<dyn DocumentRepository> = Arc::new(InMemoryDocumentRepository::default());
        let queue = Arc::new(JobQueue::from_config(&config.queue));
        let handler = Arc::new(IngestHandler::new(repo.clone(), extractor, TextChunker::default()));
        (IngestService::new(config, repo, queue.clone(), handler), queue)
    }

    fn upload(name: &str, data: &'static [u8]) -> Upload {
        Upload {
            owner_id: "alice".into(),
            name: name.into(),
            kind: None,
            content_type: None,
            data: Bytes::from_static(data),
        }
    }

    #[tokio::test]
    async fn test_submit_enqueues_job() {
        let (service, queue) = service(PipelineConfig::default());
        let receipt = service.submit(upload("notes.txt", b"hello")).await.unwrap();

        assert_eq!(receipt.status, DocumentStatus::Uploading);
        let job = queue.get(receipt.job_id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.job_type, INGEST_JOB_TYPE);
        assert_eq!(job.document_id.as_deref(), Some(receipt.document_id.as_str()));
        assert_eq!(job.owner_id.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_validation_rejects_bad_uploads() {
        let mut config = PipelineConfig::default();
        config.upload.max_file_size = 4;
        config.upload.allowed_kinds = vec![MimeClass::Text];
        let (service, queue) = service(config);

        let too_big = service.submit(upload("a.txt", b"hello")).await;
        assert!(matches!(too_big, Err(Error::Validation(_))));

        let empty = service.submit(upload("a.txt", b"")).await;
        assert!(matches!(empty, Err(Error::Validation(_))));

        let disallowed = service.submit(upload("a.md", b"# hi")).await;
        assert!(matches!(disallowed, Err(Error::Validation(_))));

        let unknown = service.submit(upload("a.bin", b"abc")).await;
        assert!(matches!(unknown, Err(Error::Validation(_))));

        let binary = service.submit(upload("scan.pdf", b"%PDF")).await;
        assert!(matches!(binary, Err(Error::Validation(_))));

        let mut anonymous = upload("a.txt", b"abc");
        anonymous.owner_id = " ".into();
        assert!(matches!(
            service.submit(anonymous).await,
            Err(Error::Validation(_))
        ));

        assert_eq!(queue.stats().total(), 0);
        assert!(service.list("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_declared_kind_overrides_extension() {
        let (service, _) = service(PipelineConfig::default());
        let mut declared = upload("data.bin", b"{}");
        declared.kind = Some("json".into());
        assert_eq!(service.validate(&declared).unwrap(), MimeClass::Json);

        let mut typed = upload("blob", b"x");
        typed.content_type = Some("text/markdown".into());
        assert_eq!(service.validate(&typed).unwrap(), MimeClass::Markdown);
    }

    #[tokio::test]
    async fn test_inline_processing() {
        let (service, queue) = service(PipelineConfig::default());
        let document = service
            .process_inline(upload("notes.md", b"one two three"))
            .await
            .unwrap();
        assert_eq!(document.status, DocumentStatus::Completed);
        assert_eq!(document.word_count, Some(3));
        assert_eq!(queue.stats().total(), 0);

        let report = service.status(&document.id, "alice", Some(2)).await.unwrap();
        assert_eq!(report.events.len(), 2);
        assert_eq!(report.events[1].status, DocumentStatus::Completed);

        let content = service.content(&document.id, "alice").await.unwrap();
        assert_eq!(content.full_text, "one two three");
    }

    #[tokio::test]
    async fn test_inline_failure_marks_document_failed() {
        let (service, _) = service(PipelineConfig::default());
        let document = service
            .process_inline(upload("broken.txt", b"\xff\xfe"))
            .await
            .unwrap();
        assert_eq!(document.status, DocumentStatus::Failed);
        assert!(document.error.unwrap().contains("unsupported encoding"));
    }

    #[tokio::test]
    async fn test_kinds_without_extractor_are_rejected_even_when_allowed() {
        let mut config = PipelineConfig::default();
        config.upload.allowed_kinds = MimeClass::ALL.to_vec();
        let (service, queue) = service(config);

        let err = service.submit(upload("scan.png", b"\x89PNG")).await.unwrap_err();
        assert!(err.to_string().contains("no extractor available"));
        assert_eq!(queue.stats().total(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_inline_processing_is_bounded_by_job_timeout() {
        let mut config = PipelineConfig::default();
        config.queue.job_timeout_secs = 1;
        let (service, _) = service_with(config, Arc::new(SlowExtractor(Duration::from_millis(1500))));

        let started = std::time::Instant::now();
        let document = service
            .process_inline(upload("slow.txt", b"eventually"))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(1400));
        assert_eq!(document.status, DocumentStatus::Failed);
        assert!(document.error.unwrap().contains("timed out"));

        // The abandoned extraction never writes afterwards
        tokio::time::sleep(Duration::from_millis(800)).await;
        let report = service.status(&document.id, "alice", None).await.unwrap();
        assert_eq!(report.document.status, DocumentStatus::Failed);
        assert!(service.content(&document.id, "alice").await.is_err());
    }
}
