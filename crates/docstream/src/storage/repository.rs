//! Document repository trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{
    Document, DocumentContent, DocumentStatus, NewDocument, ProcessingEvent, StatusUpdate,
};

/// Storage for documents, their extracted content, and their event history
///
/// Implementations:
/// - `InMemoryDocumentRepository`: process-local maps
///
/// Every successful status write appends exactly one `ProcessingEvent` and
/// publishes it, in order, to the configured event sink.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Create a document in `uploading` and record its first event
    async fn create(&self, new: NewDocument) -> Result<Document>;

    /// Fetch a document, enforcing ownership
    async fn get(&self, id: &str, owner_id: &str) -> Result<Document>;

    /// Apply a status update through the lifecycle state machine
    async fn set_status(&self, id: &str, update: StatusUpdate) -> Result<Document>;

    /// Replace the extracted content of a document
    async fn set_content(&self, id: &str, content: DocumentContent) -> Result<()>;

    /// Fetch extracted content, enforcing ownership
    async fn get_content(&self, id: &str, owner_id: &str) -> Result<DocumentContent>;

    /// All documents of an owner, oldest first
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Document>>;

    /// Most recent events of a document, oldest first
    async fn recent_events(&self, id: &str, limit: usize) -> Result<Vec<ProcessingEvent>>;

    /// Number of documents an owner has
    async fn count_by_owner(&self, owner_id: &str) -> Result<usize>;

    /// Documents in one of `statuses` not updated since `updated_before`
    async fn list_stale(
        &self,
        statuses: &[DocumentStatus],
        updated_before: DateTime<Utc>,
    ) -> Result<Vec<Document>>;

    /// Get repository name for logging
    fn name(&self) -> &str;
}
