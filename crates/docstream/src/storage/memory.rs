//! In-memory document repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

use super::repository::DocumentRepository;
use crate::error::{Error, Result};
use crate::events::EventSink;
use crate::types::{
    Document, DocumentContent, DocumentStatus, NewDocument, ProcessingEvent, StatusUpdate,
    StreamEvent,
};

/// Default number of events kept per document
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// A document plus its bounded event log
struct DocumentEntry {
    document: Document,
    events: VecDeque<ProcessingEvent>,
    next_sequence: u64,
}

impl DocumentEntry {
    fn new(document: Document) -> Self {
        Self {
            document,
            events: VecDeque::new(),
            next_sequence: 1,
        }
    }

    /// Append an event for the current document state, evicting the oldest
    fn record(&mut self, message: &str, limit: usize) -> ProcessingEvent {
        let event = ProcessingEvent::from_document(&self.document, self.next_sequence, message);
        self.next_sequence += 1;
        self.events.push_back(event.clone());
        while self.events.len() > limit {
            self.events.pop_front();
        }
        event
    }
}

/// Process-local repository backed by `DashMap`
///
/// Writes to one document hold that document's shard lock for the whole
/// update, including the hand-off to the event sink, so each document's
/// events reach subscribers in sequence order.
pub struct InMemoryDocumentRepository {
    documents: DashMap<String, DocumentEntry>,
    /// owner id -> document ids in creation order
    owners: DashMap<String, Vec<String>>,
    contents: DashMap<String, DocumentContent>,
    history_limit: usize,
    sink: Option<Arc<dyn EventSink>>,
}

impl InMemoryDocumentRepository {
    pub fn new(history_limit: usize) -> Self {
        Self {
            documents: DashMap::new(),
            owners: DashMap::new(),
            contents: DashMap::new(),
            history_limit: history_limit.max(1),
            sink: None,
        }
    }

    /// Publish every mutation to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    fn publish(&self, owner_id: &str, event: StreamEvent) {
        if let Some(sink) = &self.sink {
            sink.publish(owner_id, event);
        }
    }

    /// Total number of documents across owners
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl Default for InMemoryDocumentRepository {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

#[async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn create(&self, new: NewDocument) -> Result<Document> {
        let document = Document::new(new);
        let id = document.id.clone();
        let owner_id = document.owner_id.clone();

        self.owners
            .entry(owner_id.clone())
            .or_default()
            .push(id.clone());

        let mut entry = self
            .documents
            .entry(id.clone())
            .or_insert_with(|| DocumentEntry::new(document));
        entry.record("Document received", self.history_limit);
        let snapshot = entry.document.clone();
        self.publish(
            &owner_id,
            StreamEvent::DocumentUpdate {
                document: snapshot.clone(),
            },
        );
        drop(entry);

        debug!("Created document {} for owner {}", id, owner_id);
        Ok(snapshot)
    }

    async fn get(&self, id: &str, owner_id: &str) -> Result<Document> {
        let entry = self
            .documents
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("document {}", id)))?;
        if entry.document.owner_id != owner_id {
            return Err(Error::Ownership(format!("document {}", id)));
        }
        Ok(entry.document.clone())
    }

    async fn set_status(&self, id: &str, update: StatusUpdate) -> Result<Document> {
        let mut entry = self
            .documents
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("document {}", id)))?;

        let current = entry.document.status;
        if !current.can_transition_to(update.status) {
            warn!(
                "Rejected transition for document {}: {} -> {}",
                id, current, update.status
            );
            return Err(Error::InvalidTransition {
                id: id.to_string(),
                from: current,
                to: update.status,
            });
        }

        let StatusUpdate {
            status,
            progress,
            message,
            error,
            summary,
        } = update;

        let document = &mut entry.document;
        match status {
            DocumentStatus::Completed => {
                let summary = summary.ok_or_else(|| {
                    Error::validation(format!("completing document {} requires a summary", id))
                })?;
                document.progress = 100;
                document.word_count = Some(summary.word_count);
                document.chunk_count = Some(summary.chunk_count);
                document.text_preview = Some(summary.text_preview);
            }
            DocumentStatus::Failed => {
                let error = error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| "unknown error".to_string());
                document.error = Some(error);
            }
            _ => {
                document.progress = document.progress.max(progress.min(100));
            }
        }
        document.status = status;
        document.updated_at = Utc::now().max(document.updated_at);

        let event = entry.record(&message, self.history_limit);
        let snapshot = entry.document.clone();
        self.publish(
            &snapshot.owner_id,
            StreamEvent::DocumentStatus {
                event,
                document: snapshot.clone(),
            },
        );
        drop(entry);

        debug!(
            "Document {} -> {} ({}%)",
            snapshot.id, snapshot.status, snapshot.progress
        );
        Ok(snapshot)
    }

    async fn set_content(&self, id: &str, content: DocumentContent) -> Result<()> {
        if !self.documents.contains_key(id) {
            return Err(Error::NotFound(format!("document {}", id)));
        }
        self.contents.insert(id.to_string(), content);
        Ok(())
    }

    async fn get_content(&self, id: &str, owner_id: &str) -> Result<DocumentContent> {
        self.get(id, owner_id).await?;
        self.contents
            .get(id)
            .map(|content| content.clone())
            .ok_or_else(|| Error::NotFound(format!("content for document {}", id)))
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Document>> {
        let ids = match self.owners.get(owner_id) {
            Some(ids) => ids.clone(),
            None => return Ok(Vec::new()),
        };

        Ok(ids
            .iter()
            .filter_map(|id| self.documents.get(id).map(|e| e.document.clone()))
            .collect())
    }

    async fn recent_events(&self, id: &str, limit: usize) -> Result<Vec<ProcessingEvent>> {
        let entry = self
            .documents
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("document {}", id)))?;
        let skip = entry.events.len().saturating_sub(limit);
        Ok(entry.events.iter().skip(skip).cloned().collect())
    }

    async fn count_by_owner(&self, owner_id: &str) -> Result<usize> {
        Ok(self.owners.get(owner_id).map_or(0, |ids| ids.len()))
    }

    async fn list_stale(
        &self,
        statuses: &[DocumentStatus],
        updated_before: DateTime<Utc>,
    ) -> Result<Vec<Document>> {
        Ok(self
            .documents
            .iter()
            .filter(|e| {
                statuses.contains(&e.document.status) && e.document.updated_at < updated_before
            })
            .map(|e| e.document.clone())
            .collect())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
