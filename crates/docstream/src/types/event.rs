//! Processing events and the streaming wire format

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document::{Document, DocumentStatus};

/// Immutable record of one status write on a document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingEvent {
    /// Per-document sequence number, starting at 1
    pub sequence: u64,
    pub document_id: String,
    pub owner_id: String,
    pub status: DocumentStatus,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProcessingEvent {
    /// Record the current state of `doc`
    pub fn from_document(doc: &Document, sequence: u64, message: impl Into<String>) -> Self {
        Self {
            sequence,
            document_id: doc.id.clone(),
            owner_id: doc.owner_id.clone(),
            status: doc.status,
            progress: doc.progress,
            message: message.into(),
            error: doc.error.clone(),
            timestamp: doc.updated_at,
        }
    }
}

/// Aggregate counters carried by heartbeats
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeartbeatStats {
    pub total_documents: usize,
    pub queue_depth: usize,
    pub active_subscribers: usize,
}

/// Message delivered to stream subscribers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Full list of the owner's documents, sent once on subscribe
    Snapshot { documents: Vec<Document> },
    /// A document was created
    DocumentUpdate { document: Document },
    /// A status write was applied
    DocumentStatus {
        event: ProcessingEvent,
        document: Document,
    },
    /// Keep-alive with aggregate counters
    Heartbeat {
        timestamp: DateTime<Utc>,
        stats: HeartbeatStats,
    },
}

impl StreamEvent {
    /// SSE event name
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Snapshot { .. } => "snapshot",
            Self::DocumentUpdate { .. } => "document_update",
            Self::DocumentStatus { .. } => "document_status",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }
}
