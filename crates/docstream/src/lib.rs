//! docstream: document ingestion with a retrying job queue and live status streaming
//!
//! Uploaded documents move through `uploading → parsing → processing →
//! generating → completed | failed`. A pool of workers drains an in-process
//! job queue, extracts and chunks text, and every status change is fanned out
//! to per-owner subscribers over server-sent events.

pub mod config;
pub mod error;
pub mod events;
pub mod ingestion;
pub mod processing;
pub mod server;
pub mod storage;
pub mod types;

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use events::{EventBroadcaster, EventSink, Subscription};
pub use ingestion::{chunk_text, IngestService, TextChunker};
pub use processing::{JobQueue, WorkerPool};
pub use storage::{DocumentRepository, InMemoryDocumentRepository};
pub use types::{Chunk, Document, DocumentStatus, ProcessingEvent, StreamEvent};
