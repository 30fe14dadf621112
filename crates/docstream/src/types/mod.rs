//! Core types for the ingestion pipeline

pub mod chunk;
pub mod document;
pub mod event;

pub use chunk::{Chunk, ChunkMetadata};
pub use document::{
    Document, DocumentContent, DocumentStatus, DocumentSummary, MimeClass, NewDocument,
    StatusUpdate,
};
pub use event::{HeartbeatStats, ProcessingEvent, StreamEvent};
