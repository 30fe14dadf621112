//! Document ingestion: validation, extraction, and chunking

mod chunker;
mod extractor;
mod service;

pub use chunker::{chunk_text, TextChunker};
pub use extractor::{PlainTextExtractor, TextExtractor};
pub use service::{DocumentReport, IngestReceipt, IngestService, Upload};
