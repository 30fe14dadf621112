//! Document storage

mod memory;
mod repository;

pub use memory::{InMemoryDocumentRepository, DEFAULT_HISTORY_LIMIT};
pub use repository::DocumentRepository;
