//! Document records, lifecycle status, and content kinds

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::chunk::Chunk;

/// Supported content kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MimeClass {
    /// PDF document
    Pdf,
    /// Microsoft Word document (.docx)
    Docx,
    /// Plain text file
    Text,
    /// Markdown file
    Markdown,
    /// HTML document
    Html,
    /// CSV file
    Csv,
    /// JSON file
    Json,
    /// Image (requires OCR)
    Image,
}

impl MimeClass {
    /// All content kinds, in declaration order
    pub const ALL: [MimeClass; 8] = [
        Self::Pdf,
        Self::Docx,
        Self::Text,
        Self::Markdown,
        Self::Html,
        Self::Csv,
        Self::Json,
        Self::Image,
    ];

    /// Kinds readable without a binary-format extractor
    pub const TEXTUAL: [MimeClass; 5] = [
        Self::Text,
        Self::Markdown,
        Self::Html,
        Self::Csv,
        Self::Json,
    ];

    /// Map a MIME type string (e.g. `text/plain; charset=utf-8`) to a kind
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "application/pdf" => Some(Self::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some(Self::Docx)
            }
            "text/plain" => Some(Self::Text),
            "text/markdown" | "text/x-markdown" => Some(Self::Markdown),
            "text/html" | "application/xhtml+xml" => Some(Self::Html),
            "text/csv" => Some(Self::Csv),
            "application/json" => Some(Self::Json),
            other if other.starts_with("image/") => Some(Self::Image),
            _ => None,
        }
    }

    /// Guess the kind from a filename extension
    pub fn from_filename(name: &str) -> Option<Self> {
        // mime_guess maps .md to text/markdown and .txt to text/plain
        mime_guess::from_path(name)
            .iter()
            .find_map(|mime| Self::from_mime(mime.essence_str()))
    }

    /// Resolve the kind from an explicit declaration, falling back to the filename
    pub fn detect(name: &str, declared: Option<&str>) -> Option<Self> {
        match declared.map(str::trim).filter(|d| !d.is_empty()) {
            Some(declared) => declared
                .parse()
                .ok()
                .or_else(|| Self::from_mime(declared)),
            None => Self::from_filename(name),
        }
    }

    /// Whether text extraction for this kind goes through OCR
    pub fn requires_ocr(&self) -> bool {
        matches!(self, Self::Image)
    }

    /// Short lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for MimeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MimeClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            "text" | "txt" => Ok(Self::Text),
            "markdown" | "md" => Ok(Self::Markdown),
            "html" | "htm" => Ok(Self::Html),
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "image" => Ok(Self::Image),
            other => Err(format!("unknown content kind '{}'", other)),
        }
    }
}

/// Document lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Uploading,
    Parsing,
    Processing,
    Generating,
    Completed,
    Failed,
}

impl DocumentStatus {
    /// Position along the happy path; `Failed` sorts last
    pub fn rank(&self) -> u8 {
        match self {
            Self::Uploading => 0,
            Self::Parsing => 1,
            Self::Processing => 2,
            Self::Generating => 3,
            Self::Completed => 4,
            Self::Failed => 5,
        }
    }

    /// `completed` and `failed` accept no further writes
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a status write from `self` to `next` is allowed.
    ///
    /// Same-status writes refresh progress on non-terminal documents.
    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if *self == next || next == Self::Failed {
            return true;
        }
        matches!(
            (self, next),
            (Self::Uploading, Self::Parsing)
                | (Self::Parsing, Self::Processing)
                | (Self::Processing, Self::Generating)
                | (Self::Generating, Self::Completed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::Parsing => "parsing",
            Self::Processing => "processing",
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded artifact and its processing state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique document ID
    pub id: String,
    /// Owner identity
    pub owner_id: String,
    /// Declared name as uploaded
    pub name: String,
    /// Content kind
    pub mime_class: MimeClass,
    /// Size in bytes
    pub size_bytes: u64,
    /// Lifecycle status
    pub status: DocumentStatus,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Failure reason, set only when failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Populated once completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_count: Option<usize>,
    /// Populated once completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<usize>,
    /// Populated once completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_preview: Option<String>,
}

impl Document {
    /// Create a fresh document in `uploading`
    pub fn new(new: NewDocument) -> Self {
        let now = Utc::now();
        Self {
            id: generate_document_id(&new.owner_id, now),
            owner_id: new.owner_id,
            name: new.name,
            mime_class: new.mime_class,
            size_bytes: new.size_bytes,
            status: DocumentStatus::Uploading,
            progress: 0,
            error: None,
            created_at: now,
            updated_at: now,
            word_count: None,
            chunk_count: None,
            text_preview: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Metadata required to create a document
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub owner_id: String,
    pub name: String,
    pub mime_class: MimeClass,
    pub size_bytes: u64,
}

/// Post-processing fields written on completion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentSummary {
    pub word_count: usize,
    pub chunk_count: usize,
    pub text_preview: String,
}

/// A single status write
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: DocumentStatus,
    pub progress: u8,
    /// Human-readable note recorded on the processing event
    pub message: String,
    pub error: Option<String>,
    pub summary: Option<DocumentSummary>,
}

impl StatusUpdate {
    /// Progress within the current or next non-terminal stage
    pub fn stage(status: DocumentStatus, progress: u8, message: impl Into<String>) -> Self {
        Self {
            status,
            progress,
            message: message.into(),
            error: None,
            summary: None,
        }
    }

    /// Final transition to `completed`
    pub fn completed(summary: DocumentSummary) -> Self {
        Self {
            status: DocumentStatus::Completed,
            progress: 100,
            message: "Processing complete".to_string(),
            error: None,
            summary: Some(summary),
        }
    }

    /// Final transition to `failed`; progress is kept by the repository
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: DocumentStatus::Failed,
            progress: 0,
            message: "Processing failed".to_string(),
            error: Some(error.into()),
            summary: None,
        }
    }
}

/// Extracted text and chunks for a document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentContent {
    pub document_id: String,
    pub full_text: String,
    pub chunks: Vec<Chunk>,
}

/// Build an id from owner, creation time, and a random suffix
fn generate_document_id(owner_id: &str, at: DateTime<Utc>) -> String {
    let slug: String = owner_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(16)
        .collect::<String>()
        .to_ascii_lowercase();
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect::<String>()
        .to_ascii_lowercase();

    let slug = if slug.is_empty() { "anon".to_string() } else { slug };
    format!("doc_{}_{}_{}", slug, at.timestamp_millis(), suffix)
}
