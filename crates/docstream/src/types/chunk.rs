//! Chunk type produced by the chunker

use serde::{Deserialize, Serialize};

/// A contiguous, possibly overlapping slice of a document's text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// 0-based position within the document
    pub index: u32,
    /// Exact text of `full_text[start_char..end_char]`
    pub content: String,
    /// Byte offset of the first character
    pub start_char: usize,
    /// Byte offset one past the last character
    pub end_char: usize,
    pub metadata: ChunkMetadata,
}

/// Counts describing a chunk
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub word_count: usize,
    pub paragraph_count: usize,
    pub char_count: usize,
}

impl Chunk {
    /// Create a chunk from a slice of `text`
    pub fn from_span(text: &str, index: u32, start: usize, end: usize) -> Self {
        let content = text[start..end].to_string();
        let metadata = ChunkMetadata::for_text(&content);
        Self {
            index,
            content,
            start_char: start,
            end_char: end,
            metadata,
        }
    }

    /// Length of the chunk in bytes
    pub fn len(&self) -> usize {
        self.end_char - self.start_char
    }

    pub fn is_empty(&self) -> bool {
        self.end_char == self.start_char
    }
}

impl ChunkMetadata {
    /// Count words, blank-line separated paragraphs, and characters
    pub fn for_text(text: &str) -> Self {
        let mut paragraph_count = 0;
        let mut in_paragraph = false;
        for line in text.lines() {
            if line.trim().is_empty() {
                in_paragraph = false;
            } else if !in_paragraph {
                paragraph_count += 1;
                in_paragraph = true;
            }
        }

        Self {
            word_count: text.split_whitespace().count(),
            paragraph_count,
            char_count: text.chars().count(),
        }
    }
}
