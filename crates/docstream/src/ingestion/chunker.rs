//! Paragraph-aware text chunking with overlap and a sentence fallback
//!
//! Sizes and offsets are UTF-8 byte counts and always fall on char boundaries.
//! Chunk content is always the exact slice `text[start_char..end_char]`, so
//! the overlap between neighbours is a literal shared region of the source.

use regex::Regex;
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{Error, Result};
use crate::types::Chunk;

type Span = (usize, usize);

/// Paragraph results with this many chunks or fewer trigger the sentence pass
const FALLBACK_MAX_CHUNKS: usize = 2;

fn blank_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t\r]*\n\s*").expect("blank line pattern is valid"))
}

/// Text chunker with configurable size and overlap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunker {
    /// Target chunk size in bytes
    chunk_size: usize,
    /// Overlap between consecutive chunks in bytes
    overlap: usize,
}

impl TextChunker {
    /// Create a new chunker; `overlap` must be smaller than `chunk_size`
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::validation("chunk size must be greater than zero"));
        }
        if overlap >= chunk_size {
            return Err(Error::validation(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self { chunk_size, overlap })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into ordered, overlapping chunks
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        if text.len() <= self.chunk_size {
            return vec![Chunk::from_span(text, 0, 0, text.len())];
        }

        let chunks = self.accumulate(text, &paragraph_spans(text));

        // Documents without blank-line structure collapse into a few huge chunks
        if chunks.len() <= FALLBACK_MAX_CHUNKS && text.len() * 2 > self.chunk_size * 3 {
            let units: Vec<Span> = sentence_spans(text)
                .into_iter()
                .flat_map(|span| split_oversized(text, span, self.chunk_size))
                .collect();
            return self.accumulate(text, &units);
        }

        chunks
    }

    /// Greedily pack units into chunks, seeding each new chunk with overlap
    fn accumulate(&self, text: &str, units: &[Span]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut buffer: Option<Span> = None;

        for &(unit_start, unit_end) in units {
            buffer = match buffer {
                None => Some((unit_start, unit_end)),
                Some((start, end)) if unit_end - start > self.chunk_size => {
                    chunks.push(Chunk::from_span(text, chunks.len() as u32, start, end));
                    let seed = self.overlap_start(text, start, end).unwrap_or(unit_start);
                    Some((seed, unit_end))
                }
                Some((start, _)) => Some((start, unit_end)),
            };
        }

        if let Some((start, end)) = buffer {
            chunks.push(Chunk::from_span(text, chunks.len() as u32, start, end));
        }

        chunks
    }

    /// Start of the trailing overlap region of `text[start..end]`, if any
    fn overlap_start(&self, text: &str, start: usize, end: usize) -> Option<usize> {
        if self.overlap == 0 {
            return None;
        }

        let mut from = end.saturating_sub(self.overlap).max(start);
        while !text.is_char_boundary(from) {
            from += 1;
        }

        let window = &text[from..end];
        let mid_word = from > start
            && text[..from]
                .chars()
                .next_back()
                .is_some_and(|c| !c.is_whitespace());

        // Prefer starting the overlap on a word
        let snapped = if mid_word {
            match window.find(char::is_whitespace) {
                Some(pos) => from + pos + leading_whitespace(&window[pos..]),
                None => from,
            }
        } else {
            from + leading_whitespace(window)
        };

        (snapped < end).then_some(snapped)
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

/// Chunk `text` with the given parameters
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    Ok(TextChunker::new(chunk_size, overlap)?.chunk(text))
}

fn leading_whitespace(s: &str) -> usize {
    s.len() - s.trim_start().len()
}

/// Push the non-whitespace span of `text[start..end]`
fn push_trimmed(text: &str, start: usize, end: usize, spans: &mut Vec<Span>) {
    let slice = &text[start..end];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return;
    }
    let lead = leading_whitespace(slice);
    spans.push((start + lead, start + lead + trimmed.len()));
}

/// Paragraphs separated by blank lines
fn paragraph_spans(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut start = 0;
    for separator in blank_line().find_iter(text) {
        push_trimmed(text, start, separator.start(), &mut spans);
        start = separator.end();
    }
    push_trimmed(text, start, text.len(), &mut spans);
    spans
}

/// Sentences by Unicode sentence boundaries
fn sentence_spans(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    for (offset, sentence) in text.split_sentence_bound_indices() {
        push_trimmed(text, offset, offset + sentence.len(), &mut spans);
    }
    spans
}

/// Break a span longer than `max` at word boundaries (or hard char cuts)
fn split_oversized(text: &str, (start, end): Span, max: usize) -> Vec<Span> {
    let mut pieces = Vec::new();
    let mut cursor = start;

    while end - cursor > max {
        let mut limit = cursor + max;
        while !text.is_char_boundary(limit) {
            limit -= 1;
        }
        if limit <= cursor {
            limit = cursor + text[cursor..].chars().next().map_or(1, char::len_utf8);
        }

        let cut = match text[cursor..limit].rfind(char::is_whitespace) {
            Some(pos) if pos > 0 => cursor + pos,
            _ => limit,
        };
        push_trimmed(text, cursor, cut, &mut pieces);
        cursor = cut + leading_whitespace(&text[cut..end]);
    }

    if cursor < end {
        push_trimmed(text, cursor, end, &mut pieces);
    }
    pieces
}
