//! Text extraction from uploaded bytes

use crate::error::{Error, Result};
use crate::types::MimeClass;

/// Turns raw upload bytes into plain text.
///
/// Binary formats (PDF, DOCX, OCR) plug in behind this trait.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, name: &str, kind: MimeClass, data: &[u8]) -> Result<String>;

    /// Whether `extract` can succeed for `kind`; uploads of other kinds are rejected up front
    fn supports(&self, _kind: MimeClass) -> bool {
        true
    }
}

/// Extractor for the text-based formats
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    pub fn new() -> Self {
        Self
    }

    fn decode(name: &str, data: &[u8]) -> Result<String> {
        String::from_utf8(data.to_vec())
            .map_err(|_| Error::permanent(format!("unsupported encoding in {}", name)))
    }

    /// Text of the `<body>`, one space between text nodes
    fn html_text(html: &str) -> String {
        let document = scraper::Html::parse_document(html);
        let Ok(body) = scraper::Selector::parse("body") else {
            return String::new();
        };

        let mut content = String::new();
        for node in document.select(&body) {
            for text in node.text() {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if !content.is_empty() {
                    content.push(' ');
                }
                content.push_str(trimmed);
            }
        }
        content
    }

    /// Header and rows joined with ` | `, one record per line
    fn csv_text(name: &str, data: &[u8]) -> Result<String> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(data);
        let mut content = String::new();

        let headers = reader
            .headers()
            .map_err(|e| Error::permanent(format!("malformed csv in {}: {}", name, e)))?;
        content.push_str(&headers.iter().collect::<Vec<_>>().join(" | "));
        content.push('\n');

        for record in reader.records() {
            let record =
                record.map_err(|e| Error::permanent(format!("malformed csv in {}: {}", name, e)))?;
            content.push_str(&record.iter().collect::<Vec<_>>().join(" | "));
            content.push('\n');
        }
        Ok(content)
    }
}

impl TextExtractor for PlainTextExtractor {
    fn supports(&self, kind: MimeClass) -> bool {
        MimeClass::TEXTUAL.contains(&kind)
    }

    fn extract(&self, name: &str, kind: MimeClass, data: &[u8]) -> Result<String> {
        let text = match kind {
            MimeClass::Text | MimeClass::Markdown | MimeClass::Json => Self::decode(name, data)?,
            MimeClass::Html => Self::html_text(&Self::decode(name, data)?),
            MimeClass::Csv => {
                // Surface encoding problems the same way as plain text
                Self::decode(name, data)?;
                Self::csv_text(name, data)?
            }
            MimeClass::Pdf | MimeClass::Docx | MimeClass::Image => {
                return Err(Error::permanent(format!(
                    "no extractor configured for {}",
                    kind
                )));
            }
        };

        if text.trim().is_empty() {
            return Err(Error::permanent(format!("no text content in {}", name)));
        }
        Ok(text)
    }
}
