//! Plain-text normalisation parser.
//!
//! Cleans the text fields of a record: control characters are dropped,
//! whitespace runs collapse to a single space and ligatures common in
//! PDF extractions are expanded. When a record has no body text but points
//! at a local file through a `file://` url, the file is read as the body.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::debug;

use crate::collaborators::Parser;
use crate::error::CollaboratorError;
use crate::models::PaperRecord;

const LIGATURES: &[(char, &str)] = &[
    ('\u{fb00}', "ff"),
    ('\u{fb01}', "fi"),
    ('\u{fb02}', "fl"),
    ('\u{fb03}', "ffi"),
    ('\u{fb04}', "ffl"),
];

/// Normalises whitespace and strips control characters.
pub fn clean_text(raw: &str) -> String {
    let mut expanded = String::with_capacity(raw.len());
    for c in raw.chars() {
        match LIGATURES.iter().find(|(lig, _)| *lig == c) {
            Some((_, replacement)) => expanded.push_str(replacement),
            None if c.is_control() && !c.is_whitespace() => {}
            None => expanded.push(c),
        }
    }
    expanded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parser that cleans title, abstract and content in place.
#[derive(Debug, Clone)]
pub struct TextParser {
    name: String,
    max_content_chars: Option<usize>,
}

impl Default for TextParser {
    fn default() -> Self {
        Self::new("text")
    }
}

impl TextParser {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_content_chars: None,
        }
    }

    /// Truncates parsed content to at most `max` characters.
    pub fn with_max_content_chars(mut self, max: usize) -> Self {
        self.max_content_chars = Some(max);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn load_local_content(&self, record: &PaperRecord) -> Result<Option<String>, CollaboratorError> {
        let path = match record
            .pdf_url
            .as_deref()
            .or(record.url.as_deref())
            .and_then(|u| u.strip_prefix("file://"))
        {
            Some(path) => path,
            None => return Ok(None),
        };

        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CollaboratorError::Parse(format!("failed to read {}: {}", path, e)))?;
        debug!(record = %record.primary_id(), path, "Loaded local content");
        Ok(Some(raw))
    }
}

#[async_trait]
impl Parser for TextParser {
    async fn parse_record(&self, mut record: PaperRecord) -> Result<PaperRecord, CollaboratorError> {
        if !record.has_content() {
            if let Some(raw) = self.load_local_content(&record).await? {
                record.content = Some(raw);
            }
        }

        record.title = clean_text(&record.title);
        record.abstract_text = record
            .abstract_text
            .as_deref()
            .map(clean_text)
            .filter(|a| !a.is_empty());
        record.content = record.content.as_deref().map(clean_text).filter(|c| !c.is_empty());

        if let (Some(max), Some(content)) = (self.max_content_chars, record.content.as_mut()) {
            if let Some((cut, _)) = content.char_indices().nth(max) {
                content.truncate(cut);
            }
        }

        if record.title.is_empty() && record.abstract_text.is_none() && record.content.is_none() {
            return Err(CollaboratorError::Parse(format!(
                "record {} has no text to parse",
                record.primary_id()
            )));
        }

        record.metadata.insert("parser".to_string(), json!(self.name));
        record
            .metadata
            .insert("parsed_at".to_string(), json!(Utc::now().to_rfc3339()));
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  a\u{0007}b \n\t c  "), "ab c");
        assert_eq!(clean_text("e\u{fb03}cient \u{fb01}rms"), "efficient firms");
    }

    #[tokio::test]
    async fn test_parse_normalises_fields() {
        let record = PaperRecord::new("  Deep\n Hedging ")
            .with_abstract("Neural   networks\r\nfor hedging")
            .with_content("   ");
        let parsed = TextParser::default().parse_record(record).await.expect("parse");
        assert_eq!(parsed.title, "Deep Hedging");
        assert_eq!(parsed.abstract_text.as_deref(), Some("Neural networks for hedging"));
        assert!(parsed.content.is_none());
        assert_eq!(parsed.metadata["parser"], "text");
        assert!(parsed.metadata.contains_key("parsed_at"));
    }

    #[tokio::test]
    async fn test_parse_reads_file_url() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("body.txt");
        std::fs::write(&path, "Full   body\ntext of the paper").expect("write");

        let record = PaperRecord::new("Local paper").with_url(format!("file://{}", path.display()));
        let parsed = TextParser::default()
            .with_max_content_chars(9)
            .parse_record(record)
            .await
            .expect("parse");
        assert_eq!(parsed.content.as_deref(), Some("Full body"));
    }

    #[tokio::test]
    async fn test_parse_rejects_empty_record() {
        let err = TextParser::default()
            .parse_record(PaperRecord::new(" \u{0000} "))
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Parse(_)));
    }
}
