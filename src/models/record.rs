//! Research paper record passed between pipeline stages.
//!
//! A `PaperRecord` is the unit of data that sources emit, parsers enrich,
//! taggers classify and storages persist. The scheduler never inspects it
//! beyond moving it between stages; quality control uses its stable key and
//! its title/abstract fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A research document collected from a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Internal identifier, assigned on creation.
    #[serde(default = "new_record_id")]
    pub id: String,

    /// Identifier assigned by the originating source (e.g. an arXiv id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,

    /// Digital object identifier, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,

    /// Paper title.
    pub title: String,

    /// Abstract or summary text.
    #[serde(default, rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,

    /// Full body text, filled in by parsers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default)]
    pub authors: Vec<String>,

    #[serde(default)]
    pub categories: Vec<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,

    /// Name of the source the record came from (e.g. "arxiv").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,

    #[serde(default = "Utc::now")]
    pub processed_at: DateTime<Utc>,

    /// Free-form processing metadata written by collaborators.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

impl PaperRecord {
    /// Creates a record with a title and a fresh internal id.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: new_record_id(),
            external_id: None,
            doi: None,
            title: title.into(),
            abstract_text: None,
            content: None,
            authors: Vec::new(),
            categories: Vec::new(),
            tags: Vec::new(),
            url: None,
            pdf_url: None,
            source: None,
            published_at: None,
            processed_at: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Sets the source-assigned identifier.
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    /// Sets the DOI.
    pub fn with_doi(mut self, doi: impl Into<String>) -> Self {
        self.doi = Some(doi.into());
        self
    }

    /// Sets the abstract.
    pub fn with_abstract(mut self, abstract_text: impl Into<String>) -> Self {
        self.abstract_text = Some(abstract_text.into());
        self
    }

    /// Sets the full body text.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Sets the author list.
    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        self.authors = authors;
        self
    }

    /// Sets the originating source name.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Sets the landing page URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Returns the identifier most useful to humans: the external id when
    /// present, otherwise the internal id.
    pub fn primary_id(&self) -> &str {
        self.external_id.as_deref().unwrap_or(&self.id)
    }

    /// Returns the deduplication identity of this record.
    ///
    /// External id first, then DOI, then a SHA-256 digest of the normalised
    /// title. The digest is stable across processes.
    pub fn stable_key(&self) -> String {
        if let Some(external_id) = self.external_id.as_deref().filter(|s| !s.trim().is_empty()) {
            return format!("id:{}", external_id.trim());
        }
        if let Some(doi) = self.doi.as_deref().filter(|s| !s.trim().is_empty()) {
            return format!("doi:{}", doi.trim().to_lowercase());
        }

        let mut hasher = Sha256::new();
        hasher.update(normalize_title(&self.title).as_bytes());
        format!("title:{}", hex::encode(hasher.finalize()))
    }

    /// Adds a tag unless it is already present.
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }

    /// Adds a category unless it is already present.
    pub fn add_category(&mut self, category: impl Into<String>) {
        let category = category.into();
        if !self.categories.contains(&category) {
            self.categories.push(category);
        }
    }

    /// Returns true if the record carries non-empty body text.
    pub fn has_content(&self) -> bool {
        self.content
            .as_deref()
            .map(|c| !c.trim().is_empty())
            .unwrap_or(false)
    }

    /// Fraction of descriptive fields that are populated (0.0 - 1.0).
    pub fn completeness(&self) -> f64 {
        let checks = [
            !self.title.trim().is_empty(),
            self.abstract_text
                .as_deref()
                .map(|a| !a.trim().is_empty())
                .unwrap_or(false),
            self.has_content(),
            !self.authors.is_empty(),
            self.external_id.is_some() || self.doi.is_some(),
            self.url.is_some() || self.pdf_url.is_some(),
            self.published_at.is_some(),
            !self.categories.is_empty() || !self.tags.is_empty(),
        ];

        checks.iter().filter(|&&ok| ok).count() as f64 / checks.len() as f64
    }
}

/// Lowercases a title and collapses internal whitespace.
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl std::fmt::Display for PaperRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let title: String = self.title.chars().take(50).collect();
        write!(f, "Paper({}): {}", self.primary_id(), title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_key_prefers_external_id() {
        let record = PaperRecord::new("Some Title")
            .with_external_id("2301.12345")
            .with_doi("10.1000/xyz");
        assert_eq!(record.stable_key(), "id:2301.12345");
    }

    #[test]
    fn test_stable_key_falls_back_to_doi() {
        let record = PaperRecord::new("Some Title").with_doi("10.1000/XYZ");
        assert_eq!(record.stable_key(), "doi:10.1000/xyz");
    }

    #[test]
    fn test_stable_key_title_hash_ignores_case_and_spacing() {
        let a = PaperRecord::new("Deep  Hedging of Options");
        let b = PaperRecord::new("deep hedging   of OPTIONS ");
        assert_eq!(a.stable_key(), b.stable_key());
        assert!(a.stable_key().starts_with("title:"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_add_tag_and_category_deduplicate() {
        let mut record = PaperRecord::new("t");
        record.add_tag("finance");
        record.add_tag("finance");
        record.add_category("Risk Management");
        record.add_category("Risk Management");
        assert_eq!(record.tags, vec!["finance"]);
        assert_eq!(record.categories, vec!["Risk Management"]);
    }

    #[test]
    fn test_serde_uses_abstract_field_name() {
        let json = serde_json::json!({
            "title": "A paper",
            "abstract": "Short summary",
            "external_id": "1234.5678"
        });
        let record: PaperRecord = serde_json::from_value(json).expect("valid record");
        assert_eq!(record.abstract_text.as_deref(), Some("Short summary"));
        assert_eq!(record.primary_id(), "1234.5678");
        assert!(!record.id.is_empty());

        let back = serde_json::to_value(&record).expect("serializable");
        assert_eq!(back["abstract"], "Short summary");
    }

    #[test]
    fn test_completeness() {
        let bare = PaperRecord::new("Title only");
        let rich = PaperRecord::new("Title")
            .with_abstract("Abstract")
            .with_content("Body")
            .with_authors(vec!["A. Author".to_string()])
            .with_external_id("1")
            .with_url("https://example.org");
        assert!(rich.completeness() > bare.completeness());
        assert!((bare.completeness() - 1.0 / 8.0).abs() < f64::EPSILON);
    }
}
