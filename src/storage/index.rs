//! Search index kept alongside stored records.
//!
//! The index holds a summary of every stored record plus an inverted index
//! from lowercase tokens (title and abstract) to record ids, so text searches
//! never have to open record files.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::PaperRecord;

/// Characters of the abstract kept in an index entry.
pub const ABSTRACT_EXCERPT_CHARS: usize = 500;

/// Default result limit of a [`SearchQuery`].
pub const DEFAULT_SEARCH_LIMIT: usize = 100;

/// Summary of one stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub file_path: PathBuf,
    pub title: String,
    #[serde(rename = "abstract", default)]
    pub abstract_excerpt: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    pub stored_at: DateTime<Utc>,
}

impl IndexEntry {
    pub fn from_record(record: &PaperRecord, file_path: PathBuf) -> Self {
        Self {
            file_path,
            title: record.title.clone(),
            abstract_excerpt: record
                .abstract_text
                .as_deref()
                .unwrap_or("")
                .chars()
                .take(ABSTRACT_EXCERPT_CHARS)
                .collect(),
            categories: record.categories.clone(),
            tags: record.tags.clone(),
            published_at: record.published_at,
            stored_at: Utc::now(),
        }
    }

    fn tokens(&self) -> BTreeSet<String> {
        let mut tokens = tokenize(&self.title);
        tokens.extend(tokenize(&self.abstract_excerpt));
        tokens
    }

    fn matches_filters(&self, categories: &[String], tags: &[String]) -> bool {
        (categories.is_empty() || categories.iter().any(|c| self.categories.contains(c)))
            && (tags.is_empty() || tags.iter().any(|t| self.tags.contains(t)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStatistics {
    pub total_papers: usize,
    pub categories: usize,
    pub tags: usize,
}

/// Criteria for searching stored records.
///
/// Text terms must all occur (AND); categories and tags match when any of
/// the listed values is present (OR within each list).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub text: Option<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub limit: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            text: None,
            categories: Vec::new(),
            tags: Vec::new(),
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// The persisted `index.json` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageIndex {
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    papers: BTreeMap<String, IndexEntry>,
    #[serde(default)]
    terms: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub statistics: IndexStatistics,
}

impl Default for StorageIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageIndex {
    pub fn new() -> Self {
        Self {
            created_at: Utc::now(),
            updated_at: None,
            papers: BTreeMap::new(),
            terms: BTreeMap::new(),
            statistics: IndexStatistics::default(),
        }
    }

    /// Adds or replaces the entry for `id`.
    pub fn insert(&mut self, id: impl Into<String>, entry: IndexEntry) {
        let id = id.into();
        self.remove(&id);

        for token in entry.tokens() {
            self.terms.entry(token).or_default().insert(id.clone());
        }
        self.papers.insert(id, entry);
        self.touch();
    }

    pub fn remove(&mut self, id: &str) -> Option<IndexEntry> {
        let entry = self.papers.remove(id)?;
        for token in entry.tokens() {
            if let Some(ids) = self.terms.get_mut(&token) {
                ids.remove(id);
                if ids.is_empty() {
                    self.terms.remove(&token);
                }
            }
        }
        self.touch();
        Some(entry)
    }

    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.papers.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.papers.keys()
    }

    pub fn len(&self) -> usize {
        self.papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }

    /// Ids of records containing `token`.
    pub fn postings(&self, token: &str) -> Option<&BTreeSet<String>> {
        self.terms.get(token)
    }

    /// Returns matching record ids in id order, at most `query.limit` of them.
    pub fn search(&self, query: &SearchQuery) -> Vec<String> {
        let tokens = query.text.as_deref().map(tokenize).unwrap_or_default();

        let candidates: Box<dyn Iterator<Item = &String> + '_> = if tokens.is_empty() {
            Box::new(self.papers.keys())
        } else {
            let mut sets = tokens.iter().map(|t| self.terms.get(t));
            match sets.next().flatten() {
                Some(first) => {
                    let mut hits: BTreeSet<&String> = first.iter().collect();
                    for set in sets {
                        match set {
                            Some(set) => hits.retain(|id| set.contains(*id)),
                            None => hits.clear(),
                        }
                    }
                    Box::new(hits.into_iter())
                }
                None => Box::new(std::iter::empty()),
            }
        };

        candidates
            .filter(|id| {
                self.papers
                    .get(*id)
                    .map(|e| e.matches_filters(&query.categories, &query.tags))
                    .unwrap_or(false)
            })
            .take(query.limit)
            .cloned()
            .collect()
    }

    /// Counts entries matching the category and tag filters.
    pub fn count(&self, categories: &[String], tags: &[String]) -> usize {
        self.papers
            .values()
            .filter(|e| e.matches_filters(categories, tags))
            .count()
    }

    pub fn categories(&self) -> Vec<String> {
        self.papers
            .values()
            .flat_map(|e| e.categories.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn tags(&self) -> Vec<String> {
        self.papers
            .values()
            .flat_map(|e| e.tags.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
        self.statistics = IndexStatistics {
            total_papers: self.papers.len(),
            categories: self.categories().len(),
            tags: self.tags().len(),
        };
    }
}

/// Splits text into lowercase alphanumeric tokens of at least two characters.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect()
}
