//! Record-level quality checks.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::models::PaperRecord;

/// Minimum trimmed title length, in characters.
pub const MIN_TITLE_CHARS: usize = 10;

/// Minimum trimmed abstract (or body, when no abstract exists) length, in characters.
pub const MIN_SUMMARY_CHARS: usize = 50;

/// Why quality control dropped a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "filter", rename_all = "snake_case")]
pub enum RejectionReason {
    /// The stable key was already admitted by this quality control instance.
    Duplicate,
    /// Title missing or shorter than [`MIN_TITLE_CHARS`].
    ShortTitle,
    /// Abstract and body missing or shorter than [`MIN_SUMMARY_CHARS`].
    ShortSummary,
    /// A registered filter returned false.
    Filter(String),
}

impl RejectionReason {
    /// Metric label for the reason.
    pub fn label(&self) -> &str {
        match self {
            RejectionReason::Duplicate => "duplicate",
            RejectionReason::ShortTitle => "short_title",
            RejectionReason::ShortSummary => "short_summary",
            RejectionReason::Filter(_) => "filter",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::Duplicate => write!(f, "duplicate record"),
            RejectionReason::ShortTitle => {
                write!(f, "title shorter than {} characters", MIN_TITLE_CHARS)
            }
            RejectionReason::ShortSummary => {
                write!(f, "abstract shorter than {} characters", MIN_SUMMARY_CHARS)
            }
            RejectionReason::Filter(name) => write!(f, "rejected by filter '{}'", name),
        }
    }
}

/// A named predicate every admitted record must satisfy.
#[derive(Clone)]
pub struct QualityFilter {
    name: String,
    check: Arc<dyn Fn(&PaperRecord) -> bool + Send + Sync>,
}

impl QualityFilter {
    pub fn new(
        name: impl Into<String>,
        check: impl Fn(&PaperRecord) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Admits records whose [`PaperRecord::completeness`] reaches `threshold`.
    pub fn completeness(threshold: f64) -> Self {
        let threshold = threshold.clamp(0.0, 1.0);
        Self::new("completeness", move |record| record.completeness() >= threshold)
    }

    /// Admits records carrying at least one of `tags`.
    pub fn require_any_tag(tags: Vec<String>) -> Self {
        Self::new("required_tags", move |record| {
            record.tags.iter().any(|t| tags.contains(t))
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn passes(&self, record: &PaperRecord) -> bool {
        (self.check)(record)
    }
}

impl fmt::Debug for QualityFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QualityFilter").field("name", &self.name).finish()
    }
}

/// Built-in minimum field checks applied to every record.
pub fn basic_check(record: &PaperRecord) -> Option<RejectionReason> {
    if record.title.trim().chars().count() < MIN_TITLE_CHARS {
        return Some(RejectionReason::ShortTitle);
    }

    let summary = record
        .abstract_text
        .as_deref()
        .filter(|a| !a.trim().is_empty())
        .or(record.content.as_deref())
        .unwrap_or("");
    if summary.trim().chars().count() < MIN_SUMMARY_CHARS {
        return Some(RejectionReason::ShortSummary);
    }

    None
}
