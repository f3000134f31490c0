//! Collaborator interfaces consumed by pipeline stages.
//!
//! Each stage kind resolves one collaborator by name from the execution
//! context and drives it through the narrow interface defined here:
//!
//! | Trait     | Operation                          | Failure contract                         |
//! |-----------|------------------------------------|------------------------------------------|
//! | `Source`  | `search(query, max) -> records`    | empty result on no match, never an error |
//! | `Parser`  | `parse_record(record) -> record`   | stage keeps the original on error        |
//! | `Tagger`  | `tag_record(record) -> record`     | stage keeps the original on error        |
//! | `Storage` | `store_record(record) -> id`       | per-record failure, not a task failure   |

use async_trait::async_trait;

use crate::error::CollaboratorError;
use crate::models::PaperRecord;

/// A document source such as a paper search API.
#[async_trait]
pub trait Source: Send + Sync {
    /// Returns at most `max_results` records matching `query`.
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<PaperRecord>, CollaboratorError>;
}

/// A content parser that enriches a record with extracted text.
#[async_trait]
pub trait Parser: Send + Sync {
    async fn parse_record(&self, record: PaperRecord) -> Result<PaperRecord, CollaboratorError>;
}

/// A classifier that adds categories and tags to a record.
#[async_trait]
pub trait Tagger: Send + Sync {
    async fn tag_record(&self, record: PaperRecord) -> Result<PaperRecord, CollaboratorError>;
}

/// A persistence backend for records.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persists the record and returns its stable storage identifier.
    async fn store_record(&self, record: &PaperRecord) -> Result<String, CollaboratorError>;
}
