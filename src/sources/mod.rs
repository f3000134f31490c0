//! Record sources.
//!
//! Both sources here answer queries with case-insensitive term matching over
//! title and abstract: a record matches when every whitespace-separated query
//! term occurs in it. The query `*` matches everything.

mod json_file;
mod memory;

pub use json_file::JsonFileSource;
pub use memory::StaticSource;

use crate::models::PaperRecord;

/// Returns true if every term of `query` occurs in the record's title or abstract.
pub fn matches_query(record: &PaperRecord, query: &str) -> bool {
    let query = query.trim();
    if query == "*" {
        return true;
    }

    let haystack = format!(
        "{} {}",
        record.title,
        record.abstract_text.as_deref().unwrap_or("")
    )
    .to_lowercase();

    query
        .split_whitespace()
        .all(|term| haystack.contains(&term.to_lowercase()))
}
