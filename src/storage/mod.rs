//! Local record storage.
//!
//! [`JsonStorage`] persists records as JSON files and maintains a
//! [`StorageIndex`] with per-record summaries and an inverted token index.
//!
//! # Usage
//!
//! ```rust,ignore
//! use paper_forge::collaborators::Storage;
//! use paper_forge::storage::{JsonStorage, SearchQuery};
//!
//! let storage = JsonStorage::open("./data").await?;
//! let id = storage.store_record(&record).await?;
//!
//! let hits = storage
//!     .search(&SearchQuery::new().with_text("momentum").with_limit(10))
//!     .await?;
//! ```

mod index;
mod json;

pub use index::{
    tokenize, IndexEntry, IndexStatistics, SearchQuery, StorageIndex, ABSTRACT_EXCERPT_CHARS,
    DEFAULT_SEARCH_LIMIT,
};
pub use json::{JsonStorage, DEFAULT_MAX_BACKUPS};
