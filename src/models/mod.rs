//! Domain records exchanged between pipeline stages.

pub mod record;

pub use record::{normalize_title, PaperRecord};
