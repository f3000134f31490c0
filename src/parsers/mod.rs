//! Record parsers.

mod text;

pub use text::{clean_text, TextParser};
