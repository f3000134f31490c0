//! Classifiers that add categories and tags to records.

mod rules;

pub use rules::{CategoryRule, RuleTagger, TagPattern, TaggerRules};
