//! Quality control for extracted records.
//!
//! [`QualityControl`] drops records whose stable key it has already seen,
//! records that fail the minimum field checks, and records rejected by any
//! registered [`QualityFilter`].

mod control;
mod filter;

pub use control::{QualityControl, QualityReport, Rejection};
pub use filter::{basic_check, QualityFilter, RejectionReason, MIN_SUMMARY_CHARS, MIN_TITLE_CHARS};
