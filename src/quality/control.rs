//! Deduplicating quality gate for extracted records.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::metrics::MetricsCollector;
use crate::models::PaperRecord;

use super::filter::{basic_check, QualityFilter, RejectionReason};

/// A record dropped by quality control.
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub record_id: String,
    pub stable_key: String,
    pub reason: RejectionReason,
}

/// Outcome of one quality control pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QualityReport {
    pub admitted: Vec<PaperRecord>,
    pub rejected: Vec<Rejection>,
}

impl QualityReport {
    pub fn total(&self) -> usize {
        self.admitted.len() + self.rejected.len()
    }

    /// Fraction of input records admitted (1.0 for an empty pass).
    pub fn retention_ratio(&self) -> f64 {
        if self.total() == 0 {
            return 1.0;
        }
        self.admitted.len() as f64 / self.total() as f64
    }
}

/// Stateful record gate.
///
/// Remembers every stable key it has seen, across passes, until [`reset`]
/// is called. A key is remembered as soon as it is seen, even if that record
/// then fails a check.
///
/// [`reset`]: QualityControl::reset
#[derive(Debug, Clone)]
pub struct QualityControl {
    enable_deduplication: bool,
    seen_keys: HashSet<String>,
    filters: Vec<QualityFilter>,
    metrics: MetricsCollector,
}

impl Default for QualityControl {
    fn default() -> Self {
        Self::new(true)
    }
}

impl QualityControl {
    pub fn new(enable_deduplication: bool) -> Self {
        Self {
            enable_deduplication,
            seen_keys: HashSet::new(),
            filters: Vec::new(),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn add_filter(&mut self, filter: QualityFilter) {
        self.filters.push(filter);
    }

    pub fn filters(&self) -> &[QualityFilter] {
        &self.filters
    }

    pub fn deduplication_enabled(&self) -> bool {
        self.enable_deduplication
    }

    pub fn has_seen(&self, stable_key: &str) -> bool {
        self.seen_keys.contains(stable_key)
    }

    pub fn seen_count(&self) -> usize {
        self.seen_keys.len()
    }

    /// Forgets all seen keys. Registered filters are kept.
    pub fn reset(&mut self) {
        self.seen_keys.clear();
    }

    /// Returns the records that pass, in input order.
    pub fn apply(&mut self, records: Vec<PaperRecord>) -> Vec<PaperRecord> {
        self.evaluate(records).admitted
    }

    /// Runs every record through deduplication, the built-in checks and the
    /// registered filters, in that order.
    pub fn evaluate(&mut self, records: Vec<PaperRecord>) -> QualityReport {
        let input = records.len();
        let mut report = QualityReport::default();

        for record in records {
            let stable_key = record.stable_key();
            match self.check(&record, &stable_key) {
                None => {
                    self.metrics.record_quality(true, "");
                    report.admitted.push(record);
                }
                Some(reason) => {
                    debug!(
                        record = record.primary_id(),
                        reason = %reason,
                        "Record rejected by quality control"
                    );
                    self.metrics.record_quality(false, reason.label());
                    report.rejected.push(Rejection {
                        record_id: record.primary_id().to_string(),
                        stable_key,
                        reason,
                    });
                }
            }
        }

        info!(
            input,
            admitted = report.admitted.len(),
            rejected = report.rejected.len(),
            "Quality control applied"
        );
        report
    }

    fn check(&mut self, record: &PaperRecord, stable_key: &str) -> Option<RejectionReason> {
        if self.enable_deduplication && !self.seen_keys.insert(stable_key.to_string()) {
            return Some(RejectionReason::Duplicate);
        }

        if let Some(reason) = basic_check(record) {
            return Some(reason);
        }

        self.filters
            .iter()
            .find(|f| !passes_guarded(f, record))
            .map(|f| RejectionReason::Filter(f.name().to_string()))
    }
}

/// A panicking filter rejects the record instead of unwinding through the
/// caller.
fn passes_guarded(filter: &QualityFilter, record: &PaperRecord) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| filter.passes(record))) {
        Ok(passes) => passes,
        Err(_) => {
            warn!(
                filter = filter.name(),
                record = record.primary_id(),
                "Quality filter panicked, rejecting record"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, title: &str) -> PaperRecord {
        PaperRecord::new(title)
            .with_external_id(id)
            .with_abstract("A long enough abstract describing a quantitative finance study in detail.")
    }

    #[test]
    fn test_duplicate_key_admits_first_only() {
        let mut qc = QualityControl::default();
        let kept = qc.apply(vec![
            record("2301.12345", "First version of the paper"),
            record("2301.12345", "Second version of the paper"),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title, "First version of the paper");
    }

    #[test]
    fn test_seen_keys_persist_across_passes() {
        let mut qc = QualityControl::default();
        assert_eq!(qc.apply(vec![record("a", "Paper about volatility")]).len(), 1);
        let report = qc.evaluate(vec![
            record("a", "Paper about volatility"),
            record("b", "Paper about liquidity"),
        ]);
        assert_eq!(report.admitted.len(), 1);
        assert_eq!(report.rejected[0].reason, RejectionReason::Duplicate);
        assert!((report.retention_ratio() - 0.5).abs() < f64::EPSILON);

        qc.reset();
        assert_eq!(qc.seen_count(), 0);
        assert_eq!(qc.apply(vec![record("a", "Paper about volatility")]).len(), 1);
    }

    #[test]
    fn test_dedup_disabled() {
        let mut qc = QualityControl::new(false);
        let kept = qc.apply(vec![
            record("x", "Same paper, first copy"),
            record("x", "Same paper, second copy"),
        ]);
        assert_eq!(kept.len(), 2);
        assert_eq!(qc.seen_count(), 0);
    }

    #[test]
    fn test_failed_record_still_marks_key_seen() {
        let mut qc = QualityControl::default();
        let short = PaperRecord::new("Tiny").with_external_id("k");
        assert!(qc.apply(vec![short]).is_empty());
        assert!(qc.has_seen("id:k"));

        let report = qc.evaluate(vec![record("k", "Now with a proper title")]);
        assert_eq!(report.rejected[0].reason, RejectionReason::Duplicate);
    }

    #[test]
    fn test_custom_filter_rejects() {
        let mut qc = QualityControl::default();
        qc.add_filter(QualityFilter::new("no_surveys", |r| {
            !r.title.to_lowercase().contains("survey")
        }));
        let report = qc.evaluate(vec![
            record("1", "A survey of deep hedging"),
            record("2", "Deep hedging under frictions"),
        ]);
        assert_eq!(report.admitted.len(), 1);
        assert_eq!(
            report.rejected[0].reason,
            RejectionReason::Filter("no_surveys".into())
        );
    }

    #[test]
    fn test_panicking_filter_rejects_only_that_record() {
        let mut qc = QualityControl::default();
        qc.add_filter(QualityFilter::new("fragile", |r| {
            if r.title.contains("bad") {
                panic!("cannot score record");
            }
            true
        }));

        let report = qc.evaluate(vec![
            record("1", "A bad record for the filter"),
            record("2", "A well formed record title"),
        ]);
        assert_eq!(report.admitted.len(), 1);
        assert_eq!(
            report.rejected[0].reason,
            RejectionReason::Filter("fragile".into())
        );

        assert_eq!(qc.apply(vec![record("3", "Another well formed title")]).len(), 1);
    }

    #[test]
    fn test_empty_input() {
        let mut qc = QualityControl::default();
        let report = qc.evaluate(Vec::new());
        assert_eq!(report.total(), 0);
        assert!((report.retention_ratio() - 1.0).abs() < f64::EPSILON);
    }
}
