//! High-level recording interface over the raw Prometheus metrics.
//!
//! Every method is a no-op for metrics that were never initialized, so
//! library code can record unconditionally.

use std::time::Duration;

use super::prometheus::{
    PIPELINE_DURATION, PIPELINE_RUNS_TOTAL, RECORDS_ADMITTED, RECORDS_REJECTED, TASKS_RUNNING,
    TASKS_TOTAL, TASK_DURATION,
};

/// Metrics collector for workflow operations.
///
/// # Example
///
/// ```ignore
/// use paper_forge::metrics::{init_metrics, MetricsCollector};
///
/// init_metrics().expect("Failed to init metrics");
/// let collector = MetricsCollector::new();
/// collector.record_task("crawl", "completed", Some(Duration::from_secs(2)));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record a task reaching a terminal state.
    ///
    /// `duration` is only observed for tasks that actually ran.
    pub fn record_task(&self, kind: &str, status: &str, duration: Option<Duration>) {
        if let Some(tasks_total) = TASKS_TOTAL.get() {
            tasks_total.with_label_values(&[kind, status]).inc();
        }

        if let (Some(task_duration), Some(duration)) = (TASK_DURATION.get(), duration) {
            task_duration
                .with_label_values(&[kind])
                .observe(duration.as_secs_f64());
        }

        tracing::trace!(kind = kind, status = status, "Recorded task metric");
    }

    pub fn inc_tasks_running(&self) {
        if let Some(running) = TASKS_RUNNING.get() {
            running.inc();
        }
    }

    pub fn dec_tasks_running(&self) {
        if let Some(running) = TASKS_RUNNING.get() {
            running.dec();
        }
    }

    /// Record the end of a pipeline run.
    pub fn record_pipeline(&self, status: &str, duration: Duration) {
        if let Some(runs) = PIPELINE_RUNS_TOTAL.get() {
            runs.with_label_values(&[status]).inc();
        }

        if let Some(pipeline_duration) = PIPELINE_DURATION.get() {
            pipeline_duration.observe(duration.as_secs_f64());
        }

        tracing::trace!(
            status = status,
            duration_secs = duration.as_secs_f64(),
            "Recorded pipeline metric"
        );
    }

    /// Record a quality control decision for one record.
    ///
    /// `reason` is ignored for admitted records.
    pub fn record_quality(&self, admitted: bool, reason: &str) {
        if admitted {
            if let Some(counter) = RECORDS_ADMITTED.get() {
                counter.inc();
            }
        } else if let Some(counter) = RECORDS_REJECTED.get() {
            counter.with_label_values(&[reason]).inc();
        }
    }
}
