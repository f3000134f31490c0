//! Metrics module for Prometheus-based monitoring.
//!
//! Covers task lifecycle, pipeline runs and quality control decisions.
//!
//! # Example
//!
//! ```ignore
//! use paper_forge::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics().expect("Failed to initialize metrics");
//! let collector = MetricsCollector::new();
//! collector.record_pipeline("completed", std::time::Duration::from_secs(4));
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    PIPELINE_DURATION, PIPELINE_RUNS_TOTAL, RECORDS_ADMITTED, RECORDS_REJECTED, REGISTRY,
    TASKS_RUNNING, TASKS_TOTAL, TASK_DURATION,
};
