//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by paper_forge and provides
//! functions for initializing, registering, and exporting metrics.

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all paper_forge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total number of tasks that reached a terminal state, labeled by kind and status.
pub static TASKS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Task execution duration in seconds, labeled by kind.
pub static TASK_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Number of tasks currently running across all pipelines.
pub static TASKS_RUNNING: OnceLock<Gauge> = OnceLock::new();

/// Total pipeline runs, labeled by final status.
pub static PIPELINE_RUNS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Pipeline wall-clock duration in seconds.
pub static PIPELINE_DURATION: OnceLock<Histogram> = OnceLock::new();

/// Records admitted by quality control.
pub static RECORDS_ADMITTED: OnceLock<Counter> = OnceLock::new();

/// Records rejected by quality control, labeled by reason.
pub static RECORDS_REJECTED: OnceLock<CounterVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. Recording through `MetricsCollector` before this is
/// a no-op.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    // Task metrics
    let tasks_total = CounterVec::new(
        Opts::new("paper_forge_tasks_total", "Total number of finished tasks"),
        &["kind", "status"],
    )?;

    let task_duration = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "paper_forge_task_duration_seconds",
            "Task execution duration in seconds",
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0, 300.0]),
        &["kind"],
    )?;

    let tasks_running = Gauge::new(
        "paper_forge_tasks_running",
        "Number of tasks currently running",
    )?;

    // Pipeline metrics
    let pipeline_runs_total = CounterVec::new(
        Opts::new("paper_forge_pipeline_runs_total", "Total pipeline runs"),
        &["status"],
    )?;

    let pipeline_duration = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "paper_forge_pipeline_duration_seconds",
            "Pipeline execution duration in seconds",
        )
        .buckets(vec![0.1, 1.0, 5.0, 30.0, 120.0, 600.0, 1800.0]),
    )?;

    // Quality control metrics
    let records_admitted = Counter::new(
        "paper_forge_records_admitted_total",
        "Records admitted by quality control",
    )?;

    let records_rejected = CounterVec::new(
        Opts::new(
            "paper_forge_records_rejected_total",
            "Records rejected by quality control",
        ),
        &["reason"],
    )?;

    registry.register(Box::new(tasks_total.clone()))?;
    registry.register(Box::new(task_duration.clone()))?;
    registry.register(Box::new(tasks_running.clone()))?;
    registry.register(Box::new(pipeline_runs_total.clone()))?;
    registry.register(Box::new(pipeline_duration.clone()))?;
    registry.register(Box::new(records_admitted.clone()))?;
    registry.register(Box::new(records_rejected.clone()))?;

    // If any of these fail, metrics were already initialized (idempotent)
    let _ = REGISTRY.set(registry);
    let _ = TASKS_TOTAL.set(tasks_total);
    let _ = TASK_DURATION.set(task_duration);
    let _ = TASKS_RUNNING.set(tasks_running);
    let _ = PIPELINE_RUNS_TOTAL.set(pipeline_runs_total);
    let _ = PIPELINE_DURATION.set(pipeline_duration);
    let _ = RECORDS_ADMITTED.set(records_admitted);
    let _ = RECORDS_REJECTED.set(records_rejected);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns an explanatory comment line if the registry has not been
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
