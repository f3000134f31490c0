//! Append-only record of pipeline executions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pipeline::PipelineStats;

/// One `execute_pipeline` call, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub pipeline_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub results_count: usize,
    /// Pipeline statistics after this call. `None` when the pipeline refused
    /// to start (already executed, or cancelled beforehand).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<PipelineStats>,
}

/// Execution history owned by a workflow agent.
#[derive(Debug, Clone, Default)]
pub struct ExecutionHistory {
    entries: Vec<ExecutionSummary>,
    successes: u64,
    failures: u64,
    average_duration_secs: f64,
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, summary: ExecutionSummary) {
        if summary.success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }

        // Incremental average: avg = avg + (new - avg) / n
        let n = (self.successes + self.failures) as f64;
        self.average_duration_secs += (summary.duration_secs - self.average_duration_secs) / n;

        self.entries.push(summary);
    }

    /// All entries in execution order.
    pub fn entries(&self) -> &[ExecutionSummary] {
        &self.entries
    }

    /// Entries for one pipeline name, in execution order.
    pub fn for_pipeline(&self, name: &str) -> Vec<ExecutionSummary> {
        self.entries
            .iter()
            .filter(|e| e.pipeline_name == name)
            .cloned()
            .collect()
    }

    pub fn last(&self) -> Option<&ExecutionSummary> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn success_count(&self) -> u64 {
        self.successes
    }

    pub fn failure_count(&self) -> u64 {
        self.failures
    }

    pub fn average_duration_secs(&self) -> f64 {
        self.average_duration_secs
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::pipeline::{PipelineStatus, TaskCounts};

    fn summary(name: &str, success: bool, duration_secs: f64) -> ExecutionSummary {
        let now = Utc::now();
        ExecutionSummary {
            pipeline_name: name.to_string(),
            started_at: now,
            completed_at: now,
            duration_secs,
            success,
            error: (!success).then(|| "boom".to_string()),
            results_count: 0,
            stats: Some(PipelineStats {
                name: name.to_string(),
                status: if success {
                    PipelineStatus::Completed
                } else {
                    PipelineStatus::Failed
                },
                total_tasks: 0,
                task_counts: TaskCounts::default(),
                started_at: Some(now),
                completed_at: Some(now),
                duration_secs: Some(duration_secs),
                results_count: 0,
            }),
        }
    }

    #[test]
    fn test_history_counts_and_average() {
        let mut history = ExecutionHistory::new();
        history.push(summary("a", true, 60.0));
        history.push(summary("b", false, 30.0));
        history.push(summary("a", true, 90.0));

        assert_eq!(history.len(), 3);
        assert_eq!(history.success_count(), 2);
        assert_eq!(history.failure_count(), 1);
        assert!((history.average_duration_secs() - 60.0).abs() < 1e-9);
        assert_eq!(history.for_pipeline("a").len(), 2);
        assert_eq!(history.last().map(|e| e.pipeline_name.as_str()), Some("a"));
    }

    #[test]
    fn test_clear() {
        let mut history = ExecutionHistory::new();
        history.push(summary("a", true, 1.0));
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.success_count(), 0);
        assert_eq!(history.average_duration_secs(), 0.0);
    }

    #[test]
    fn test_summary_serialization_skips_missing_error() {
        let json = serde_json::to_value(summary("a", true, 1.0)).expect("serializable");
        assert!(json.get("error").is_none());
        assert_eq!(json["stats"]["status"], "completed");
    }
}
