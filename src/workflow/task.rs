//! Task definitions for the extraction workflow.
//!
//! A task is a single unit of pipeline work (crawl, parse, tag, store or a
//! caller-defined body) with a one-shot lifecycle:
//!
//! ```text
//! PENDING ──start──▶ RUNNING ──complete──▶ COMPLETED
//!    │                  │
//!    │                  ├────fail────────▶ FAILED
//!    ├──fail (validation)─────────────────▶ FAILED
//!    └──cancel──────────┴────cancel──────▶ CANCELLED
//! ```
//!
//! Terminal states never change again; every transition out of one returns
//! `TaskError::InvalidTransition`.

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::TaskError;
use crate::models::PaperRecord;

use super::context::ExecutionContext;
use super::stages;

/// Task execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    /// Returns true for COMPLETED, FAILED and CANCELLED.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::Pending, TaskStatus::Cancelled)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Cancelled)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Task priority levels.
///
/// Advisory only: the scheduler dispatches ready tasks in insertion order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    Low = 1,
    #[default]
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskPriority::Low => write!(f, "LOW"),
            TaskPriority::Medium => write!(f, "MEDIUM"),
            TaskPriority::High => write!(f, "HIGH"),
            TaskPriority::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Parameters of a crawl stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlParams {
    pub source_name: String,
    pub query: String,
    pub max_results: usize,
}

/// Parameters of a parse stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseParams {
    pub parser_name: String,
}

/// Parameters of a tag stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagParams {
    pub tagger_name: String,
}

/// Parameters of a store stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreParams {
    pub storage_name: String,
}

/// Caller-defined unit of work for `TaskKind::Custom`.
#[async_trait]
pub trait TaskBody: Send + Sync {
    /// Short label used in logs, metrics and snapshots.
    fn name(&self) -> &str {
        "custom"
    }

    /// Checked before scheduling; `false` fails the task without running it.
    fn validate(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        task: &Task,
        context: &ExecutionContext,
        input: &TaskInput,
    ) -> Result<TaskOutput, TaskError>;
}

/// The closed set of task kinds the scheduler knows how to run.
#[derive(Clone)]
pub enum TaskKind {
    Crawl(CrawlParams),
    Parse(ParseParams),
    Tag(TagParams),
    Store(StoreParams),
    Custom(Arc<dyn TaskBody>),
}

impl TaskKind {
    /// Label used in logs and metrics.
    pub fn label(&self) -> &str {
        match self {
            TaskKind::Crawl(_) => "crawl",
            TaskKind::Parse(_) => "parse",
            TaskKind::Tag(_) => "tag",
            TaskKind::Store(_) => "store",
            TaskKind::Custom(body) => body.name(),
        }
    }

    fn validate(&self) -> bool {
        match self {
            TaskKind::Crawl(p) => {
                !p.source_name.trim().is_empty() && !p.query.trim().is_empty() && p.max_results > 0
            }
            TaskKind::Parse(p) => !p.parser_name.trim().is_empty(),
            TaskKind::Tag(p) => !p.tagger_name.trim().is_empty(),
            TaskKind::Store(p) => !p.storage_name.trim().is_empty(),
            TaskKind::Custom(body) => body.validate(),
        }
    }

    fn config(&self) -> serde_json::Value {
        let value = match self {
            TaskKind::Crawl(p) => serde_json::to_value(p),
            TaskKind::Parse(p) => serde_json::to_value(p),
            TaskKind::Tag(p) => serde_json::to_value(p),
            TaskKind::Store(p) => serde_json::to_value(p),
            TaskKind::Custom(body) => Ok(serde_json::json!({ "body": body.name() })),
        };
        value.unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Debug for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Crawl(p) => f.debug_tuple("Crawl").field(p).finish(),
            TaskKind::Parse(p) => f.debug_tuple("Parse").field(p).finish(),
            TaskKind::Tag(p) => f.debug_tuple("Tag").field(p).finish(),
            TaskKind::Store(p) => f.debug_tuple("Store").field(p).finish(),
            TaskKind::Custom(body) => f.debug_tuple("Custom").field(&body.name()).finish(),
        }
    }
}

/// Value produced by a successful task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TaskOutput {
    /// Records emitted by crawl, parse and tag stages.
    Records(Vec<PaperRecord>),
    /// Identifiers returned by a store stage.
    StoredIds(Vec<String>),
    /// Arbitrary value produced by a custom task.
    Value(serde_json::Value),
}

impl TaskOutput {
    /// Returns the record list if this output carries one.
    pub fn records(&self) -> Option<&[PaperRecord]> {
        match self {
            TaskOutput::Records(records) => Some(records),
            _ => None,
        }
    }

    /// Number of items carried by the output.
    pub fn len(&self) -> usize {
        match self {
            TaskOutput::Records(records) => records.len(),
            TaskOutput::StoredIds(ids) => ids.len(),
            TaskOutput::Value(serde_json::Value::Array(items)) => items.len(),
            TaskOutput::Value(serde_json::Value::Null) => 0,
            TaskOutput::Value(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<serde_json::Value> for TaskOutput {
    fn from(value: serde_json::Value) -> Self {
        TaskOutput::Value(value)
    }
}

/// Results of a task's prerequisites, in dependency declaration order.
#[derive(Debug, Clone, Default)]
pub struct TaskInput {
    upstream: Vec<(String, TaskOutput)>,
}

impl TaskInput {
    pub fn new(upstream: Vec<(String, TaskOutput)>) -> Self {
        Self { upstream }
    }

    /// Output of a specific prerequisite.
    pub fn get(&self, task_id: &str) -> Option<&TaskOutput> {
        self.upstream
            .iter()
            .find(|(id, _)| id == task_id)
            .map(|(_, output)| output)
    }

    /// Iterates over `(task_id, output)` pairs.
    pub fn outputs(&self) -> impl Iterator<Item = (&str, &TaskOutput)> {
        self.upstream.iter().map(|(id, output)| (id.as_str(), output))
    }

    /// Concatenates every record list found among the prerequisites' outputs.
    pub fn records(&self) -> Vec<PaperRecord> {
        self.upstream
            .iter()
            .filter_map(|(_, output)| output.records())
            .flat_map(|records| records.iter().cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.upstream.is_empty()
    }
}

#[derive(Debug)]
struct TaskState {
    status: TaskStatus,
    progress: f64,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    error: Option<String>,
    result: Option<TaskOutput>,
}

/// Serializable view of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub kind: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<f64>,
    pub error: Option<String>,
    pub config: serde_json::Value,
}

/// A unit of pipeline work.
///
/// Lifecycle fields sit behind a mutex so the scheduler, worker and
/// `Pipeline::cancel` can observe and drive the same task concurrently.
#[derive(Debug)]
pub struct Task {
    id: String,
    priority: TaskPriority,
    kind: TaskKind,
    created_at: DateTime<Utc>,
    state: Mutex<TaskState>,
}

impl Task {
    /// Creates a pending task with a fresh UUID and medium priority.
    pub fn new(kind: TaskKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            priority: TaskPriority::default(),
            kind,
            created_at: Utc::now(),
            state: Mutex::new(TaskState {
                status: TaskStatus::Pending,
                progress: 0.0,
                started_at: None,
                completed_at: None,
                error: None,
                result: None,
            }),
        }
    }

    /// Crawl `max_results` records matching `query` from a named source.
    pub fn crawl(source_name: impl Into<String>, query: impl Into<String>, max_results: usize) -> Self {
        Self::new(TaskKind::Crawl(CrawlParams {
            source_name: source_name.into(),
            query: query.into(),
            max_results,
        }))
    }

    /// Run upstream records through a named parser.
    pub fn parse(parser_name: impl Into<String>) -> Self {
        Self::new(TaskKind::Parse(ParseParams {
            parser_name: parser_name.into(),
        }))
    }

    /// Run upstream records through a named tagger.
    pub fn tag(tagger_name: impl Into<String>) -> Self {
        Self::new(TaskKind::Tag(TagParams {
            tagger_name: tagger_name.into(),
        }))
    }

    /// Persist upstream records in a named storage.
    pub fn store(storage_name: impl Into<String>) -> Self {
        Self::new(TaskKind::Store(StoreParams {
            storage_name: storage_name.into(),
        }))
    }

    /// Wraps a caller-defined body.
    pub fn custom(body: impl TaskBody + 'static) -> Self {
        Self::new(TaskKind::Custom(Arc::new(body)))
    }

    /// Overrides the generated id. Only meaningful before the task is added
    /// to a pipeline.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> TaskStatus {
        self.lock().status
    }

    pub fn progress(&self) -> f64 {
        self.lock().progress
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn result(&self) -> Option<TaskOutput> {
        self.lock().result.clone()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.lock().started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.lock().completed_at
    }

    /// Execution duration in seconds, once the task has both started and finished.
    pub fn duration_secs(&self) -> Option<f64> {
        let state = self.lock();
        match (state.started_at, state.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }

    /// Updates progress, clamped to [0.0, 1.0]. Ignored once terminal.
    pub fn set_progress(&self, progress: f64) {
        let mut state = self.lock();
        if !state.status.is_terminal() {
            state.progress = progress.clamp(0.0, 1.0);
        }
    }

    /// Checks the task configuration before scheduling.
    pub fn validate(&self) -> bool {
        self.kind.validate()
    }

    /// Performs the task's work against collaborators resolved from `context`.
    ///
    /// Does not touch lifecycle state; the pipeline drives transitions.
    pub async fn execute(
        &self,
        context: &ExecutionContext,
        input: &TaskInput,
    ) -> Result<TaskOutput, TaskError> {
        match &self.kind {
            TaskKind::Crawl(params) => stages::crawl(self, params, context).await,
            TaskKind::Parse(params) => stages::parse(self, params, context, input).await,
            TaskKind::Tag(params) => stages::tag(self, params, context, input).await,
            TaskKind::Store(params) => stages::store(self, params, context, input).await,
            TaskKind::Custom(body) => body.execute(self, context, input).await,
        }
    }

    /// PENDING -> RUNNING.
    pub fn start(&self) -> Result<(), TaskError> {
        self.transition(TaskStatus::Running, |state| {
            state.started_at = Some(Utc::now());
        })?;
        info!(task_id = %self.id, kind = self.kind.label(), "Task started");
        Ok(())
    }

    /// RUNNING -> COMPLETED, recording the result.
    pub fn complete(&self, result: TaskOutput) -> Result<(), TaskError> {
        self.transition(TaskStatus::Completed, |state| {
            state.completed_at = Some(Utc::now());
            state.progress = 1.0;
            state.result = Some(result);
        })?;
        info!(task_id = %self.id, kind = self.kind.label(), "Task completed");
        Ok(())
    }

    /// RUNNING or PENDING -> FAILED, recording the error message.
    pub fn fail(&self, message: impl Into<String>) -> Result<(), TaskError> {
        let message = message.into();
        self.transition(TaskStatus::Failed, |state| {
            state.completed_at = Some(Utc::now());
            state.error = Some(message.clone());
        })?;
        error!(task_id = %self.id, kind = self.kind.label(), error = %message, "Task failed");
        Ok(())
    }

    /// PENDING or RUNNING -> CANCELLED.
    pub fn cancel(&self) -> Result<(), TaskError> {
        self.transition(TaskStatus::Cancelled, |state| {
            state.completed_at = Some(Utc::now());
        })?;
        info!(task_id = %self.id, kind = self.kind.label(), "Task cancelled");
        Ok(())
    }

    /// Serializable view of the task's current state.
    pub fn snapshot(&self) -> TaskSnapshot {
        let duration_secs = self.duration_secs();
        let state = self.lock();
        TaskSnapshot {
            task_id: self.id.clone(),
            kind: self.kind.label().to_string(),
            priority: self.priority,
            status: state.status,
            progress: state.progress,
            created_at: self.created_at,
            started_at: state.started_at,
            completed_at: state.completed_at,
            duration_secs,
            error: state.error.clone(),
            config: self.kind.config(),
        }
    }

    fn transition(
        &self,
        next: TaskStatus,
        apply: impl FnOnce(&mut TaskState),
    ) -> Result<(), TaskError> {
        let mut state = self.lock();
        if !state.status.can_transition_to(next) {
            return Err(TaskError::InvalidTransition {
                task_id: self.id.clone(),
                from: state.status,
                to: next,
            });
        }
        state.status = next;
        apply(&mut state);
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TaskState> {
        self.state.lock().expect("task state lock not poisoned")
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {})", self.kind.label(), self.id, self.status())
    }
}
