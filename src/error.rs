//! Error types for paper-forge operations.
//!
//! Defines the error taxonomy for every layer of the extraction workflow:
//! - Collaborator calls (sources, parsers, taggers, storages)
//! - Task lifecycle and execution
//! - Pipeline scheduling (deadlock, graph validation, timeouts, cancellation)
//! - Workflow agent orchestration

use std::time::Duration;

use thiserror::Error;

use crate::workflow::TaskStatus;

/// Errors raised by collaborator implementations.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("Source request failed: {0}")]
    Source(String),

    #[error("Parsing failed: {0}")]
    Parse(String),

    #[error("Tagging failed: {0}")]
    Tag(String),

    #[error("Storage operation failed: {0}")]
    Storage(String),

    #[error("Record '{0}' not found")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while a task moves through its lifecycle or executes.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task {task_id} validation failed")]
    Validation { task_id: String },

    #[error("{kind} '{name}' not available")]
    CollaboratorNotRegistered { kind: &'static str, name: String },

    #[error("{0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Invalid transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Failed(String),
}

impl TaskError {
    /// Creates a free-form execution failure.
    pub fn failed(message: impl Into<String>) -> Self {
        TaskError::Failed(message.into())
    }
}

/// Errors that can occur while scheduling and running a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline deadlock detected: no ready tasks and no running tasks (stranded: {stranded:?}, failed prerequisites: {failed_prerequisites:?})")]
    Deadlock {
        stranded: Vec<String>,
        failed_prerequisites: Vec<String>,
    },

    #[error("Cyclic dependency detected among tasks: {0:?}")]
    CyclicDependency(Vec<String>),

    #[error("Task '{task_id}' depends on unknown task '{dependency}'")]
    UnknownDependency { task_id: String, dependency: String },

    #[error("Duplicate task id '{0}'")]
    DuplicateTask(String),

    #[error("Timed out after {timeout:?} waiting for tasks {pending:?}")]
    Timeout {
        timeout: Duration,
        pending: Vec<String>,
    },

    #[error("Pipeline '{0}' was cancelled")]
    Cancelled(String),

    #[error("Pipeline '{0}' has already been executed")]
    AlreadyExecuted(String),

    #[error("Worker pool closed unexpectedly")]
    WorkerPoolClosed,
}

/// Errors surfaced by the workflow agent.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Source '{0}' not registered")]
    SourceNotRegistered(String),

    #[error("Parser '{0}' not registered")]
    ParserNotRegistered(String),

    #[error("Tagger '{0}' not registered")]
    TaggerNotRegistered(String),

    #[error("Storage '{0}' not registered")]
    StorageNotRegistered(String),

    #[error("Pipeline '{0}' not found")]
    PipelineNotFound(String),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::workflow::ConfigError),
}
