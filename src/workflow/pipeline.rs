//! DAG pipeline scheduler.
//!
//! A `Pipeline` owns a set of tasks and their prerequisite edges and runs them
//! with bounded parallelism. A task becomes ready once every prerequisite has
//! COMPLETED; ready tasks are dispatched in insertion order while fewer than
//! `max_workers` tasks are in flight. A failed task never makes its dependents
//! ready, so they stay PENDING and the run ends in a deadlock error naming
//! them.
//!
//! Runs are single-shot: once `execute` has been called, further calls return
//! `PipelineError::AlreadyExecuted`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::error::{PipelineError, TaskError};
use crate::metrics::MetricsCollector;
use crate::models::PaperRecord;

use super::context::{Collaborators, ExecutionContext};
use super::task::{Task, TaskInput, TaskOutput, TaskStatus};

/// Pipeline lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Initialized,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl PipelineStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineStatus::Completed | PipelineStatus::Failed | PipelineStatus::Cancelled
        )
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStatus::Initialized => write!(f, "initialized"),
            PipelineStatus::Running => write!(f, "running"),
            PipelineStatus::Completed => write!(f, "completed"),
            PipelineStatus::Failed => write!(f, "failed"),
            PipelineStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Scheduling parameters for a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Maximum number of tasks running at once. Values below 1 are treated as 1.
    pub max_workers: usize,
    /// Carried for callers; the scheduler does not retry failed tasks.
    pub retry_attempts: u32,
    /// Longest the scheduler waits for any single in-flight task to finish.
    pub timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            retry_attempts: 3,
            timeout: None,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_retry_attempts(mut self, retry_attempts: u32) -> Self {
        self.retry_attempts = retry_attempts;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Lifecycle notifications emitted while a pipeline runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    TaskStarted { task_id: String },
    TaskCompleted { task_id: String },
    TaskFailed { task_id: String, error: String },
    TaskCancelled { task_id: String },
    PipelineCompleted { name: String, results: usize },
    PipelineFailed { name: String, error: String },
}

/// Number of tasks in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl TaskCounts {
    fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::Running => self.running += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub fn get(&self, status: TaskStatus) -> usize {
        match status {
            TaskStatus::Pending => self.pending,
            TaskStatus::Running => self.running,
            TaskStatus::Completed => self.completed,
            TaskStatus::Failed => self.failed,
            TaskStatus::Cancelled => self.cancelled,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.running + self.completed + self.failed + self.cancelled
    }
}

/// Point-in-time statistics for a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStats {
    pub name: String,
    pub status: PipelineStatus,
    pub total_tasks: usize,
    pub task_counts: TaskCounts,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<f64>,
    pub results_count: usize,
}

struct PipelineGraph {
    tasks: Vec<Arc<Task>>,
    dependencies: HashMap<String, Vec<String>>,
    context: ExecutionContext,
}

struct RunState {
    status: PipelineStatus,
    executed: bool,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    results: HashMap<String, TaskOutput>,
}

/// Message a worker sends back to the scheduling loop.
struct Completion {
    task: Arc<Task>,
    outcome: Result<TaskOutput, TaskError>,
    elapsed: Option<Duration>,
}

/// Bookkeeping for one scheduling loop.
#[derive(Default)]
struct Progress {
    executing: HashSet<String>,
    finished: HashSet<String>,
    succeeded: HashSet<String>,
}

/// A named DAG of tasks with shared execution context.
pub struct Pipeline {
    name: String,
    config: PipelineConfig,
    graph: Mutex<PipelineGraph>,
    run: Mutex<RunState>,
    cancel_tx: watch::Sender<bool>,
    events: Option<mpsc::UnboundedSender<PipelineEvent>>,
    metrics: MetricsCollector,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, config: PipelineConfig) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            name: name.into(),
            config,
            graph: Mutex::new(PipelineGraph {
                tasks: Vec::new(),
                dependencies: HashMap::new(),
                context: ExecutionContext::default(),
            }),
            run: Mutex::new(RunState {
                status: PipelineStatus::Initialized,
                executed: false,
                started_at: None,
                completed_at: None,
                results: HashMap::new(),
            }),
            cancel_tx,
            events: None,
            metrics: MetricsCollector::new(),
        }
    }

    /// Streams lifecycle events to `events` during execution.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn status(&self) -> PipelineStatus {
        self.run_state().status
    }

    /// Adds a task that runs only after every task in `dependencies` completed.
    ///
    /// Returns a shared handle for inspecting the task later.
    pub fn add_task(&self, task: Task, dependencies: &[&str]) -> Arc<Task> {
        let task = Arc::new(task);
        let mut graph = self.graph_state();
        if !dependencies.is_empty() {
            graph.dependencies.insert(
                task.id().to_string(),
                dependencies.iter().map(|d| d.to_string()).collect(),
            );
        }
        graph.tasks.push(Arc::clone(&task));
        debug!(
            pipeline = %self.name,
            task_id = task.id(),
            kind = task.kind().label(),
            dependencies = dependencies.len(),
            "Added task to pipeline"
        );
        task
    }

    /// Stores a value in the context every task receives.
    pub fn add_context(&self, key: impl Into<String>, value: serde_json::Value) {
        self.graph_state().context.insert(key, value);
    }

    /// Replaces the collaborator registries stages resolve against.
    pub fn set_collaborators(&self, collaborators: Collaborators) {
        self.graph_state().context.set_collaborators(collaborators);
    }

    pub fn task(&self, task_id: &str) -> Option<Arc<Task>> {
        self.graph_state()
            .tasks
            .iter()
            .find(|t| t.id() == task_id)
            .cloned()
    }

    /// All tasks in insertion order.
    pub fn tasks(&self) -> Vec<Arc<Task>> {
        self.graph_state().tasks.clone()
    }

    pub fn tasks_by_status(&self, status: TaskStatus) -> Vec<Arc<Task>> {
        self.graph_state()
            .tasks
            .iter()
            .filter(|t| t.status() == status)
            .cloned()
            .collect()
    }

    /// Prerequisites declared for a task.
    pub fn dependencies_of(&self, task_id: &str) -> Vec<String> {
        self.graph_state()
            .dependencies
            .get(task_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Results of completed tasks, keyed by task id.
    pub fn results(&self) -> HashMap<String, TaskOutput> {
        self.run_state().results.clone()
    }

    /// Records produced by the last task, in insertion order, whose result
    /// is a record list. Later stages hold the more enriched copies.
    pub fn final_records(&self) -> Vec<PaperRecord> {
        let results = self.results();
        self.tasks()
            .iter()
            .rev()
            .find_map(|task| match results.get(task.id()) {
                Some(TaskOutput::Records(records)) => Some(records.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Checks the graph for duplicate ids, unknown prerequisites and cycles.
    pub fn validate_graph(&self) -> Result<(), PipelineError> {
        let graph = self.graph_state();
        check_graph(&graph.tasks, &graph.dependencies)
    }

    /// Runs every task whose prerequisites complete and returns the results
    /// of all completed tasks.
    ///
    /// # Errors
    ///
    /// - `Deadlock` when unfinished tasks can never become ready
    /// - `Timeout` when no in-flight task finishes within the configured timeout
    /// - `Cancelled` when `cancel` is called before or during the run
    /// - graph validation errors, before any task starts
    pub async fn execute(&self) -> Result<HashMap<String, TaskOutput>, PipelineError> {
        let (tasks, dependencies, context) = self.begin()?;
        let started = Instant::now();

        info!(
            pipeline = %self.name,
            tasks = tasks.len(),
            max_workers = self.config.max_workers,
            "Starting pipeline execution"
        );

        match self.run_tasks(&tasks, &dependencies, context).await {
            Ok(()) => {
                let results = {
                    let mut run = self.run_state();
                    run.status = PipelineStatus::Completed;
                    run.completed_at = Some(Utc::now());
                    run.results.clone()
                };
                info!(
                    pipeline = %self.name,
                    results = results.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Pipeline completed"
                );
                self.metrics.record_pipeline("completed", started.elapsed());
                self.emit(PipelineEvent::PipelineCompleted {
                    name: self.name.clone(),
                    results: results.len(),
                });
                Ok(results)
            }
            Err(e) => {
                let status = {
                    let mut run = self.run_state();
                    if run.status != PipelineStatus::Cancelled {
                        run.status = PipelineStatus::Failed;
                    }
                    run.completed_at.get_or_insert_with(Utc::now);
                    run.status
                };
                error!(pipeline = %self.name, error = %e, "Pipeline execution failed");
                self.metrics
                    .record_pipeline(&status.to_string(), started.elapsed());
                self.emit(PipelineEvent::PipelineFailed {
                    name: self.name.clone(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Cancels the pipeline.
    ///
    /// Every task not yet terminal is marked CANCELLED and no further tasks
    /// are dispatched. Work already in flight is not interrupted; its outcome
    /// is discarded.
    pub fn cancel(&self) {
        {
            let mut run = self.run_state();
            if matches!(run.status, PipelineStatus::Completed | PipelineStatus::Failed) {
                debug!(pipeline = %self.name, status = %run.status, "Cancel ignored, pipeline already finished");
                return;
            }
            run.status = PipelineStatus::Cancelled;
            run.completed_at = Some(Utc::now());
        }
        self.cancel_tx.send_replace(true);

        for task in self.tasks() {
            if !task.status().is_terminal() && task.cancel().is_ok() {
                self.metrics.record_task(task.kind().label(), "cancelled", None);
                self.emit(PipelineEvent::TaskCancelled {
                    task_id: task.id().to_string(),
                });
            }
        }
        info!(pipeline = %self.name, "Pipeline cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// Current statistics for the pipeline.
    pub fn get_stats(&self) -> PipelineStats {
        let tasks = self.tasks();
        let mut task_counts = TaskCounts::default();
        for task in &tasks {
            task_counts.record(task.status());
        }

        let run = self.run_state();
        let duration_secs = match (run.started_at, run.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            (Some(start), None) => Some((Utc::now() - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        };

        PipelineStats {
            name: self.name.clone(),
            status: run.status,
            total_tasks: tasks.len(),
            task_counts,
            started_at: run.started_at,
            completed_at: run.completed_at,
            duration_secs,
            results_count: run.results.len(),
        }
    }

    /// Claims the single run and snapshots the graph for it.
    #[allow(clippy::type_complexity)]
    fn begin(
        &self,
    ) -> Result<(Vec<Arc<Task>>, HashMap<String, Vec<String>>, Arc<ExecutionContext>), PipelineError>
    {
        let mut run = self.run_state();
        if run.executed {
            return Err(PipelineError::AlreadyExecuted(self.name.clone()));
        }
        if run.status == PipelineStatus::Cancelled || self.is_cancelled() {
            return Err(PipelineError::Cancelled(self.name.clone()));
        }
        run.executed = true;
        run.status = PipelineStatus::Running;
        run.started_at = Some(Utc::now());
        drop(run);

        let graph = self.graph_state();
        Ok((
            graph.tasks.clone(),
            graph.dependencies.clone(),
            Arc::new(graph.context.clone()),
        ))
    }

    async fn run_tasks(
        &self,
        tasks: &[Arc<Task>],
        dependencies: &HashMap<String, Vec<String>>,
        context: Arc<ExecutionContext>,
    ) -> Result<(), PipelineError> {
        check_graph(tasks, dependencies)?;

        let max_workers = self.config.max_workers.max(1);
        let (tx, mut rx) = mpsc::channel::<Completion>(max_workers);
        let mut cancel_rx = self.cancel_tx.subscribe();
        let mut progress = Progress::default();

        while progress.finished.len() < tasks.len() {
            if self.is_cancelled() {
                return Err(PipelineError::Cancelled(self.name.clone()));
            }

            for task in tasks {
                if progress.executing.len() >= max_workers {
                    break;
                }
                if !self.is_ready(task, dependencies, &progress) {
                    continue;
                }

                if !task.validate() {
                    let message = TaskError::Validation {
                        task_id: task.id().to_string(),
                    }
                    .to_string();
                    if task.fail(&message).is_ok() {
                        self.metrics.record_task(task.kind().label(), "failed", None);
                        self.emit(PipelineEvent::TaskFailed {
                            task_id: task.id().to_string(),
                            error: message,
                        });
                    }
                    progress.finished.insert(task.id().to_string());
                    continue;
                }

                let input = self.collect_input(task.id(), dependencies);
                progress.executing.insert(task.id().to_string());
                debug!(pipeline = %self.name, task_id = task.id(), "Submitted task for execution");
                self.spawn_worker(Arc::clone(task), Arc::clone(&context), input, tx.clone());
            }

            if progress.executing.is_empty() {
                if progress.finished.len() < tasks.len() {
                    return Err(self.deadlock(tasks, dependencies, &progress));
                }
                break;
            }

            let completion = match self.next_completion(&mut rx, &mut cancel_rx, &progress).await {
                Ok(completion) => completion,
                Err(e @ PipelineError::Timeout { .. }) => {
                    self.abandon_in_flight(tasks, &progress, &e.to_string());
                    return Err(e);
                }
                Err(e) => return Err(e),
            };
            self.resolve(completion, &mut progress);
            while let Ok(completion) = rx.try_recv() {
                self.resolve(completion, &mut progress);
            }
        }

        Ok(())
    }

    fn is_ready(
        &self,
        task: &Task,
        dependencies: &HashMap<String, Vec<String>>,
        progress: &Progress,
    ) -> bool {
        let id = task.id();
        if progress.finished.contains(id) || progress.executing.contains(id) {
            return false;
        }
        if task.status() != TaskStatus::Pending {
            return false;
        }
        dependencies
            .get(id)
            .map(|deps| deps.iter().all(|d| progress.succeeded.contains(d)))
            .unwrap_or(true)
    }

    fn collect_input(&self, task_id: &str, dependencies: &HashMap<String, Vec<String>>) -> TaskInput {
        let run = self.run_state();
        let upstream = dependencies
            .get(task_id)
            .map(|deps| {
                deps.iter()
                    .filter_map(|d| run.results.get(d).map(|out| (d.clone(), out.clone())))
                    .collect()
            })
            .unwrap_or_default();
        TaskInput::new(upstream)
    }

    fn spawn_worker(
        &self,
        task: Arc<Task>,
        context: Arc<ExecutionContext>,
        input: TaskInput,
        tx: mpsc::Sender<Completion>,
    ) {
        let events = self.events.clone();
        let metrics = self.metrics;

        tokio::spawn(async move {
            if let Err(e) = task.start() {
                // Cancelled between dispatch and pickup.
                let _ = tx
                    .send(Completion {
                        task,
                        outcome: Err(e),
                        elapsed: None,
                    })
                    .await;
                return;
            }
            metrics.inc_tasks_running();
            send_event(
                &events,
                PipelineEvent::TaskStarted {
                    task_id: task.id().to_string(),
                },
            );

            let started = Instant::now();
            let outcome = AssertUnwindSafe(task.execute(&context, &input))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(TaskError::Panicked(panic_message(panic.as_ref()))));
            metrics.dec_tasks_running();

            let _ = tx
                .send(Completion {
                    task,
                    outcome,
                    elapsed: Some(started.elapsed()),
                })
                .await;
        });
    }

    async fn next_completion(
        &self,
        rx: &mut mpsc::Receiver<Completion>,
        cancel_rx: &mut watch::Receiver<bool>,
        progress: &Progress,
    ) -> Result<Completion, PipelineError> {
        let received = async {
            match self.config.timeout {
                Some(timeout) => tokio::time::timeout(timeout, rx.recv()).await.map_err(|_| {
                    let mut pending: Vec<String> = progress.executing.iter().cloned().collect();
                    pending.sort();
                    PipelineError::Timeout { timeout, pending }
                }),
                None => Ok(rx.recv().await),
            }
        };

        tokio::select! {
            received = received => received?.ok_or(PipelineError::WorkerPoolClosed),
            _ = cancel_rx.wait_for(|cancelled| *cancelled) => {
                Err(PipelineError::Cancelled(self.name.clone()))
            }
        }
    }

    /// Fails every dispatched task after a timeout. Workers still running are
    /// left to finish; their outcomes are dropped.
    fn abandon_in_flight(&self, tasks: &[Arc<Task>], progress: &Progress, message: &str) {
        for task in tasks.iter().filter(|t| progress.executing.contains(t.id())) {
            if task.fail(message).is_ok() {
                self.metrics.record_task(task.kind().label(), "failed", None);
                self.emit(PipelineEvent::TaskFailed {
                    task_id: task.id().to_string(),
                    error: message.to_string(),
                });
            }
        }
    }

    fn resolve(&self, completion: Completion, progress: &mut Progress) {
        let Completion {
            task,
            outcome,
            elapsed,
        } = completion;
        let task_id = task.id().to_string();
        progress.executing.remove(&task_id);
        progress.finished.insert(task_id.clone());

        match outcome {
            Ok(output) => match task.complete(output.clone()) {
                Ok(()) => {
                    self.run_state().results.insert(task_id.clone(), output);
                    progress.succeeded.insert(task_id.clone());
                    self.metrics
                        .record_task(task.kind().label(), "completed", elapsed);
                    self.emit(PipelineEvent::TaskCompleted { task_id });
                }
                Err(e) => {
                    warn!(pipeline = %self.name, task_id = %task_id, error = %e, "Discarding result of task that is no longer running");
                }
            },
            Err(err) => {
                let message = err.to_string();
                if task.fail(&message).is_ok() {
                    self.metrics
                        .record_task(task.kind().label(), "failed", elapsed);
                    self.emit(PipelineEvent::TaskFailed {
                        task_id,
                        error: message,
                    });
                } else {
                    debug!(pipeline = %self.name, task_id = %task_id, error = %message, "Ignoring outcome of finished task");
                }
            }
        }
    }

    fn deadlock(
        &self,
        tasks: &[Arc<Task>],
        dependencies: &HashMap<String, Vec<String>>,
        progress: &Progress,
    ) -> PipelineError {
        let stranded: Vec<String> = tasks
            .iter()
            .filter(|t| !progress.finished.contains(t.id()))
            .map(|t| t.id().to_string())
            .collect();

        let blocking: HashSet<&str> = stranded
            .iter()
            .filter_map(|id| dependencies.get(id))
            .flatten()
            .map(String::as_str)
            .filter(|d| progress.finished.contains(*d) && !progress.succeeded.contains(*d))
            .collect();
        let failed_prerequisites: Vec<String> = tasks
            .iter()
            .filter(|t| blocking.contains(t.id()))
            .map(|t| t.id().to_string())
            .collect();

        warn!(
            pipeline = %self.name,
            stranded = ?stranded,
            failed_prerequisites = ?failed_prerequisites,
            "No ready or running tasks remain"
        );
        PipelineError::Deadlock {
            stranded,
            failed_prerequisites,
        }
    }

    fn emit(&self, event: PipelineEvent) {
        send_event(&self.events, event);
    }

    fn graph_state(&self) -> MutexGuard<'_, PipelineGraph> {
        self.graph.lock().expect("pipeline graph lock not poisoned")
    }

    fn run_state(&self) -> MutexGuard<'_, RunState> {
        self.run.lock().expect("pipeline run lock not poisoned")
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("status", &self.status())
            .finish()
    }
}

fn send_event(events: &Option<mpsc::UnboundedSender<PipelineEvent>>, event: PipelineEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Kahn's algorithm over the declared edges.
fn check_graph(
    tasks: &[Arc<Task>],
    dependencies: &HashMap<String, Vec<String>>,
) -> Result<(), PipelineError> {
    let mut ids: HashSet<&str> = HashSet::with_capacity(tasks.len());
    for task in tasks {
        if !ids.insert(task.id()) {
            return Err(PipelineError::DuplicateTask(task.id().to_string()));
        }
    }

    let mut in_degree: HashMap<&str, usize> = ids.iter().map(|id| (*id, 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for task in tasks {
        let Some(deps) = dependencies.get(task.id()) else {
            continue;
        };
        let unique: HashSet<&str> = deps.iter().map(String::as_str).collect();
        for dep in unique {
            if !ids.contains(dep) {
                return Err(PipelineError::UnknownDependency {
                    task_id: task.id().to_string(),
                    dependency: dep.to_string(),
                });
            }
            *in_degree.entry(task.id()).or_default() += 1;
            dependents.entry(dep).or_default().push(task.id());
        }
    }

    let mut queue: VecDeque<&str> = tasks
        .iter()
        .map(|t| t.id())
        .filter(|id| in_degree.get(id).copied() == Some(0))
        .collect();
    let mut visited = 0usize;
    while let Some(id) = queue.pop_front() {
        visited += 1;
        for dependent in dependents.get(id).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(*dependent);
                }
            }
        }
    }

    if visited < tasks.len() {
        let cycle = tasks
            .iter()
            .map(|t| t.id())
            .filter(|id| in_degree.get(id).copied().unwrap_or(0) > 0)
            .map(str::to_string)
            .collect();
        return Err(PipelineError::CyclicDependency(cycle));
    }
    Ok(())
}
