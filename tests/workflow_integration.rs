//! End-to-end tests for the scheduler, the workflow agent and the bundled
//! collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use paper_forge::collaborators::{Source, Storage};
use paper_forge::error::{AgentError, CollaboratorError, PipelineError, TaskError};
use paper_forge::models::PaperRecord;
use paper_forge::parsers::TextParser;
use paper_forge::sources::{JsonFileSource, StaticSource};
use paper_forge::storage::{JsonStorage, SearchQuery};
use paper_forge::tagger::RuleTagger;
use paper_forge::workflow::{
    AgentConfig, ExecutionContext, ExtractionPlan, Pipeline, PipelineConfig, PipelineEvent,
    PipelineStatus, Task, TaskBody, TaskInput, TaskOutput, TaskStatus, WorkflowAgent,
};

// ============================================================================
// Helpers
// ============================================================================

struct Returns(&'static str);

#[async_trait]
impl TaskBody for Returns {
    async fn execute(
        &self,
        _task: &Task,
        _context: &ExecutionContext,
        _input: &TaskInput,
    ) -> Result<TaskOutput, TaskError> {
        Ok(TaskOutput::Value(json!(self.0)))
    }
}

struct FailsWith(&'static str);

#[async_trait]
impl TaskBody for FailsWith {
    async fn execute(
        &self,
        _task: &Task,
        _context: &ExecutionContext,
        _input: &TaskInput,
    ) -> Result<TaskOutput, TaskError> {
        Err(TaskError::failed(self.0))
    }
}

/// Tracks how many bodies run at once.
struct Gauge {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl TaskBody for Gauge {
    async fn execute(
        &self,
        _task: &Task,
        _context: &ExecutionContext,
        _input: &TaskInput,
    ) -> Result<TaskOutput, TaskError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(TaskOutput::Value(json!(now)))
    }
}

/// Source that answers every query with a fixed list.
struct Fixed(Vec<PaperRecord>);

#[async_trait]
impl Source for Fixed {
    async fn search(
        &self,
        _query: &str,
        max_results: usize,
    ) -> Result<Vec<PaperRecord>, CollaboratorError> {
        Ok(self.0.iter().take(max_results).cloned().collect())
    }
}

fn paper(external_id: &str, title: &str) -> PaperRecord {
    PaperRecord::new(title)
        .with_external_id(external_id)
        .with_abstract(format!(
            "{} studied with high-frequency data and machine learning methods across markets.",
            title
        ))
}

fn drain(rx: &mut mpsc::UnboundedReceiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn task_events(events: &[PipelineEvent]) -> HashMap<String, Vec<&'static str>> {
    let mut by_task: HashMap<String, Vec<&'static str>> = HashMap::new();
    for event in events {
        let (id, label) = match event {
            PipelineEvent::TaskStarted { task_id } => (task_id, "started"),
            PipelineEvent::TaskCompleted { task_id } => (task_id, "completed"),
            PipelineEvent::TaskFailed { task_id, .. } => (task_id, "failed"),
            PipelineEvent::TaskCancelled { task_id } => (task_id, "cancelled"),
            _ => continue,
        };
        by_task.entry(id.clone()).or_default().push(label);
    }
    by_task
}

fn position(events: &[PipelineEvent], wanted: &PipelineEvent) -> usize {
    events
        .iter()
        .position(|e| e == wanted)
        .unwrap_or_else(|| panic!("event {:?} not emitted", wanted))
}

// ============================================================================
// Scheduler properties
// ============================================================================

#[tokio::test]
async fn test_status_sequences_are_lifecycle_prefixes() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let pipeline = Pipeline::new("lifecycle", PipelineConfig::new().with_max_workers(2))
        .with_events(tx);
    pipeline.add_task(Task::custom(Returns("ok")).with_id("a"), &[]);
    pipeline.add_task(Task::custom(FailsWith("nope")).with_id("b"), &[]);
    pipeline.add_task(Task::custom(Returns("ok")).with_id("c"), &["a"]);
    pipeline.add_task(Task::custom(Returns("ok")).with_id("d"), &["b"]);

    assert!(pipeline.execute().await.is_err());
    let by_task = task_events(&drain(&mut rx));

    for task in pipeline.tasks() {
        let observed = by_task.get(task.id()).cloned().unwrap_or_default();
        let allowed: &[&[&str]] = &[
            &[],
            &["started", "completed"],
            &["started", "failed"],
            &["cancelled"],
        ];
        assert!(
            allowed.contains(&observed.as_slice()),
            "task {} observed {:?}",
            task.id(),
            observed
        );

        if task.status().is_terminal() {
            assert!(task.start().is_err());
            assert!(task.cancel().is_err());
        }
    }
    assert_eq!(pipeline.task("d").expect("d").status(), TaskStatus::Pending);
}

#[tokio::test]
async fn test_running_tasks_never_exceed_max_workers() {
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let pipeline = Pipeline::new("bounded", PipelineConfig::new().with_max_workers(3));
    for _ in 0..12 {
        pipeline.add_task(
            Task::custom(Gauge {
                current: Arc::clone(&current),
                peak: Arc::clone(&peak),
            }),
            &[],
        );
    }

    let results = pipeline.execute().await.expect("pipeline succeeds");
    assert_eq!(results.len(), 12);
    let peak = peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {} exceeded 3", peak);
    assert!(peak >= 2, "tasks never overlapped");
}

#[tokio::test]
async fn test_dependent_starts_only_after_prerequisite_completes() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let pipeline = Pipeline::new("ordered", PipelineConfig::new().with_max_workers(4))
        .with_events(tx);
    pipeline.add_task(Task::custom(Returns("a")).with_id("a"), &[]);
    pipeline.add_task(Task::custom(Returns("b")).with_id("b"), &["a"]);
    pipeline.add_task(Task::custom(Returns("c")).with_id("c"), &["a", "b"]);

    pipeline.execute().await.expect("pipeline succeeds");
    let events = drain(&mut rx);

    let a_done = position(&events, &PipelineEvent::TaskCompleted { task_id: "a".into() });
    let b_start = position(&events, &PipelineEvent::TaskStarted { task_id: "b".into() });
    let b_done = position(&events, &PipelineEvent::TaskCompleted { task_id: "b".into() });
    let c_start = position(&events, &PipelineEvent::TaskStarted { task_id: "c".into() });
    assert!(a_done < b_start);
    assert!(b_done < c_start);

    let a = pipeline.task("a").expect("a");
    let b = pipeline.task("b").expect("b");
    assert!(a.completed_at().expect("a completed") <= b.started_at().expect("b started"));
}

#[tokio::test]
async fn test_failure_is_isolated_and_strands_dependents() {
    let pipeline = Pipeline::new("isolation", PipelineConfig::default());
    pipeline.add_task(Task::custom(FailsWith("boom")).with_id("a"), &[]);
    pipeline.add_task(Task::custom(Returns("b")).with_id("b"), &["a"]);
    pipeline.add_task(Task::custom(Returns("c")).with_id("c"), &[]);

    let err = pipeline.execute().await.unwrap_err();
    match err {
        PipelineError::Deadlock {
            stranded,
            failed_prerequisites,
        } => {
            assert_eq!(stranded, vec!["b"]);
            assert_eq!(failed_prerequisites, vec!["a"]);
        }
        other => panic!("expected deadlock, got {other:?}"),
    }

    let a = pipeline.task("a").expect("a");
    assert_eq!(a.status(), TaskStatus::Failed);
    assert_eq!(a.error().as_deref(), Some("boom"));
    assert_eq!(pipeline.task("b").expect("b").status(), TaskStatus::Pending);
    assert_eq!(pipeline.task("c").expect("c").status(), TaskStatus::Completed);
    assert_eq!(pipeline.status(), PipelineStatus::Failed);
}

#[tokio::test]
async fn test_successful_run_returns_one_result_per_task() {
    let pipeline = Pipeline::new("complete", PipelineConfig::new().with_max_workers(2));
    let mut previous: Option<String> = None;
    for i in 0..6 {
        let deps: Vec<&str> = previous.iter().map(String::as_str).collect();
        let task = pipeline.add_task(Task::custom(Returns("v")).with_id(format!("t{i}")), &deps);
        if i % 2 == 0 {
            previous = Some(task.id().to_string());
        }
    }

    let results = pipeline.execute().await.expect("pipeline succeeds");
    assert_eq!(results.len(), 6);
    for task in pipeline.tasks() {
        assert!(results.contains_key(task.id()));
        assert_eq!(task.status(), TaskStatus::Completed);
    }
    assert_eq!(pipeline.get_stats().task_counts.completed, 6);
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_two_step_pipeline_returns_both_results() {
    let pipeline = Pipeline::new("two-step", PipelineConfig::default());
    pipeline.add_task(Task::custom(Returns("x")).with_id("T1"), &[]);
    pipeline.add_task(Task::custom(Returns("y")).with_id("T2"), &["T1"]);

    let results = pipeline.execute().await.expect("pipeline succeeds");
    assert_eq!(results.len(), 2);
    assert_eq!(results["T1"], TaskOutput::Value(json!("x")));
    assert_eq!(results["T2"], TaskOutput::Value(json!("y")));
}

#[tokio::test]
async fn test_failed_first_step_leaves_second_pending() {
    let pipeline = Pipeline::new("two-step-fail", PipelineConfig::default());
    pipeline.add_task(Task::custom(FailsWith("boom")).with_id("T1"), &[]);
    pipeline.add_task(Task::custom(Returns("y")).with_id("T2"), &["T1"]);

    assert!(pipeline.execute().await.is_err());
    let t1 = pipeline.task("T1").expect("T1");
    let t2 = pipeline.task("T2").expect("T2");
    assert_eq!(t1.status(), TaskStatus::Failed);
    assert_eq!(t1.error().as_deref(), Some("boom"));
    assert_eq!(t2.status(), TaskStatus::Pending);
    assert!(t2.started_at().is_none());
}

#[tokio::test]
async fn test_quick_extraction_returns_checked_records() {
    let agent = WorkflowAgent::new(AgentConfig::default()).expect("agent");
    let records = (0..5)
        .map(|i| paper(&format!("2301.0000{i}"), &format!("Transformer models for markets {i}")))
        .collect();
    agent.register_source("arxiv", Arc::new(Fixed(records)));

    let kept = agent
        .run_quick_extraction("arxiv", "transformer models", 5, None)
        .await
        .expect("extraction succeeds");
    assert_eq!(kept.len(), 5);
    for record in &kept {
        assert!(record.title.trim().chars().count() >= 10);
        assert!(record.abstract_text.as_deref().unwrap_or("").trim().chars().count() >= 50);
    }

    let history = agent.get_execution_history();
    assert_eq!(history.len(), 1);
    assert!(history[0].success);
    assert!(history[0].pipeline_name.starts_with("quick_extraction_"));
}

#[tokio::test]
async fn test_repeated_quick_extraction_drops_seen_ids() {
    let agent = WorkflowAgent::new(AgentConfig::default()).expect("agent");
    agent.register_source(
        "arxiv",
        Arc::new(Fixed(vec![paper("2301.12345", "Attention for limit order books")])),
    );

    let first = agent
        .run_quick_extraction("arxiv", "attention", 5, None)
        .await
        .expect("first run");
    assert_eq!(first.len(), 1);

    let second = agent
        .run_quick_extraction("arxiv", "attention", 5, None)
        .await
        .expect("second run");
    assert!(second
        .iter()
        .all(|r| r.external_id.as_deref() != Some("2301.12345")));

    agent.reset();
    let third = agent
        .run_quick_extraction("arxiv", "attention", 5, None)
        .await
        .expect("third run");
    assert_eq!(third.len(), 1);
}

#[tokio::test]
async fn test_cancel_before_execute_cancels_every_task() {
    let pipeline = Pipeline::new("cancelled", PipelineConfig::default());
    pipeline.add_task(Task::custom(Returns("a")).with_id("a"), &[]);
    pipeline.add_task(Task::custom(Returns("b")).with_id("b"), &["a"]);

    pipeline.cancel();
    assert!(matches!(
        pipeline.execute().await,
        Err(PipelineError::Cancelled(_))
    ));
    for task in pipeline.tasks() {
        assert_eq!(task.status(), TaskStatus::Cancelled);
    }
    assert!(pipeline.results().is_empty());
}

#[test]
fn test_duplicate_stable_keys_admit_first_only() {
    let agent = WorkflowAgent::new(AgentConfig::default()).expect("agent");
    let first = paper("2301.12345", "Deep hedging with recurrent networks");
    let mut second = paper("2301.12345", "Deep hedging with recurrent networks (v2)");
    second.id = "second".to_string();

    let kept = agent.apply_quality_control(vec![first.clone(), second]);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].id, first.id);
}

// ============================================================================
// Agent with bundled collaborators
// ============================================================================

#[tokio::test]
async fn test_file_to_store_extraction() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("papers.json");
    std::fs::write(
        &input,
        serde_json::to_string(&vec![
            paper("2402.00001", "Volatility   forecasting with\tneural networks"),
            paper("2402.00002", "Momentum and volatility in cryptocurrency markets"),
            paper("2402.00003", "Corporate governance and board structure"),
        ])
        .expect("serialize"),
    )
    .expect("write input");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let agent = WorkflowAgent::new(AgentConfig::default().with_max_workers(2))
        .expect("agent")
        .with_events(tx);
    let storage = Arc::new(JsonStorage::open(dir.path().join("store")).await.expect("store"));
    agent.register_source("local", Arc::new(JsonFileSource::new(&input)));
    agent.register_parser("text", Arc::new(TextParser::default()));
    agent.register_tagger("rules", Arc::new(RuleTagger::with_defaults("rules").expect("rules")));
    agent.register_storage("json", Arc::clone(&storage) as Arc<dyn Storage>);

    let pipeline = agent
        .create_extraction_pipeline(
            ExtractionPlan::new("nightly", "local", "volatility", 10)
                .with_parser("text")
                .with_tagger("rules")
                .with_storage("json"),
        )
        .expect("pipeline");
    assert_eq!(pipeline.tasks().len(), 4);

    let results = agent.execute_pipeline("nightly").await.expect("run");
    assert_eq!(results.len(), 4);

    let tagged = pipeline.final_records();
    assert_eq!(tagged.len(), 2);
    assert_eq!(tagged[0].title, "Volatility forecasting with neural networks");
    assert!(tagged.iter().all(|r| r.tags.contains(&"volatility".to_string())));
    assert!(tagged.iter().all(|r| r.metadata.contains_key("parser")));

    let store_task = pipeline.tasks().last().cloned().expect("store task");
    match &results[store_task.id()] {
        TaskOutput::StoredIds(ids) => assert_eq!(ids.len(), 2),
        other => panic!("expected stored ids, got {other:?}"),
    }
    let hits = storage
        .search(&SearchQuery::new().with_text("cryptocurrency"))
        .await
        .expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].external_id.as_deref(), Some("2402.00002"));

    let events = drain(&mut rx);
    assert!(events.contains(&PipelineEvent::PipelineCompleted {
        name: "nightly".into(),
        results: 4,
    }));
    assert_eq!(
        agent.get_pipeline_status("nightly").expect("stats").status,
        PipelineStatus::Completed
    );
}

#[tokio::test]
async fn test_unregistered_collaborator_fails_fast() {
    let agent = WorkflowAgent::new(AgentConfig::default()).expect("agent");
    agent.register_source("mem", Arc::new(StaticSource::new(vec![])));

    let err = agent
        .create_extraction_pipeline(ExtractionPlan::new("p", "mem", "q", 1).with_tagger("missing"))
        .unwrap_err();
    assert!(matches!(err, AgentError::TaggerNotRegistered(name) if name == "missing"));
    assert!(agent.pipeline("p").is_none());
}

#[tokio::test]
async fn test_empty_source_completes_with_no_records() {
    let agent = WorkflowAgent::new(AgentConfig::default()).expect("agent");
    agent.register_source("mem", Arc::new(StaticSource::new(vec![paper("1", "Carry trade returns")])));
    agent.register_tagger("rules", Arc::new(RuleTagger::with_defaults("rules").expect("rules")));

    let kept = agent
        .run_quick_extraction("mem", "nonexistent topic", 10, Some("rules"))
        .await
        .expect("run");
    assert!(kept.is_empty());
    assert_eq!(agent.get_execution_history().len(), 1);
}
