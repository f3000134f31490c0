//! Workflow agent: collaborator registries, pipeline templates, execution
//! history and quality control behind one handle.
//!
//! All operations take `&self`; an agent can be shared behind an `Arc` and a
//! running pipeline cancelled from another task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::collaborators::{Parser, Source, Storage, Tagger};
use crate::error::AgentError;
use crate::models::PaperRecord;
use crate::quality::{QualityControl, QualityFilter, QualityReport};

use super::config::AgentConfig;
use super::context::Collaborators;
use super::history::{ExecutionHistory, ExecutionSummary};
use super::pipeline::{Pipeline, PipelineEvent, PipelineStats};
use super::task::{Task, TaskOutput};

/// Parameters for [`WorkflowAgent::create_extraction_pipeline`].
///
/// Stages run crawl -> parse -> tag -> store, each optional stage depending
/// on the one before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionPlan {
    pub name: String,
    pub source_name: String,
    pub query: String,
    pub max_records: usize,
    pub parser_name: Option<String>,
    pub tagger_name: Option<String>,
    pub storage_name: Option<String>,
}

impl ExtractionPlan {
    pub fn new(
        name: impl Into<String>,
        source_name: impl Into<String>,
        query: impl Into<String>,
        max_records: usize,
    ) -> Self {
        Self {
            name: name.into(),
            source_name: source_name.into(),
            query: query.into(),
            max_records,
            parser_name: None,
            tagger_name: None,
            storage_name: None,
        }
    }

    pub fn with_parser(mut self, parser_name: impl Into<String>) -> Self {
        self.parser_name = Some(parser_name.into());
        self
    }

    pub fn with_tagger(mut self, tagger_name: impl Into<String>) -> Self {
        self.tagger_name = Some(tagger_name.into());
        self
    }

    pub fn with_storage(mut self, storage_name: impl Into<String>) -> Self {
        self.storage_name = Some(storage_name.into());
        self
    }
}

/// Top-level orchestrator for extraction pipelines.
pub struct WorkflowAgent {
    config: AgentConfig,
    collaborators: Mutex<Collaborators>,
    pipelines: Mutex<HashMap<String, Arc<Pipeline>>>,
    history: Mutex<ExecutionHistory>,
    quality: Mutex<QualityControl>,
    events: Option<mpsc::UnboundedSender<PipelineEvent>>,
}

impl WorkflowAgent {
    /// Creates an agent after validating `config`.
    pub fn new(config: AgentConfig) -> Result<Self, AgentError> {
        config.validate()?;
        info!(
            max_workers = config.max_workers,
            timeout_secs = config.timeout_secs,
            deduplication = config.enable_deduplication,
            "Workflow agent initialized"
        );
        Ok(Self {
            quality: Mutex::new(QualityControl::new(config.enable_deduplication)),
            config,
            collaborators: Mutex::new(Collaborators::default()),
            pipelines: Mutex::new(HashMap::new()),
            history: Mutex::new(ExecutionHistory::new()),
            events: None,
        })
    }

    /// Forwards the lifecycle events of every pipeline this agent creates.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn register_source(&self, name: impl Into<String>, source: Arc<dyn Source>) {
        let name = name.into();
        info!(source = %name, "Registered source");
        self.lock_collaborators().sources.register(name, source);
    }

    pub fn register_parser(&self, name: impl Into<String>, parser: Arc<dyn Parser>) {
        let name = name.into();
        info!(parser = %name, "Registered parser");
        self.lock_collaborators().parsers.register(name, parser);
    }

    pub fn register_tagger(&self, name: impl Into<String>, tagger: Arc<dyn Tagger>) {
        let name = name.into();
        info!(tagger = %name, "Registered tagger");
        self.lock_collaborators().taggers.register(name, tagger);
    }

    pub fn register_storage(&self, name: impl Into<String>, storage: Arc<dyn Storage>) {
        let name = name.into();
        info!(storage = %name, "Registered storage");
        self.lock_collaborators().storages.register(name, storage);
    }

    /// Snapshot of the current registries.
    pub fn collaborators(&self) -> Collaborators {
        self.lock_collaborators().clone()
    }

    /// Builds and stores a linear extraction pipeline under `plan.name`.
    ///
    /// Fails before building anything if a named collaborator is missing. A
    /// pipeline already stored under the same name is replaced.
    pub fn create_extraction_pipeline(
        &self,
        plan: ExtractionPlan,
    ) -> Result<Arc<Pipeline>, AgentError> {
        let collaborators = self.collaborators();
        if !collaborators.sources.contains(&plan.source_name) {
            return Err(AgentError::SourceNotRegistered(plan.source_name));
        }
        if let Some(name) = plan.parser_name.as_ref().filter(|n| !collaborators.parsers.contains(n)) {
            return Err(AgentError::ParserNotRegistered(name.clone()));
        }
        if let Some(name) = plan.tagger_name.as_ref().filter(|n| !collaborators.taggers.contains(n)) {
            return Err(AgentError::TaggerNotRegistered(name.clone()));
        }
        if let Some(name) = plan
            .storage_name
            .as_ref()
            .filter(|n| !collaborators.storages.contains(n))
        {
            return Err(AgentError::StorageNotRegistered(name.clone()));
        }

        let mut pipeline = Pipeline::new(plan.name.clone(), self.config.pipeline_config());
        if let Some(events) = &self.events {
            pipeline = pipeline.with_events(events.clone());
        }
        pipeline.set_collaborators(collaborators);
        pipeline.add_context("query", serde_json::json!(plan.query));

        let crawl = pipeline.add_task(
            Task::crawl(&plan.source_name, &plan.query, plan.max_records),
            &[],
        );
        let mut previous = crawl.id().to_string();
        let stages = [
            plan.parser_name.as_deref().map(Task::parse),
            plan.tagger_name.as_deref().map(Task::tag),
            plan.storage_name.as_deref().map(Task::store),
        ];
        for task in stages.into_iter().flatten() {
            let added = pipeline.add_task(task, &[previous.as_str()]);
            previous = added.id().to_string();
        }

        let pipeline = Arc::new(pipeline);
        let replaced = self
            .lock_pipelines()
            .insert(plan.name.clone(), Arc::clone(&pipeline));
        if replaced.is_some() {
            warn!(pipeline = %plan.name, "Replaced existing pipeline with the same name");
        }
        info!(
            pipeline = %plan.name,
            source = %plan.source_name,
            query = %plan.query,
            tasks = pipeline.tasks().len(),
            "Created extraction pipeline"
        );
        Ok(pipeline)
    }

    /// Stores a caller-built pipeline under its name so it can be executed
    /// and tracked like a template-built one.
    pub fn add_pipeline(&self, pipeline: Pipeline) -> Arc<Pipeline> {
        let pipeline = Arc::new(pipeline);
        self.lock_pipelines()
            .insert(pipeline.name().to_string(), Arc::clone(&pipeline));
        pipeline
    }

    /// Executes a stored pipeline and appends a history entry whatever the
    /// outcome.
    pub async fn execute_pipeline(
        &self,
        name: &str,
    ) -> Result<HashMap<String, TaskOutput>, AgentError> {
        let pipeline = self
            .pipeline(name)
            .ok_or_else(|| AgentError::PipelineNotFound(name.to_string()))?;
        // Pick up collaborators registered after the pipeline was created.
        pipeline.set_collaborators(self.collaborators());

        let started_at = Utc::now();
        let started = Instant::now();
        info!(pipeline = %name, "Executing pipeline");
        let outcome = pipeline.execute().await;
        // A rejected re-run leaves the previous run's stats in place.
        let stats = pipeline.get_stats();
        let stats = stats.started_at.is_some_and(|t| t >= started_at).then_some(stats);

        let summary = ExecutionSummary {
            pipeline_name: name.to_string(),
            started_at,
            completed_at: Utc::now(),
            duration_secs: started.elapsed().as_secs_f64(),
            success: outcome.is_ok(),
            error: outcome.as_ref().err().map(|e| e.to_string()),
            results_count: outcome.as_ref().map(|r| r.len()).unwrap_or(0),
            stats,
        };
        self.lock_history().push(summary);

        match outcome {
            Ok(results) => {
                info!(pipeline = %name, results = results.len(), "Pipeline execution recorded");
                Ok(results)
            }
            Err(e) => {
                error!(pipeline = %name, error = %e, "Pipeline execution failed");
                Err(e.into())
            }
        }
    }

    /// Crawls `source_name`, optionally tags, and returns the records that
    /// pass quality control.
    pub async fn run_quick_extraction(
        &self,
        source_name: &str,
        query: &str,
        max_records: usize,
        tagger_name: Option<&str>,
    ) -> Result<Vec<PaperRecord>, AgentError> {
        let suffix = Uuid::new_v4().simple().to_string();
        let name = format!(
            "quick_extraction_{}_{}",
            Utc::now().format("%Y%m%d_%H%M%S"),
            &suffix[..8]
        );

        let mut plan = ExtractionPlan::new(&name, source_name, query, max_records);
        if let Some(tagger) = tagger_name {
            plan = plan.with_tagger(tagger);
        }
        let pipeline = self.create_extraction_pipeline(plan)?;

        if let Err(e) = self.execute_pipeline(&name).await {
            error!(pipeline = %name, error = %e, "Quick extraction failed");
            return Err(e);
        }

        Ok(self.apply_quality_control(pipeline.final_records()))
    }

    /// Deduplicates and filters records; see [`QualityControl`].
    pub fn apply_quality_control(&self, records: Vec<PaperRecord>) -> Vec<PaperRecord> {
        self.lock_quality().apply(records)
    }

    /// Like [`apply_quality_control`](Self::apply_quality_control) but reports
    /// why each dropped record was rejected.
    pub fn evaluate_quality(&self, records: Vec<PaperRecord>) -> QualityReport {
        self.lock_quality().evaluate(records)
    }

    pub fn add_quality_filter(&self, filter: QualityFilter) {
        info!(filter = filter.name(), "Added quality filter");
        self.lock_quality().add_filter(filter);
    }

    /// Completeness filter at the configured `quality_threshold`.
    pub fn threshold_filter(&self) -> QualityFilter {
        QualityFilter::completeness(self.config.quality_threshold)
    }

    pub fn get_execution_history(&self) -> Vec<ExecutionSummary> {
        self.lock_history().entries().to_vec()
    }

    pub fn history_for(&self, name: &str) -> Vec<ExecutionSummary> {
        self.lock_history().for_pipeline(name)
    }

    pub fn get_pipeline_status(&self, name: &str) -> Option<PipelineStats> {
        self.pipeline(name).map(|p| p.get_stats())
    }

    pub fn pipeline(&self, name: &str) -> Option<Arc<Pipeline>> {
        self.lock_pipelines().get(name).cloned()
    }

    pub fn pipeline_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock_pipelines().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn cancel_pipeline(&self, name: &str) -> Result<(), AgentError> {
        let pipeline = self
            .pipeline(name)
            .ok_or_else(|| AgentError::PipelineNotFound(name.to_string()))?;
        pipeline.cancel();
        Ok(())
    }

    /// Clears seen deduplication keys and execution history.
    ///
    /// Registries, stored pipelines and quality filters are kept.
    pub fn reset(&self) {
        self.lock_quality().reset();
        self.lock_history().clear();
        info!("Workflow agent state reset");
    }

    fn lock_collaborators(&self) -> MutexGuard<'_, Collaborators> {
        self.collaborators.lock().expect("lock not poisoned")
    }

    fn lock_pipelines(&self) -> MutexGuard<'_, HashMap<String, Arc<Pipeline>>> {
        self.pipelines.lock().expect("lock not poisoned")
    }

    fn lock_history(&self) -> MutexGuard<'_, ExecutionHistory> {
        self.history.lock().expect("lock not poisoned")
    }

    fn lock_quality(&self) -> MutexGuard<'_, QualityControl> {
        self.quality.lock().expect("lock not poisoned")
    }
}

impl std::fmt::Debug for WorkflowAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let collaborators = self.lock_collaborators();
        f.debug_struct("WorkflowAgent")
            .field("sources", &collaborators.sources.len())
            .field("parsers", &collaborators.parsers.len())
            .field("taggers", &collaborators.taggers.len())
            .field("storages", &collaborators.storages.len())
            .finish()
    }
}
