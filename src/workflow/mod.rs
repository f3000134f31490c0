//! Task/pipeline workflow engine.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     WorkflowAgent                       │
//! │  registries · pipeline templates · history · QC         │
//! └────────────────────────────┬────────────────────────────┘
//!                              │ create / execute
//!                              ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                        Pipeline                         │
//! │  DAG of tasks · scheduling loop · completion channel    │
//! └────────────────────────────┬────────────────────────────┘
//!                              │ spawn (≤ max_workers)
//!                              ▼
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │  Crawl   │──▶│  Parse   │──▶│   Tag    │──▶│  Store   │
//! └──────────┘   └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use paper_forge::workflow::{AgentConfig, ExtractionPlan, WorkflowAgent};
//!
//! let agent = WorkflowAgent::new(AgentConfig::default())?;
//! agent.register_source("local", Arc::new(source));
//! agent.create_extraction_pipeline(ExtractionPlan::new("nightly", "local", "hedging", 20))?;
//! let results = agent.execute_pipeline("nightly").await?;
//! ```

pub mod agent;
pub mod config;
pub mod context;
pub mod history;
pub mod pipeline;
mod stages;
pub mod task;

pub use agent::{ExtractionPlan, WorkflowAgent};
pub use config::{AgentConfig, ConfigError};
pub use context::{Collaborators, ExecutionContext, Registry};
pub use history::{ExecutionHistory, ExecutionSummary};
pub use pipeline::{
    Pipeline, PipelineConfig, PipelineEvent, PipelineStats, PipelineStatus, TaskCounts,
};
pub use task::{
    CrawlParams, ParseParams, StoreParams, TagParams, Task, TaskBody, TaskInput, TaskKind,
    TaskOutput, TaskPriority, TaskSnapshot, TaskStatus,
};
