//! paper-forge: crawl, parse, tag and store research documents.
//!
//! The core is a DAG task scheduler ([`workflow::Pipeline`]) driven by a
//! [`workflow::WorkflowAgent`] that wires named collaborators (sources,
//! parsers, taggers, storages) into extraction pipelines and deduplicates
//! their output through [`quality::QualityControl`].

// Core modules
pub mod cli;
pub mod collaborators;
pub mod error;
pub mod metrics;
pub mod models;
pub mod parsers;
pub mod quality;
pub mod sources;
pub mod storage;
pub mod tagger;
pub mod workflow;

// Re-export commonly used types
pub use collaborators::{Parser, Source, Storage, Tagger};
pub use error::{AgentError, CollaboratorError, PipelineError, TaskError};
pub use models::PaperRecord;
pub use workflow::{
    AgentConfig, ExtractionPlan, Pipeline, PipelineConfig, Task, TaskOutput, TaskStatus,
    WorkflowAgent,
};
