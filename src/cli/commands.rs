//! CLI command definitions for paper-forge.
//!
//! `extract` runs a crawl -> parse -> tag -> store pipeline over a local
//! record file and prints the records that pass quality control; `search`
//! queries a JSON store.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::metrics::{export_metrics, init_metrics};
use crate::models::PaperRecord;
use crate::parsers::TextParser;
use crate::quality::Rejection;
use crate::sources::JsonFileSource;
use crate::storage::{JsonStorage, SearchQuery, DEFAULT_SEARCH_LIMIT};
use crate::tagger::{RuleTagger, TaggerRules};
use crate::workflow::{AgentConfig, ExtractionPlan, PipelineStats, WorkflowAgent};

/// Default directory for the JSON store.
const DEFAULT_STORE_DIR: &str = "./data";

const PIPELINE_NAME: &str = "extract";
const SOURCE_NAME: &str = "input";
const PARSER_NAME: &str = "text";
const TAGGER_NAME: &str = "rules";
const STORAGE_NAME: &str = "json";

/// Research paper extraction toolkit.
#[derive(Parser)]
#[command(name = "paper-forge")]
#[command(about = "Crawl, parse, tag and store research papers")]
#[command(version)]
#[command(
    long_about = "paper-forge runs extraction pipelines over research paper records.\n\nExample usage:\n  paper-forge extract --input papers.jsonl --query \"momentum\" --tag --store ./data\n  paper-forge search --store ./data momentum --category \"Equity\""
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run an extraction pipeline over a local JSON/JSONL record file.
    #[command(alias = "run")]
    Extract(ExtractArgs),

    /// Search records in a JSON store.
    Search(SearchArgs),
}

/// Arguments for `paper-forge extract`.
#[derive(Parser, Debug)]
pub struct ExtractArgs {
    /// JSON array or JSONL file of records to crawl.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Search query; every term must appear in title or abstract. `*` matches all.
    #[arg(short, long, default_value = "*")]
    pub query: String,

    /// Maximum number of records to crawl.
    #[arg(short = 'n', long, default_value = "50")]
    pub max_results: usize,

    /// Normalise record text before tagging.
    #[arg(long)]
    pub parse: bool,

    /// Tag records with the rule-based tagger.
    #[arg(long)]
    pub tag: bool,

    /// YAML file of tagging rules (implies --tag).
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Store every crawled record, after parsing and tagging, in a JSON store
    /// at this directory. Quality control runs afterwards and does not affect
    /// what is stored.
    #[arg(short, long)]
    pub store: Option<PathBuf>,

    /// YAML agent configuration. Defaults to PAPER_FORGE_* environment variables.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the number of concurrent tasks.
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Drop records whose completeness is below the configured quality threshold.
    #[arg(long)]
    pub completeness_filter: bool,

    /// Print a JSON report (records, rejections, pipeline stats) instead of records only.
    #[arg(short = 'j', long)]
    pub json: bool,

    /// Print Prometheus metrics to stderr after the run.
    #[arg(long)]
    pub metrics: bool,
}

/// Arguments for `paper-forge search`.
#[derive(Parser, Debug)]
pub struct SearchArgs {
    /// Text terms to search for.
    pub text: Option<String>,

    /// Store directory.
    #[arg(short, long, default_value = DEFAULT_STORE_DIR)]
    pub store: PathBuf,

    /// Only records in this category (repeatable; any match).
    #[arg(short, long)]
    pub category: Vec<String>,

    /// Only records with this tag (repeatable; any match).
    #[arg(short, long)]
    pub tag: Vec<String>,

    /// Maximum number of results.
    #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
    pub limit: usize,

    /// Rebuild the index from record files before searching.
    #[arg(long)]
    pub rebuild: bool,
}

#[derive(Debug, Serialize)]
struct ExtractReport {
    pipeline: PipelineStats,
    crawled: usize,
    kept: Vec<PaperRecord>,
    rejected: Vec<Rejection>,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Extract(args) => run_extract_command(args).await,
        Commands::Search(args) => run_search_command(args).await,
    }
}

fn load_config(args: &ExtractArgs) -> anyhow::Result<AgentConfig> {
    let mut config = match &args.config {
        Some(path) => AgentConfig::from_yaml_file(path)?,
        None => AgentConfig::from_env()?,
    };
    if let Some(workers) = args.workers {
        config = config.with_max_workers(workers);
    }
    Ok(config)
}

async fn run_extract_command(args: ExtractArgs) -> anyhow::Result<()> {
    if !args.input.exists() {
        anyhow::bail!("Input file does not exist: {}", args.input.display());
    }
    if args.metrics {
        init_metrics()?;
    }

    let agent = WorkflowAgent::new(load_config(&args)?)?;
    agent.register_source(SOURCE_NAME, Arc::new(JsonFileSource::new(&args.input)));

    let mut plan = ExtractionPlan::new(PIPELINE_NAME, SOURCE_NAME, &args.query, args.max_results);
    if args.parse {
        agent.register_parser(PARSER_NAME, Arc::new(TextParser::new(PARSER_NAME)));
        plan = plan.with_parser(PARSER_NAME);
    }
    if args.tag || args.rules.is_some() {
        let rules = match &args.rules {
            Some(path) => TaggerRules::from_yaml_file(path)?,
            None => TaggerRules::default(),
        };
        agent.register_tagger(TAGGER_NAME, Arc::new(RuleTagger::new(TAGGER_NAME, &rules)?));
        plan = plan.with_tagger(TAGGER_NAME);
    }
    if let Some(dir) = &args.store {
        agent.register_storage(STORAGE_NAME, Arc::new(JsonStorage::open(dir).await?));
        plan = plan.with_storage(STORAGE_NAME);
    }
    if args.completeness_filter {
        agent.add_quality_filter(agent.threshold_filter());
    }

    let pipeline = agent.create_extraction_pipeline(plan)?;
    agent.execute_pipeline(PIPELINE_NAME).await?;

    let crawled = pipeline.final_records();
    let report = agent.evaluate_quality(crawled.clone());
    for rejection in &report.rejected {
        warn!(record = %rejection.record_id, reason = %rejection.reason, "Record rejected");
    }
    info!(
        crawled = crawled.len(),
        kept = report.admitted.len(),
        rejected = report.rejected.len(),
        "Extraction finished"
    );

    let output = if args.json {
        serde_json::to_string_pretty(&ExtractReport {
            pipeline: pipeline.get_stats(),
            crawled: crawled.len(),
            kept: report.admitted,
            rejected: report.rejected,
        })
    } else {
        serde_json::to_string_pretty(&report.admitted)
    }
    .map_err(|e| anyhow::anyhow!("Failed to serialize output: {}", e))?;
    println!("{}", output);

    if args.metrics {
        eprintln!("{}", export_metrics());
    }
    Ok(())
}

async fn run_search_command(args: SearchArgs) -> anyhow::Result<()> {
    if !args.store.exists() {
        anyhow::bail!("Store directory does not exist: {}", args.store.display());
    }

    let storage = JsonStorage::open(&args.store).await?;
    if args.rebuild {
        let count = storage.rebuild_index().await?;
        info!(papers = count, "Index rebuilt");
    }

    let mut query = SearchQuery::new().with_limit(args.limit);
    if let Some(text) = &args.text {
        query = query.with_text(text);
    }
    query.categories = args.category;
    query.tags = args.tag;

    let records = storage.search(&query).await?;
    info!(matches = records.len(), "Search finished");
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}
