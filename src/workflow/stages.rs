//! Built-in stage bodies for crawl, parse, tag and store tasks.

use tracing::{debug, info, warn};

use crate::error::TaskError;
use crate::models::PaperRecord;

use super::context::ExecutionContext;
use super::task::{CrawlParams, ParseParams, StoreParams, TagParams, Task, TaskInput, TaskOutput};

pub(crate) async fn crawl(
    task: &Task,
    params: &CrawlParams,
    context: &ExecutionContext,
) -> Result<TaskOutput, TaskError> {
    let source = context.collaborators().sources.require(&params.source_name)?;

    let mut records = source.search(&params.query, params.max_results).await?;
    if records.len() > params.max_results {
        warn!(
            task_id = task.id(),
            source = %params.source_name,
            returned = records.len(),
            max_results = params.max_results,
            "Source returned more records than requested, truncating"
        );
        records.truncate(params.max_results);
    }
    for record in &mut records {
        if record.source.is_none() {
            record.source = Some(params.source_name.clone());
        }
    }

    task.set_progress(1.0);
    info!(
        task_id = task.id(),
        source = %params.source_name,
        query = %params.query,
        count = records.len(),
        "Crawled records"
    );
    Ok(TaskOutput::Records(records))
}

pub(crate) async fn parse(
    task: &Task,
    params: &ParseParams,
    context: &ExecutionContext,
    input: &TaskInput,
) -> Result<TaskOutput, TaskError> {
    let parser = context.collaborators().parsers.require(&params.parser_name)?;

    let records = input.records();
    let total = records.len();
    let mut parsed = Vec::with_capacity(total);
    let mut failures = 0usize;

    for (index, record) in records.into_iter().enumerate() {
        let original = record.clone();
        match parser.parse_record(record).await {
            Ok(record) => parsed.push(record),
            Err(e) => {
                failures += 1;
                warn!(
                    task_id = task.id(),
                    record = original.primary_id(),
                    error = %e,
                    "Failed to parse record, keeping original"
                );
                parsed.push(original);
            }
        }
        report_progress(task, index + 1, total);
    }

    finish_stage(task, "parse", total, failures);
    Ok(TaskOutput::Records(parsed))
}

pub(crate) async fn tag(
    task: &Task,
    params: &TagParams,
    context: &ExecutionContext,
    input: &TaskInput,
) -> Result<TaskOutput, TaskError> {
    let tagger = context.collaborators().taggers.require(&params.tagger_name)?;

    let records = input.records();
    let total = records.len();
    let mut tagged: Vec<PaperRecord> = Vec::with_capacity(total);
    let mut failures = 0usize;

    for (index, record) in records.into_iter().enumerate() {
        let original = record.clone();
        match tagger.tag_record(record).await {
            Ok(record) => tagged.push(record),
            Err(e) => {
                failures += 1;
                warn!(
                    task_id = task.id(),
                    record = original.primary_id(),
                    error = %e,
                    "Failed to tag record, keeping original"
                );
                tagged.push(original);
            }
        }
        report_progress(task, index + 1, total);
    }

    finish_stage(task, "tag", total, failures);
    Ok(TaskOutput::Records(tagged))
}

pub(crate) async fn store(
    task: &Task,
    params: &StoreParams,
    context: &ExecutionContext,
    input: &TaskInput,
) -> Result<TaskOutput, TaskError> {
    let storage = context.collaborators().storages.require(&params.storage_name)?;

    let records = input.records();
    let total = records.len();
    let mut stored_ids = Vec::with_capacity(total);
    let mut failures = 0usize;

    for (index, record) in records.iter().enumerate() {
        match storage.store_record(record).await {
            Ok(id) => stored_ids.push(id),
            Err(e) => {
                failures += 1;
                warn!(
                    task_id = task.id(),
                    record = record.primary_id(),
                    error = %e,
                    "Failed to store record, skipping"
                );
            }
        }
        report_progress(task, index + 1, total);
    }

    finish_stage(task, "store", total, failures);
    Ok(TaskOutput::StoredIds(stored_ids))
}

fn report_progress(task: &Task, done: usize, total: usize) {
    if total > 0 {
        task.set_progress(done as f64 / total as f64);
    }
}

fn finish_stage(task: &Task, stage: &str, total: usize, failures: usize) {
    task.set_progress(1.0);
    if total == 0 {
        debug!(task_id = task.id(), stage, "No upstream records to process");
    }
    info!(
        task_id = task.id(),
        stage,
        processed = total,
        failures,
        "Stage finished"
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::collaborators::{Parser, Source, Storage, Tagger};
    use crate::error::CollaboratorError;
    use crate::workflow::context::Collaborators;

    struct Flood;

    #[async_trait]
    impl Source for Flood {
        async fn search(
            &self,
            query: &str,
            _max_results: usize,
        ) -> Result<Vec<PaperRecord>, CollaboratorError> {
            Ok((0..10)
                .map(|i| PaperRecord::new(format!("{query} {i}")))
                .collect())
        }
    }

    /// Fails on every record whose title ends in an odd digit.
    struct Picky;

    fn is_odd(record: &PaperRecord) -> bool {
        record
            .title
            .chars()
            .last()
            .and_then(|c| c.to_digit(10))
            .map(|d| d % 2 == 1)
            .unwrap_or(false)
    }

    #[async_trait]
    impl Parser for Picky {
        async fn parse_record(&self, mut record: PaperRecord) -> Result<PaperRecord, CollaboratorError> {
            if is_odd(&record) {
                return Err(CollaboratorError::Parse("odd".into()));
            }
            record.content = Some("parsed".into());
            Ok(record)
        }
    }

    #[async_trait]
    impl Tagger for Picky {
        async fn tag_record(&self, mut record: PaperRecord) -> Result<PaperRecord, CollaboratorError> {
            if is_odd(&record) {
                return Err(CollaboratorError::Tag("odd".into()));
            }
            record.add_tag("even");
            Ok(record)
        }
    }

    #[async_trait]
    impl Storage for Picky {
        async fn store_record(&self, record: &PaperRecord) -> Result<String, CollaboratorError> {
            if is_odd(record) {
                return Err(CollaboratorError::Storage("odd".into()));
            }
            Ok(record.id.clone())
        }
    }

    fn context() -> ExecutionContext {
        let mut collaborators = Collaborators::default();
        collaborators.sources.register("flood", Arc::new(Flood));
        collaborators.parsers.register("picky", Arc::new(Picky));
        collaborators.taggers.register("picky", Arc::new(Picky));
        collaborators.storages.register("picky", Arc::new(Picky));
        ExecutionContext::new(collaborators)
    }

    fn upstream(count: usize) -> TaskInput {
        let records = (0..count).map(|i| PaperRecord::new(format!("paper {i}"))).collect();
        TaskInput::new(vec![("crawl".to_string(), TaskOutput::Records(records))])
    }

    #[tokio::test]
    async fn test_crawl_truncates_and_sets_source() {
        let task = Task::crawl("flood", "q", 3);
        let output = task.execute(&context(), &TaskInput::default()).await.expect("crawl");
        let records = output.records().expect("records").to_vec();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.source.as_deref() == Some("flood")));
        assert_eq!(task.progress(), 1.0);
    }

    #[tokio::test]
    async fn test_crawl_unknown_source() {
        let task = Task::crawl("nowhere", "q", 3);
        let err = task
            .execute(&context(), &TaskInput::default())
            .await
            .err()
            .expect("unknown source");
        assert_eq!(err.to_string(), "Source 'nowhere' not available");
    }

    #[tokio::test]
    async fn test_parse_keeps_originals_on_failure() {
        let task = Task::parse("picky");
        let output = task.execute(&context(), &upstream(4)).await.expect("parse");
        let records = output.records().expect("records");
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].content.as_deref(), Some("parsed"));
        assert!(records[1].content.is_none());
        assert_eq!(records[1].title, "paper 1");
    }

    #[tokio::test]
    async fn test_tag_keeps_originals_on_failure() {
        let task = Task::tag("picky");
        let output = task.execute(&context(), &upstream(3)).await.expect("tag");
        let records = output.records().expect("records");
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].tags, vec!["even"]);
        assert!(records[1].tags.is_empty());
    }

    #[tokio::test]
    async fn test_store_skips_failed_records() {
        let task = Task::store("picky");
        let output = task.execute(&context(), &upstream(4)).await.expect("store");
        match output {
            TaskOutput::StoredIds(ids) => assert_eq!(ids.len(), 2),
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stage_without_upstream_records() {
        let task = Task::parse("picky");
        let output = task
            .execute(&context(), &TaskInput::default())
            .await
            .expect("parse");
        assert!(output.is_empty());
        assert_eq!(task.progress(), 1.0);
    }
}
