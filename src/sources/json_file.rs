//! Source backed by a local JSON or JSON Lines file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};

use crate::collaborators::Source;
use crate::error::CollaboratorError;
use crate::models::PaperRecord;

use super::matches_query;

/// Reads records from a file holding either a JSON array of records or one
/// record per line (JSONL). The file is re-read on every search.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads every record in the file.
    ///
    /// Unparseable JSONL lines are skipped with a warning; a malformed JSON
    /// array is an error.
    pub async fn load(&self) -> Result<Vec<PaperRecord>, CollaboratorError> {
        let raw = fs::read_to_string(&self.path).await.map_err(|e| {
            CollaboratorError::Source(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        let source_name = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("json")
            .to_string();

        let mut records: Vec<PaperRecord> = if raw.trim_start().starts_with('[') {
            serde_json::from_str(&raw)?
        } else {
            raw.lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .filter_map(|(number, line)| match serde_json::from_str(line) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!(
                            path = %self.path.display(),
                            line = number + 1,
                            error = %e,
                            "Skipping malformed record line"
                        );
                        None
                    }
                })
                .collect()
        };

        for record in &mut records {
            if record.source.is_none() {
                record.source = Some(source_name.clone());
            }
        }
        debug!(path = %self.path.display(), count = records.len(), "Loaded records");
        Ok(records)
    }
}

#[async_trait]
impl Source for JsonFileSource {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<PaperRecord>, CollaboratorError> {
        let records = self.load().await?;
        Ok(records
            .into_iter()
            .filter(|r| matches_query(r, query))
            .take(max_results)
            .collect())
    }
}
