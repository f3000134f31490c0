//! File-based JSON storage for paper records.
//!
//! Layout under the base directory:
//!
//! ```text
//! <base>/
//! ├── index.json                      # StorageIndex
//! ├── papers/<YYYY-MM>/<category>/<id>.json
//! └── backups/<id>_<timestamp>.json   # copies of deleted records
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::collaborators::Storage;
use crate::error::CollaboratorError;
use crate::models::PaperRecord;

use super::index::{IndexEntry, IndexStatistics, SearchQuery, StorageIndex};

const INDEX_FILE: &str = "index.json";
const PAPERS_DIR: &str = "papers";
const BACKUPS_DIR: &str = "backups";

/// Default number of backups kept after deletions.
pub const DEFAULT_MAX_BACKUPS: usize = 5;

/// Stores each record as a pretty-printed JSON file and keeps a search index.
///
/// Index updates are serialised through an async mutex; the index file is
/// rewritten after every mutation.
pub struct JsonStorage {
    base_dir: PathBuf,
    auto_backup: bool,
    max_backups: usize,
    index: Mutex<StorageIndex>,
}

impl std::fmt::Debug for JsonStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonStorage")
            .field("base_dir", &self.base_dir)
            .field("auto_backup", &self.auto_backup)
            .field("max_backups", &self.max_backups)
            .finish_non_exhaustive()
    }
}

impl JsonStorage {
    /// Opens (creating if needed) a store rooted at `base_dir`.
    ///
    /// A missing or unreadable index starts empty; call
    /// [`rebuild_index`](Self::rebuild_index) to recover it from the record files.
    pub async fn open(base_dir: impl Into<PathBuf>) -> Result<Self, CollaboratorError> {
        let base_dir = base_dir.into();
        fs::create_dir_all(base_dir.join(PAPERS_DIR))
            .await
            .map_err(|e| {
                CollaboratorError::Storage(format!(
                    "failed to create directory {}: {}",
                    base_dir.display(),
                    e
                ))
            })?;

        let index = load_index(&base_dir.join(INDEX_FILE)).await;
        info!(path = %base_dir.display(), papers = index.len(), "JSON storage opened");

        Ok(Self {
            base_dir,
            auto_backup: true,
            max_backups: DEFAULT_MAX_BACKUPS,
            index: Mutex::new(index),
        })
    }

    /// Configures backups taken before deletions.
    pub fn with_backups(mut self, enabled: bool, max_backups: usize) -> Self {
        self.auto_backup = enabled;
        self.max_backups = max_backups;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.base_dir.join(INDEX_FILE)
    }

    /// Loads a stored record by id, or `None` if it is not indexed or its file is gone.
    pub async fn get_record(&self, id: &str) -> Result<Option<PaperRecord>, CollaboratorError> {
        let path = {
            let index = self.index.lock().await;
            match index.get(id) {
                Some(entry) => entry.file_path.clone(),
                None => return Ok(None),
            }
        };

        match fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(id, path = %path.display(), "Indexed record file is missing");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes a stored record. Returns false if the id is unknown.
    pub async fn delete_record(&self, id: &str) -> Result<bool, CollaboratorError> {
        let mut index = self.index.lock().await;
        let path = match index.get(id) {
            Some(entry) => entry.file_path.clone(),
            None => return Ok(false),
        };

        if fs::try_exists(&path).await? {
            if self.auto_backup {
                if let Err(e) = self.backup(id, &path).await {
                    warn!(id, error = %e, "Failed to back up record before deletion");
                }
            }
            fs::remove_file(&path).await?;
        }

        index.remove(id);
        self.save_index(&index).await?;
        debug!(id, "Deleted record");
        Ok(true)
    }

    /// Returns the stored records matching `query`, in id order.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<PaperRecord>, CollaboratorError> {
        let ids = self.index.lock().await.search(query);

        let mut records = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(record) = self.get_record(id).await? {
                records.push(record);
            }
        }
        debug!(matches = records.len(), "Search completed");
        Ok(records)
    }

    /// Counts stored records carrying any of `categories` and any of `tags`.
    pub async fn count(&self, categories: &[String], tags: &[String]) -> usize {
        self.index.lock().await.count(categories, tags)
    }

    pub async fn categories(&self) -> Vec<String> {
        self.index.lock().await.categories()
    }

    pub async fn tags(&self) -> Vec<String> {
        self.index.lock().await.tags()
    }

    pub async fn statistics(&self) -> IndexStatistics {
        self.index.lock().await.statistics.clone()
    }

    /// Rebuilds the index from the record files on disk.
    ///
    /// Unreadable files are skipped with a warning. Returns the number of
    /// records indexed.
    pub async fn rebuild_index(&self) -> Result<usize, CollaboratorError> {
        info!(path = %self.base_dir.display(), "Rebuilding storage index");
        let papers_dir = self.base_dir.join(PAPERS_DIR);
        let files = tokio::task::spawn_blocking(move || record_files(&papers_dir))
            .await
            .map_err(|e| CollaboratorError::Storage(format!("index scan failed: {}", e)))?;

        let mut rebuilt = StorageIndex::new();
        for path in files {
            let record: PaperRecord = match fs::read_to_string(&path)
                .await
                .map_err(CollaboratorError::from)
                .and_then(|raw| serde_json::from_str(&raw).map_err(CollaboratorError::from))
            {
                Ok(record) => record,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable record file");
                    continue;
                }
            };
            let id = record.primary_id().to_string();
            rebuilt.insert(id, IndexEntry::from_record(&record, path));
        }

        let count = rebuilt.len();
        let mut index = self.index.lock().await;
        *index = rebuilt;
        self.save_index(&index).await?;
        info!(papers = count, "Storage index rebuilt");
        Ok(count)
    }

    fn record_path(&self, record: &PaperRecord) -> PathBuf {
        let month = record
            .published_at
            .unwrap_or_else(Utc::now)
            .format("%Y-%m")
            .to_string();
        let category = record
            .categories
            .first()
            .map(|c| sanitize_component(c))
            .unwrap_or_else(|| "uncategorized".to_string());

        self.base_dir
            .join(PAPERS_DIR)
            .join(month)
            .join(category)
            .join(format!("{}.json", sanitize_component(record.primary_id())))
    }

    async fn save_index(&self, index: &StorageIndex) -> Result<(), CollaboratorError> {
        let json = serde_json::to_string_pretty(index)?;
        let tmp = self.base_dir.join(format!("{}.tmp", INDEX_FILE));
        write_file(&tmp, json.as_bytes()).await?;
        fs::rename(&tmp, self.index_path()).await?;
        Ok(())
    }

    async fn backup(&self, id: &str, path: &Path) -> Result<(), CollaboratorError> {
        let backup_dir = self.base_dir.join(BACKUPS_DIR);
        fs::create_dir_all(&backup_dir).await?;
        let name = format!(
            "{}_{}.json",
            sanitize_component(id),
            Utc::now().format("%Y%m%d_%H%M%S%.f")
        );
        fs::copy(path, backup_dir.join(name)).await?;
        self.prune_backups(&backup_dir).await
    }

    async fn prune_backups(&self, backup_dir: &Path) -> Result<(), CollaboratorError> {
        let mut backups = Vec::new();
        let mut entries = fs::read_dir(backup_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let modified = entry.metadata().await?.modified()?;
            backups.push((modified, entry.path()));
        }

        backups.sort_by(|a, b| b.cmp(a));
        for (_, path) in backups.into_iter().skip(self.max_backups) {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for JsonStorage {
    async fn store_record(&self, record: &PaperRecord) -> Result<String, CollaboratorError> {
        let id = record.primary_id().to_string();
        let path = self.record_path(record);

        let mut index = self.index.lock().await;
        if let Some(previous) = index.get(&id).map(|e| e.file_path.clone()) {
            if previous != path && fs::try_exists(&previous).await? {
                fs::remove_file(&previous).await?;
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(record)?;
        write_file(&path, json.as_bytes()).await?;

        index.insert(id.clone(), IndexEntry::from_record(record, path.clone()));
        self.save_index(&index).await?;

        debug!(id = %id, path = %path.display(), "Stored record");
        Ok(id)
    }
}

async fn load_index(path: &Path) -> StorageIndex {
    match fs::read_to_string(path).await {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(index) => index,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse storage index, starting empty");
                StorageIndex::new()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => StorageIndex::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read storage index, starting empty");
            StorageIndex::new()
        }
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), CollaboratorError> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}

fn record_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable path during index scan");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect()
}

fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}
