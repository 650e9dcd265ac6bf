//! Post history ledger
//!
//! The ledger is the single source of truth for what was posted and when.
//! It is an append-only JSON list that is rewritten in full on every append,
//! via a temp file in the same directory that is then renamed over the
//! target, so an interrupted write leaves the previous history intact.
//!
//! Only one process may use a history file at a time. Nothing here takes a
//! lock; schedule invocations so they never overlap.

use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{HistoryError, Result};
use crate::types::HistoryRecord;

/// Default history file name
pub const DEFAULT_HISTORY_FILE: &str = "post_history.json";

/// History file names used by earlier versions, in lookup order
pub const LEGACY_HISTORY_FILES: &[&str] = &["tweet_history.json"];

#[derive(Debug, Clone)]
pub struct HistoryLedger {
    path: PathBuf,
    loaded_from: Option<PathBuf>,
    records: Vec<HistoryRecord>,
}

impl HistoryLedger {
    /// Load history from `primary`, or from the first existing `legacy` path
    ///
    /// A missing file is not an error: the ledger starts empty. Appends are
    /// always written to `primary`, so a legacy file is migrated forward on
    /// the first successful post.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError` if a file exists but cannot be read or parsed.
    pub fn load(primary: &Path, legacy: &[PathBuf]) -> Result<Self> {
        let source = std::iter::once(primary)
            .chain(legacy.iter().map(PathBuf::as_path))
            .find(|p| p.exists());

        let records = match source {
            Some(path) => {
                if path != primary {
                    tracing::info!(
                        "Reading legacy history file {} (will write to {})",
                        path.display(),
                        primary.display()
                    );
                }
                read_records(path)?
            }
            None => {
                tracing::debug!("No history file found at {}, starting empty", primary.display());
                Vec::new()
            }
        };

        Ok(Self {
            path: primary.to_path_buf(),
            loaded_from: source.map(Path::to_path_buf),
            records,
        })
    }

    /// An empty ledger that persists to `path`
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            loaded_from: None,
            records: Vec::new(),
        }
    }

    /// Path appends are written to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path the records were read from, if any file existed
    pub fn loaded_from(&self) -> Option<&Path> {
        self.loaded_from.as_deref()
    }

    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records for `set_name` across all platforms, oldest first
    pub fn records_for(&self, set_name: &str) -> Vec<&HistoryRecord> {
        let mut matching: Vec<&HistoryRecord> = self
            .records
            .iter()
            .filter(|r| r.set_name == set_name)
            .collect();
        matching.sort_by_key(|r| r.timestamp);
        matching
    }

    /// Latest time `set_name` was posted on any platform
    pub fn most_recent_timestamp(&self, set_name: &str) -> Option<DateTime<Utc>> {
        self.records
            .iter()
            .filter(|r| r.set_name == set_name)
            .map(|r| r.timestamp)
            .max()
    }

    /// Append a record and persist the whole ledger
    ///
    /// Call this only after a platform has reported success (or for an
    /// explicitly recorded dry run). The record stays in memory even if the
    /// write fails, so later eligibility checks in this process still see it.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Write` if the ledger could not be persisted.
    pub fn append(&mut self, record: HistoryRecord) -> Result<()> {
        self.records.push(record);
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let write_err = |reason: String| HistoryError::Write {
            path: self.path.clone(),
            reason,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)
            .map_err(|e| write_err(format!("Failed to create directory: {}", e)))?;

        let mut json = serde_json::to_string_pretty(&self.records)
            .map_err(|e| write_err(format!("Failed to serialize history: {}", e)))?;
        json.push('\n');

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| write_err(format!("Failed to create temp file: {}", e)))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| write_err(format!("Failed to write temp file: {}", e)))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| write_err(format!("Failed to sync temp file: {}", e)))?;
        tmp.persist(&self.path)
            .map_err(|e| write_err(format!("Failed to replace history file: {}", e.error)))?;

        tracing::debug!(
            "Persisted {} history records to {}",
            self.records.len(),
            self.path.display()
        );
        Ok(())
    }
}

fn read_records(path: &Path) -> Result<Vec<HistoryRecord>> {
    let content = std::fs::read_to_string(path).map_err(|source| HistoryError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let records = serde_json::from_str(&content).map_err(|source| HistoryError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(records)
}
