//! Batch manifest loading
//!
//! A manifest is a JSON array of `{ "path": ..., "metadata": { ... } }`
//! entries. Relative paths are resolved against the manifest's directory.

use crate::error::{IngestError, Result};
use crate::task::{Payload, TaskMetadata, UploadTask};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub path: PathBuf,
    pub metadata: TaskMetadata,
}

#[derive(Debug, Clone)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            IngestError::Io(format!("Failed to read manifest {}: {}", path.display(), e))
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&content, base_dir)
    }

    pub fn parse(content: &str, base_dir: &Path) -> Result<Self> {
        let mut entries: Vec<ManifestEntry> = serde_json::from_str(content)?;
        for entry in &mut entries {
            if entry.path.is_relative() {
                entry.path = base_dir.join(&entry.path);
            }
        }
        Ok(Self { entries })
    }

    /// Every entry points at a readable file and carries a title
    pub fn validate(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(IngestError::Validation("Manifest lists no files".to_string()));
        }

        for entry in &self.entries {
            if !entry.path.is_file() {
                return Err(IngestError::Validation(format!(
                    "File does not exist: {}",
                    entry.path.display()
                )));
            }
            if entry.metadata.title.trim().is_empty() {
                return Err(IngestError::Validation(format!(
                    "Missing title for {}",
                    entry.path.display()
                )));
            }
        }

        Ok(())
    }

    pub fn into_tasks(self) -> Vec<UploadTask> {
        self.entries
            .into_iter()
            .map(|entry| UploadTask::new(Payload::file(entry.path), entry.metadata))
            .collect()
    }
}
