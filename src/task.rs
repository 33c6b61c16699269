//! Upload task model
//!
//! An [`UploadTask`] is one file plus the metadata the operator attached to
//! it. The queue owns the task (and its payload) while it waits or runs; what
//! observers see is a [`TaskSnapshot`], which never carries payload bytes.

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Opaque task identifier, assigned when the task is created
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn generate() -> Self {
        TaskId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Base model family the asset was generated with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelBase {
    #[serde(rename = "sd1.5")]
    Sd15,
    #[serde(rename = "sdxl")]
    Sdxl,
    #[serde(rename = "flux")]
    Flux,
    #[serde(rename = "midjourney")]
    Midjourney,
    #[serde(rename = "other")]
    Other,
}

/// Where the style of the asset comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleSource {
    Prompt,
    Lora,
    Reference,
    None,
}

/// Metadata recorded in the catalog alongside the object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetadata {
    pub title: String,
    #[serde(default)]
    pub prompt: String,
    pub model_base: ModelBase,
    pub style_source: StyleSource,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub style_reference: String,
}

impl TaskMetadata {
    pub fn new(title: impl Into<String>, model_base: ModelBase, style_source: StyleSource) -> Self {
        Self {
            title: title.into(),
            prompt: String::new(),
            model_base,
            style_source,
            style: String::new(),
            style_reference: String::new(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn with_style_reference(mut self, reference: impl Into<String>) -> Self {
        self.style_reference = reference.into();
        self
    }
}

/// Binary source of a task; read-only once the task exists
#[derive(Debug, Clone)]
pub enum Payload {
    /// A file on local disk, read lazily by the compression stage
    File(PathBuf),
    /// Bytes already held in memory (drag-and-drop buffers, tests)
    Memory { name: String, data: Arc<Vec<u8>> },
}

impl Payload {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Payload::File(path.into())
    }

    pub fn memory(name: impl Into<String>, data: Vec<u8>) -> Self {
        Payload::Memory {
            name: name.into(),
            data: Arc::new(data),
        }
    }

    /// File name used for key generation and catalog registration
    pub fn file_name(&self) -> String {
        match self {
            Payload::File(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "file".to_string()),
            Payload::Memory { name, .. } => name.clone(),
        }
    }

    /// Read the whole source; blocking for file payloads.
    ///
    /// Memory payloads hand out their shared buffer without copying.
    pub fn read(&self) -> Result<Arc<Vec<u8>>> {
        match self {
            Payload::File(path) => read_file(path).map(Arc::new),
            Payload::Memory { data, .. } => Ok(Arc::clone(data)),
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| IngestError::Io(format!("Failed to read {}: {}", path.display(), e)))
}

/// Pipeline status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Compressing,
    Uploading,
    Registering,
    Success,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Error)
    }

    /// A worker currently owns the task
    pub fn is_active(self) -> bool {
        matches!(
            self,
            TaskStatus::Compressing | TaskStatus::Uploading | TaskStatus::Registering
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Compressing => "compressing",
            TaskStatus::Uploading => "uploading",
            TaskStatus::Registering => "registering",
            TaskStatus::Success => "success",
            TaskStatus::Error => "error",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of ingestion work
#[derive(Debug, Clone)]
pub struct UploadTask {
    id: TaskId,
    payload: Payload,
    metadata: Arc<TaskMetadata>,
}

impl UploadTask {
    pub fn new(payload: Payload, metadata: TaskMetadata) -> Self {
        Self {
            id: TaskId::generate(),
            payload,
            metadata: Arc::new(metadata),
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn metadata(&self) -> &TaskMetadata {
        &self.metadata
    }

    pub fn file_name(&self) -> String {
        self.payload.file_name()
    }

    pub(crate) fn shared_metadata(&self) -> Arc<TaskMetadata> {
        Arc::clone(&self.metadata)
    }
}

/// Observer-facing copy of a task's state
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub file_name: String,
    pub metadata: Arc<TaskMetadata>,
    pub status: TaskStatus,
    pub error: Option<String>,
    /// Catalog identifier once registration succeeded
    pub asset_id: Option<String>,
}
