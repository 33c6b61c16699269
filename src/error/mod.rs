//! Error types for the ingestion pipeline
//!
//! Every stage reports failures through [`IngestError`]. The stage-specific
//! variants are what ends up in a task's terminal `error` string once retries
//! are exhausted. [`IngestError::Cancelled`] is not a failure: it marks a
//! cooperative abort and short-circuits the retry loop.

pub mod handlers;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    /// The credential issuer was unreachable, denied the request or answered garbage
    #[error("Credential fetch error: {0}")]
    CredentialFetch(String),

    /// Normalizing the source file failed (recovered by falling back to the original)
    #[error("Compression error: {0}")]
    Compression(String),

    /// The object store rejected or never completed the write
    #[error("Upload error: {0}")]
    Upload(String),

    /// The catalog refused to register an uploaded object
    #[error("Registration error: {0}")]
    Registration(String),

    /// The run was cancelled while this operation was in flight
    #[error("Operation cancelled")]
    Cancelled,

    /// Reading a local source failed
    #[error("IO error: {0}")]
    Io(String),

    /// A response or file could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration or input rejected before any work started
    #[error("Validation error: {0}")]
    Validation(String),

    /// A stage panicked; the task is failed and the worker carries on
    #[error("Task panicked: {0}")]
    Panicked(String),
}

impl IngestError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, IngestError::Cancelled)
    }

    /// Short stage label used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::CredentialFetch(_) => "credentials",
            IngestError::Compression(_) => "compression",
            IngestError::Upload(_) => "upload",
            IngestError::Registration(_) => "registration",
            IngestError::Cancelled => "cancelled",
            IngestError::Io(_) => "io",
            IngestError::Parse(_) => "parse",
            IngestError::Validation(_) => "validation",
            IngestError::Panicked(_) => "panic",
        }
    }
}

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        IngestError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::Parse(err.to_string())
    }
}

impl From<url::ParseError> for IngestError {
    fn from(err: url::ParseError) -> Self {
        IngestError::Validation(err.to_string())
    }
}

impl From<image::ImageError> for IngestError {
    fn from(err: image::ImageError) -> Self {
        IngestError::Compression(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_stage_prefix() {
        let err = IngestError::Upload("bucket full".to_string());
        assert_eq!(err.to_string(), "Upload error: bucket full");
        assert_eq!(err.kind(), "upload");
    }

    #[test]
    fn test_cancelled_is_distinct() {
        assert!(IngestError::Cancelled.is_cancelled());
        assert!(!IngestError::Registration("x".into()).is_cancelled());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.png");
        let err: IngestError = io.into();
        assert!(matches!(err, IngestError::Io(msg) if msg.contains("missing.png")));
    }
}
