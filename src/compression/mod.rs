//! Normalization of source files before upload
//!
//! Compression is an optimization, not a correctness requirement: the
//! [`CompressionStage`] falls back to the untouched original whenever the
//! compressor cannot handle a file (unless that policy is switched off).

pub mod image_compressor;

pub use image_compressor::ImageCompressor;

use crate::error::{IngestError, Result};
use crate::logging::Logger;
use crate::task::Payload;
use std::io::Cursor;
use std::sync::Arc;

/// Output of the compression stage, consumed by the upload stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedFile {
    pub data: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// False when the original bytes are passed through
    pub compressed: bool,
}

impl NormalizedFile {
    /// Wrap original bytes unchanged, sniffing type and dimensions where possible
    pub fn passthrough(file_name: String, data: Vec<u8>) -> Self {
        let content_type = infer::get(&data)
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let dimensions = read_dimensions(&data);

        Self {
            data,
            file_name,
            content_type,
            width: dimensions.map(|(w, _)| w),
            height: dimensions.map(|(_, h)| h),
            compressed: false,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Take the bytes out of a shared buffer, copying only if it is still shared
pub fn into_owned(data: Arc<Vec<u8>>) -> Vec<u8> {
    Arc::try_unwrap(data).unwrap_or_else(|shared| shared.as_ref().clone())
}

/// Read image dimensions from the header without decoding pixels
pub fn read_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// Deterministic, CPU-bound normalization of one source
pub trait Compressor: Send + Sync {
    fn compress(&self, source: &Payload) -> Result<NormalizedFile>;
}

/// Runs the compressor off the async workers and applies the fallback policy
#[derive(Clone)]
pub struct CompressionStage {
    compressor: Arc<dyn Compressor>,
    fallback_to_original: bool,
    output: Logger,
}

impl CompressionStage {
    pub fn new(compressor: Arc<dyn Compressor>, fallback_to_original: bool, output: Logger) -> Self {
        Self {
            compressor,
            fallback_to_original,
            output,
        }
    }

    pub async fn normalize(&self, payload: &Payload) -> Result<NormalizedFile> {
        let compressor = Arc::clone(&self.compressor);
        let source = payload.clone();
        let result = tokio::task::spawn_blocking(move || compressor.compress(&source))
            .await
            .unwrap_or_else(|e| Err(IngestError::Compression(format!("Compressor crashed: {}", e))));

        match result {
            Ok(file) => Ok(file),
            Err(IngestError::Compression(reason)) if self.fallback_to_original => {
                let file_name = payload.file_name();
                self.output.warning(&format!(
                    "Compression of {} failed ({}), uploading original",
                    file_name, reason
                ));

                let source = payload.clone();
                tokio::task::spawn_blocking(move || {
                    source
                        .read()
                        .map(|data| NormalizedFile::passthrough(file_name, into_owned(data)))
                })
                .await
                .map_err(|e| IngestError::Io(format!("Reading original failed: {}", e)))?
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenCompressor;

    impl Compressor for BrokenCompressor {
        fn compress(&self, _source: &Payload) -> Result<NormalizedFile> {
            Err(IngestError::Compression("codec exploded".into()))
        }
    }

    #[tokio::test]
    async fn test_fallback_returns_original_bytes() {
        let stage = CompressionStage::new(Arc::new(BrokenCompressor), true, Logger::new_quiet());
        let payload = Payload::memory("clip.bin", vec![9, 8, 7]);

        let file = stage.normalize(&payload).await.unwrap();
        assert_eq!(file.data, vec![9, 8, 7]);
        assert_eq!(file.file_name, "clip.bin");
        assert_eq!(file.content_type, "application/octet-stream");
        assert!(!file.compressed);
        assert_eq!(file.width, None);
    }

    #[tokio::test]
    async fn test_hard_failure_when_fallback_disabled() {
        let stage = CompressionStage::new(Arc::new(BrokenCompressor), false, Logger::new_quiet());
        let payload = Payload::memory("clip.bin", vec![1]);

        assert!(matches!(
            stage.normalize(&payload).await,
            Err(IngestError::Compression(_))
        ));
    }

    #[test]
    fn test_into_owned_copies_only_shared_buffers() {
        let unique = Arc::new(vec![1, 2, 3]);
        assert_eq!(into_owned(unique), vec![1, 2, 3]);

        let shared = Arc::new(vec![4, 5]);
        let kept = Arc::clone(&shared);
        assert_eq!(into_owned(shared), vec![4, 5]);
        assert_eq!(*kept, vec![4, 5]);
    }

    #[test]
    fn test_dimensions_of_garbage_are_unknown() {
        assert_eq!(read_dimensions(b"not an image"), None);
    }
}
