//! Configuration management module

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Worker pool and retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub concurrency: usize,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    /// Capacity of the task event broadcast channel
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_retries: 3,
            base_delay_ms: 1000,
            event_capacity: 1024,
        }
    }
}

impl QueueConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = delay.as_millis() as u64;
        self
    }
}

/// Credential issuer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    pub endpoint: String,
    /// Credentials are refreshed once they are this close to expiry
    pub safety_margin_secs: u64,
    pub timeout_secs: u64,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/api/upload/credentials".to_string(),
            safety_margin_secs: 120,
            timeout_secs: 30,
        }
    }
}

impl CredentialConfig {
    pub fn safety_margin(&self) -> Duration {
        Duration::from_secs(self.safety_margin_secs)
    }
}

/// Output encodings the compressor can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetEncoding {
    Jpeg,
    Png,
}

impl TargetEncoding {
    pub fn content_type(self) -> &'static str {
        match self {
            TargetEncoding::Jpeg => "image/jpeg",
            TargetEncoding::Png => "image/png",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            TargetEncoding::Jpeg => "jpg",
            TargetEncoding::Png => "png",
        }
    }
}

/// Envelope every uploaded image is normalized into
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub max_size_bytes: u64,
    pub max_dimension: u32,
    pub target_encoding: TargetEncoding,
    /// Initial encoder quality in `0.0..=1.0`
    pub quality: f32,
    /// Lowest quality the size search may step down to
    pub min_quality: f32,
    pub fallback_to_original: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 1024 * 1024,
            max_dimension: 1920,
            target_encoding: TargetEncoding::Jpeg,
            quality: 0.8,
            min_quality: 0.3,
            fallback_to_original: true,
        }
    }
}

/// Object store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL; `{bucket}` and `{region}` are expanded from the credentials
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://{bucket}.storage.{region}.example.com".to_string(),
            timeout_secs: 300,
        }
    }
}

/// Catalog service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/api/assets".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub queue: QueueConfig,
    pub credentials: CredentialConfig,
    pub compression: CompressionConfig,
    pub store: StoreConfig,
    pub catalog: CatalogConfig,
    pub verbose: bool,
}

impl IngestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.queue.concurrency == 0 {
            return Err(IngestError::Validation(
                "queue.concurrency must be greater than 0".to_string(),
            ));
        }
        if self.queue.max_retries == 0 {
            return Err(IngestError::Validation(
                "queue.max_retries must be greater than 0".to_string(),
            ));
        }
        if self.queue.event_capacity == 0 {
            return Err(IngestError::Validation(
                "queue.event_capacity must be greater than 0".to_string(),
            ));
        }

        let compression = &self.compression;
        if !(0.0..=1.0).contains(&compression.quality) || !(0.0..=1.0).contains(&compression.min_quality) {
            return Err(IngestError::Validation(
                "compression quality must lie within 0.0..=1.0".to_string(),
            ));
        }
        if compression.min_quality > compression.quality {
            return Err(IngestError::Validation(format!(
                "compression.min_quality ({}) exceeds compression.quality ({})",
                compression.min_quality, compression.quality
            )));
        }
        if compression.max_dimension == 0 || compression.max_size_bytes == 0 {
            return Err(IngestError::Validation(
                "compression envelope must be non-zero".to_string(),
            ));
        }

        validate_url("credentials.endpoint", &self.credentials.endpoint)?;
        validate_url("catalog.endpoint", &self.catalog.endpoint)?;
        // Placeholders are not valid host characters, so substitute before parsing
        let store = self
            .store
            .endpoint
            .replace("{bucket}", "bucket")
            .replace("{region}", "region");
        validate_url("store.endpoint", &store)?;

        Ok(())
    }

    /// Load configuration from a JSON file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            IngestError::Io(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config: IngestConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Create config from environment variables and defaults
    pub fn from_env() -> Self {
        Self::default().merge_env()
    }

    /// Overlay `MEDIA_INGEST_*` environment variables
    pub fn merge_env(mut self) -> Self {
        if let Ok(val) = std::env::var("MEDIA_INGEST_CONCURRENCY") {
            if let Ok(concurrency) = val.parse() {
                self.queue.concurrency = concurrency;
            }
        }
        if let Ok(val) = std::env::var("MEDIA_INGEST_MAX_RETRIES") {
            if let Ok(max_retries) = val.parse() {
                self.queue.max_retries = max_retries;
            }
        }
        if let Ok(val) = std::env::var("MEDIA_INGEST_BASE_DELAY_MS") {
            if let Ok(delay) = val.parse() {
                self.queue.base_delay_ms = delay;
            }
        }
        if let Ok(val) = std::env::var("MEDIA_INGEST_CREDENTIALS_URL") {
            self.credentials.endpoint = val;
        }
        if let Ok(val) = std::env::var("MEDIA_INGEST_STORE_URL") {
            self.store.endpoint = val;
        }
        if let Ok(val) = std::env::var("MEDIA_INGEST_CATALOG_URL") {
            self.catalog.endpoint = val;
        }
        if let Ok(val) = std::env::var("MEDIA_INGEST_VERBOSE") {
            self.verbose = val.to_lowercase() == "true" || val == "1";
        }

        self
    }
}

fn validate_url(field: &str, value: &str) -> Result<()> {
    let url = Url::parse(value)
        .map_err(|e| IngestError::Validation(format!("{} is not a valid URL ({}): {}", field, value, e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(IngestError::Validation(format!(
            "{} must use http:// or https://: {}",
            field, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = IngestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue.concurrency, 4);
        assert_eq!(config.queue.max_retries, 3);
        assert_eq!(config.queue.base_delay(), Duration::from_secs(1));
        assert_eq!(config.credentials.safety_margin(), Duration::from_secs(120));
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let mut config = IngestConfig::default();
        config.queue.concurrency = 0;
        assert!(matches!(config.validate(), Err(IngestError::Validation(_))));
    }

    #[test]
    fn test_rejects_bad_urls() {
        let mut config = IngestConfig::default();
        config.catalog.endpoint = "ftp://catalog".to_string();
        assert!(config.validate().is_err());

        let mut config = IngestConfig::default();
        config.credentials.endpoint = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_quality() {
        let mut config = IngestConfig::default();
        config.compression.min_quality = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: IngestConfig =
            serde_json::from_str(r#"{"queue": {"concurrency": 2}, "compression": {"target_encoding": "png"}}"#)
                .unwrap();
        assert_eq!(config.queue.concurrency, 2);
        assert_eq!(config.queue.max_retries, 3);
        assert_eq!(config.compression.target_encoding, TargetEncoding::Png);
        assert!(config.compression.fallback_to_original);
    }
}
