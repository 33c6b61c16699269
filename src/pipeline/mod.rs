//! Per-task stage orchestration
//!
//! One attempt runs compress -> credentials -> upload -> register in strict
//! order. The [`RetryPolicy`] repeats the whole sequence, so a failure while
//! registering re-enters `compressing` on the next attempt. Nothing from a
//! failed attempt is kept, and the normalized bytes are dropped as soon as the
//! upload has consumed them.

pub mod retry;

pub use retry::RetryPolicy;

use crate::cancellation::CancellationScope;
use crate::catalog::{CatalogRegistrar, HttpCatalog, RegisteredAsset, RegistrationRequest};
use crate::compression::{CompressionStage, ImageCompressor, NormalizedFile};
use crate::config::IngestConfig;
use crate::credentials::{CredentialCache, HttpCredentialIssuer};
use crate::error::Result;
use crate::logging::Logger;
use crate::store::{HttpObjectStore, ObjectKey, ObjectStore};
use crate::task::{TaskStatus, UploadTask};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Receives `(status, attempt)` whenever a task enters a new stage
pub type StageReporter<'a> = dyn Fn(TaskStatus, u32) + Send + Sync + 'a;

pub struct IngestPipeline {
    compression: CompressionStage,
    credentials: Arc<CredentialCache>,
    store: Arc<dyn ObjectStore>,
    catalog: Arc<dyn CatalogRegistrar>,
    retry: RetryPolicy,
    output: Logger,
}

impl IngestPipeline {
    pub fn new(
        compression: CompressionStage,
        credentials: Arc<CredentialCache>,
        store: Arc<dyn ObjectStore>,
        catalog: Arc<dyn CatalogRegistrar>,
        retry: RetryPolicy,
        output: Logger,
    ) -> Self {
        Self {
            compression,
            credentials,
            store,
            catalog,
            retry,
            output,
        }
    }

    /// Wire the HTTP collaborators described by `config`
    pub fn from_config(config: &IngestConfig, output: Logger) -> Result<Self> {
        config.validate()?;

        let issuer = HttpCredentialIssuer::new(
            &config.credentials.endpoint,
            Duration::from_secs(config.credentials.timeout_secs),
            output.clone(),
        )?;
        let credentials = CredentialCache::new(
            Arc::new(issuer),
            config.credentials.safety_margin(),
            output.clone(),
        );
        let store = HttpObjectStore::new(
            &config.store.endpoint,
            Duration::from_secs(config.store.timeout_secs),
            output.clone(),
        )?;
        let catalog = HttpCatalog::new(
            &config.catalog.endpoint,
            Duration::from_secs(config.catalog.timeout_secs),
            output.clone(),
        )?;
        let compression = CompressionStage::new(
            Arc::new(ImageCompressor::new(config.compression.clone(), output.clone())),
            config.compression.fallback_to_original,
            output.clone(),
        );
        let retry = RetryPolicy::new(
            config.queue.max_retries,
            config.queue.base_delay(),
            output.clone(),
        );

        Ok(Self::new(
            compression,
            Arc::new(credentials),
            Arc::new(store),
            Arc::new(catalog),
            retry,
            output,
        ))
    }

    pub fn credentials(&self) -> &Arc<CredentialCache> {
        &self.credentials
    }

    /// Drive one task through the retried stage sequence
    pub async fn process(
        &self,
        task: &UploadTask,
        scope: &CancellationScope,
        report: &StageReporter<'_>,
    ) -> Result<RegisteredAsset> {
        let label = format!("Task {} ({})", task.id(), task.file_name());
        self.retry
            .run(scope, &label, |attempt| self.attempt(task, scope, attempt, report))
            .await
    }

    async fn attempt(
        &self,
        task: &UploadTask,
        scope: &CancellationScope,
        attempt: u32,
        report: &StageReporter<'_>,
    ) -> Result<RegisteredAsset> {
        scope.check()?;
        report(TaskStatus::Compressing, attempt);
        let normalized = self.compression.normalize(task.payload()).await?;

        scope.check()?;
        report(TaskStatus::Uploading, attempt);
        let credentials = scope.guard(self.credentials.get_credentials()).await?;
        let key = ObjectKey::generate(&credentials.path_prefix, &normalized.file_name, Utc::now());

        let size = normalized.size();
        let NormalizedFile {
            data,
            file_name,
            content_type,
            width,
            height,
            compressed,
        } = normalized;
        self.output.debug(&format!(
            "Uploading {} as {} ({}, {})",
            file_name,
            key,
            self.output.format_size(size),
            if compressed { "compressed" } else { "original" }
        ));
        scope
            .guard(self.store.put_object(&credentials, &key, data, &content_type))
            .await?;

        report(TaskStatus::Registering, attempt);
        let request = RegistrationRequest {
            key: key.to_string(),
            filename: file_name,
            width,
            height,
            size,
            metadata: task.metadata().clone(),
        };
        scope.guard(self.catalog.register(&request)).await
    }
}
