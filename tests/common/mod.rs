//! In-process collaborators for queue scenarios

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use media_ingest::catalog::{CatalogRegistrar, RegisteredAsset, RegistrationRequest};
use media_ingest::compression::{CompressionStage, Compressor, NormalizedFile, into_owned};
use media_ingest::config::QueueConfig;
use media_ingest::credentials::{CredentialCache, CredentialIssuer, Credentials};
use media_ingest::pipeline::RetryPolicy;
use media_ingest::store::{ObjectKey, ObjectStore};
use media_ingest::{
    IngestError, IngestPipeline, Logger, ModelBase, Payload, Result, StyleSource, TaskMetadata,
    TaskQueue, UploadTask,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MAX_ATTEMPTS: u32 = 3;

/// Failure budget per file name; `None` fails forever
#[derive(Default)]
pub struct FailurePlan {
    plans: Mutex<HashMap<String, Option<u32>>>,
}

impl FailurePlan {
    pub fn always(&self, file_name: &str) {
        self.plans.lock().unwrap().insert(file_name.to_string(), None);
    }

    pub fn times(&self, file_name: &str, count: u32) {
        self.plans.lock().unwrap().insert(file_name.to_string(), Some(count));
    }

    /// Consume one failure for the first plan `matches` accepts
    fn should_fail(&self, matches: impl Fn(&str) -> bool) -> bool {
        let mut plans = self.plans.lock().unwrap();
        for (name, remaining) in plans.iter_mut() {
            if !matches(name) {
                continue;
            }
            return match remaining {
                None => true,
                Some(0) => false,
                Some(n) => {
                    *n -= 1;
                    true
                }
            };
        }
        false
    }
}

/// Tracks concurrent calls and the peak seen
#[derive(Default)]
pub struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) -> InFlightGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(self)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InFlightGuard<'a>(&'a InFlight);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct FakeIssuer {
    pub calls: AtomicU64,
    pub fail: std::sync::atomic::AtomicBool,
    /// Overrides the default one-hour lifetime
    pub expires_at: Mutex<Option<DateTime<Utc>>>,
    pub delay: Duration,
}

impl FakeIssuer {
    pub fn new(delay: Duration) -> Self {
        Self {
            calls: AtomicU64::new(0),
            fail: std::sync::atomic::AtomicBool::new(false),
            expires_at: Mutex::new(None),
            delay,
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialIssuer for FakeIssuer {
    async fn issue(&self) -> Result<Credentials> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(IngestError::CredentialFetch("issuer unavailable".into()));
        }
        Ok(Credentials {
            access_key: "AKTEST".into(),
            secret: "secret".into(),
            session_token: "session".into(),
            expires_at: self
                .expires_at
                .lock()
                .unwrap()
                .unwrap_or_else(|| Utc::now() + ChronoDuration::hours(1)),
            bucket: "media".into(),
            region: "eu-1".into(),
            path_prefix: "uploads/user-1".into(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: String,
}

pub struct FakeStore {
    pub objects: Mutex<Vec<StoredObject>>,
    pub attempts: AtomicUsize,
    pub in_flight: InFlight,
    pub failures: FailurePlan,
    /// File name whose upload panics instead of returning
    pub panics_on: Mutex<Option<String>>,
    pub delay: Duration,
}

impl FakeStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            objects: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            in_flight: InFlight::default(),
            failures: FailurePlan::default(),
            panics_on: Mutex::new(None),
            delay,
        }
    }

    pub fn objects(&self) -> Vec<StoredObject> {
        self.objects.lock().unwrap().clone()
    }

    /// Uploads whose key was generated for `file_name`
    pub fn uploads_of(&self, file_name: &str) -> usize {
        let suffix = format!("-{}", file_name);
        self.objects().iter().filter(|o| o.key.ends_with(&suffix)).count()
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn put_object(
        &self,
        _credentials: &Credentials,
        key: &ObjectKey,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let _guard = self.in_flight.enter();
        self.attempts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        let key = key.to_string();
        let panics = self.panics_on.lock().unwrap().clone();
        if let Some(name) = panics.filter(|name| key.ends_with(&format!("-{}", name))) {
            panic!("store blew up on {}", name);
        }
        if self
            .failures
            .should_fail(|name| key.ends_with(&format!("-{}", name)))
        {
            return Err(IngestError::Upload(format!("store rejected {}", key)));
        }

        self.objects.lock().unwrap().push(StoredObject {
            key,
            body,
            content_type: content_type.to_string(),
        });
        Ok(())
    }
}

pub struct FakeCatalog {
    pub registered: Mutex<Vec<RegistrationRequest>>,
    pub failures: FailurePlan,
    pub delay: Duration,
    next_id: AtomicU64,
}

impl FakeCatalog {
    pub fn new(delay: Duration) -> Self {
        Self {
            registered: Mutex::new(Vec::new()),
            failures: FailurePlan::default(),
            delay,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn registered(&self) -> Vec<RegistrationRequest> {
        self.registered.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogRegistrar for FakeCatalog {
    async fn register(&self, request: &RegistrationRequest) -> Result<RegisteredAsset> {
        tokio::time::sleep(self.delay).await;
        if self.failures.should_fail(|name| name == request.filename) {
            return Err(IngestError::Registration(format!(
                "catalog rejected {}",
                request.filename
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.registered.lock().unwrap().push(request.clone());
        Ok(RegisteredAsset {
            id: format!("asset-{}", id),
            key: request.key.clone(),
        })
    }
}

/// Hands bytes through untouched but reports them as compressed
pub struct IdentityCompressor;

impl Compressor for IdentityCompressor {
    fn compress(&self, source: &Payload) -> Result<NormalizedFile> {
        Ok(NormalizedFile {
            data: into_owned(source.read()?),
            file_name: source.file_name(),
            content_type: "image/png".to_string(),
            width: Some(64),
            height: Some(64),
            compressed: true,
        })
    }
}

pub struct FailingCompressor;

impl Compressor for FailingCompressor {
    fn compress(&self, source: &Payload) -> Result<NormalizedFile> {
        Err(IngestError::Compression(format!(
            "unsupported format: {}",
            source.file_name()
        )))
    }
}

pub struct Harness {
    pub issuer: Arc<FakeIssuer>,
    pub store: Arc<FakeStore>,
    pub catalog: Arc<FakeCatalog>,
    pub credentials: Arc<CredentialCache>,
    pub pipeline: Arc<IngestPipeline>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(Arc::new(IdentityCompressor), true, Duration::from_millis(5))
    }

    pub fn with_store_delay(delay: Duration) -> Self {
        Self::build(Arc::new(IdentityCompressor), true, delay)
    }

    pub fn with_compressor(compressor: Arc<dyn Compressor>, fallback_to_original: bool) -> Self {
        Self::build(compressor, fallback_to_original, Duration::from_millis(5))
    }

    fn build(compressor: Arc<dyn Compressor>, fallback_to_original: bool, store_delay: Duration) -> Self {
        let output = Logger::new_quiet();
        let issuer = Arc::new(FakeIssuer::new(Duration::from_millis(10)));
        let store = Arc::new(FakeStore::new(store_delay));
        let catalog = Arc::new(FakeCatalog::new(Duration::from_millis(2)));
        let credentials = Arc::new(CredentialCache::new(
            issuer.clone(),
            Duration::from_secs(120),
            output.clone(),
        ));

        let pipeline = Arc::new(IngestPipeline::new(
            CompressionStage::new(compressor, fallback_to_original, output.clone()),
            credentials.clone(),
            store.clone(),
            catalog.clone(),
            RetryPolicy::new(MAX_ATTEMPTS, Duration::from_millis(1), output.clone()),
            output,
        ));

        Self {
            issuer,
            store,
            catalog,
            credentials,
            pipeline,
        }
    }

    pub fn queue(&self, concurrency: usize) -> TaskQueue {
        TaskQueue::new(self.pipeline.clone(), &queue_config(concurrency), Logger::new_quiet())
    }
}

pub fn queue_config(concurrency: usize) -> QueueConfig {
    QueueConfig::default()
        .with_concurrency(concurrency)
        .with_max_retries(MAX_ATTEMPTS)
        .with_base_delay(Duration::from_millis(1))
}

pub fn task(file_name: &str) -> UploadTask {
    UploadTask::new(
        Payload::memory(file_name, file_name.as_bytes().to_vec()),
        TaskMetadata::new(file_name, ModelBase::Sdxl, StyleSource::Prompt).with_prompt("test"),
    )
}

pub fn tasks(count: usize) -> Vec<UploadTask> {
    (1..=count).map(|i| task(&format!("photo-{}.png", i))).collect()
}

pub async fn wait_idle(queue: &TaskQueue) {
    tokio::time::timeout(Duration::from_secs(10), queue.wait_idle())
        .await
        .expect("queue did not go idle");
}
