//! Credential cache shared by all workers
//!
//! Reads are lock-light: a fresh bundle is cloned out of an `RwLock`. When the
//! bundle is missing or stale, callers serialize on a refresh guard and re-check
//! before fetching, so a burst of workers triggers a single issuer call.

use crate::credentials::{Clock, CredentialIssuer, Credentials, SystemClock};
use crate::error::{IngestError, Result};
use crate::logging::Logger;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

pub struct CredentialCache {
    issuer: Arc<dyn CredentialIssuer>,
    clock: Arc<dyn Clock>,
    safety_margin: chrono::Duration,
    cached: RwLock<Option<Credentials>>,
    refresh_guard: tokio::sync::Mutex<()>,
    fetches: AtomicU64,
    output: Logger,
}

impl CredentialCache {
    pub fn new(issuer: Arc<dyn CredentialIssuer>, safety_margin: Duration, output: Logger) -> Self {
        Self::with_clock(issuer, Arc::new(SystemClock), safety_margin, output)
    }

    pub fn with_clock(
        issuer: Arc<dyn CredentialIssuer>,
        clock: Arc<dyn Clock>,
        safety_margin: Duration,
        output: Logger,
    ) -> Self {
        let safety_margin =
            chrono::Duration::from_std(safety_margin).unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            issuer,
            clock,
            safety_margin,
            cached: RwLock::new(None),
            refresh_guard: tokio::sync::Mutex::new(()),
            fetches: AtomicU64::new(0),
            output,
        }
    }

    /// Return cached credentials, fetching new ones if missing or near expiry.
    ///
    /// Issuer failures are returned as-is; retrying is up to the caller.
    pub async fn get_credentials(&self) -> Result<Credentials> {
        if let Some(credentials) = self.fresh_cached()? {
            return Ok(credentials);
        }

        let _guard = self.refresh_guard.lock().await;

        // Another caller may have refreshed while we waited for the guard
        if let Some(credentials) = self.fresh_cached()? {
            return Ok(credentials);
        }

        self.output.detail("Fetching object store credentials");
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let credentials = self.issuer.issue().await?;

        if !credentials.is_fresh(self.clock.now(), self.safety_margin) {
            self.output.warning(&format!(
                "Issued credentials expire at {} which is inside the refresh margin",
                credentials.expires_at
            ));
        }

        let mut guard = self.cached.write().map_err(|_| {
            IngestError::CredentialFetch("Failed to acquire credential write lock".to_string())
        })?;
        *guard = Some(credentials.clone());

        self.output
            .debug(&format!("Credentials cached until {}", credentials.expires_at));
        Ok(credentials)
    }

    /// Number of issuer fetches performed so far
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    fn fresh_cached(&self) -> Result<Option<Credentials>> {
        let guard = self.cached.read().map_err(|_| {
            IngestError::CredentialFetch("Failed to acquire credential read lock".to_string())
        })?;

        let now = self.clock.now();
        Ok(guard
            .as_ref()
            .filter(|credentials| credentials.is_fresh(now, self.safety_margin))
            .cloned())
    }
}
