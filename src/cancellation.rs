//! Cooperative cancellation for a queue run
//!
//! A [`CancellationScope`] wraps a `CancellationToken`. Workers check it before
//! taking new work, and every network call or backoff sleep is raced against
//! it so in-flight requests are dropped promptly instead of running to the end.

use crate::error::{IngestError, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct CancellationScope {
    token: CancellationToken,
}

impl CancellationScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope cancelled together with this one, but cancellable on its own
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fail fast with [`IngestError::Cancelled`] if the scope is already cancelled
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(IngestError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Drive `operation` unless the scope is cancelled first.
    ///
    /// An operation that is already complete wins over a concurrent cancel.
    pub async fn guard<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            result = operation => result,
            _ = self.token.cancelled() => Err(IngestError::Cancelled),
        }
    }

    /// Sleep for `duration`, waking early on cancellation
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(IngestError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
