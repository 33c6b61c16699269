//! Short-lived object store credentials
//!
//! The issuer hands out a key pair plus session token that is valid for a
//! limited time. [`CredentialCache`] keeps the latest bundle and refreshes it
//! lazily once it gets close to expiry.

pub mod cache;
pub mod http;

pub use cache::CredentialCache;
pub use http::HttpCredentialIssuer;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

/// Authorization bundle permitting writes under `path_prefix`
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret: String,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
    pub bucket: String,
    pub region: String,
    pub path_prefix: String,
}

impl Credentials {
    /// Still usable at `now` when keeping `margin` in reserve.
    ///
    /// An expiry too close to the representable minimum counts as stale.
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        self.expires_at
            .checked_sub_signed(margin)
            .is_some_and(|refresh_at| now < refresh_at)
    }
}

// Secrets stay out of logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("expires_at", &self.expires_at)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("path_prefix", &self.path_prefix)
            .finish_non_exhaustive()
    }
}

/// Source of fresh credentials; performs exactly one fetch per call
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn issue(&self) -> Result<Credentials>;
}

/// Time source, injectable so expiry can be simulated
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn credentials(expires_at: DateTime<Utc>) -> Credentials {
        Credentials {
            access_key: "AK".into(),
            secret: "very-secret".into(),
            session_token: "token".into(),
            expires_at,
            bucket: "media".into(),
            region: "eu-1".into(),
            path_prefix: "uploads/u1".into(),
        }
    }

    #[test]
    fn test_freshness_respects_margin() {
        let expiry = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let creds = credentials(expiry);
        let margin = chrono::Duration::seconds(120);

        assert!(creds.is_fresh(expiry - chrono::Duration::seconds(121), margin));
        assert!(!creds.is_fresh(expiry - chrono::Duration::seconds(120), margin));
        assert!(!creds.is_fresh(expiry, margin));
    }

    #[test]
    fn test_extreme_expiry_is_stale_not_a_panic() {
        let creds = credentials(DateTime::<Utc>::MIN_UTC);
        assert!(!creds.is_fresh(Utc::now(), chrono::Duration::seconds(120)));

        let far = credentials(DateTime::<Utc>::MAX_UTC);
        assert!(far.is_fresh(Utc::now(), chrono::Duration::seconds(120)));
    }

    #[test]
    fn test_debug_hides_secret() {
        let creds = credentials(Utc::now());
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("very-secret"));
        assert!(!printed.contains("token\""));
    }
}
