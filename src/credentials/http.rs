//! HTTP client for the credential issuing endpoint

use crate::credentials::{CredentialIssuer, Credentials};
use crate::error::handlers::{Endpoint, HttpErrorHandler, NetworkErrorHandler};
use crate::error::{IngestError, Result};
use crate::logging::Logger;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// `expiresAt` arrives either as RFC 3339 text or as Unix seconds
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Expiry {
    Seconds(i64),
    Timestamp(DateTime<Utc>),
}

impl Expiry {
    fn into_datetime(self) -> Result<DateTime<Utc>> {
        let at = match self {
            Expiry::Timestamp(at) => at,
            Expiry::Seconds(secs) => Utc.timestamp_opt(secs, 0).single().ok_or_else(|| {
                IngestError::CredentialFetch(format!("Expiry {} is out of range", secs))
            })?,
        };

        // Nothing before the epoch is a real expiry
        if at.timestamp() < 0 {
            return Err(IngestError::CredentialFetch(format!(
                "Expiry {} is out of range",
                at.to_rfc3339()
            )));
        }
        Ok(at)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialResponse {
    access_key: Option<String>,
    secret: Option<String>,
    session_token: Option<String>,
    expires_at: Option<Expiry>,
    bucket: Option<String>,
    region: Option<String>,
    #[serde(default)]
    path_prefix: String,
    /// Issuer-reported denial, sent with a 2xx by some deployments
    error: Option<String>,
}

impl CredentialResponse {
    fn into_credentials(self) -> Result<Credentials> {
        if let Some(reason) = self.error {
            return Err(IngestError::CredentialFetch(format!(
                "Issuer denied credentials: {}",
                reason
            )));
        }

        let missing = |field: &str| {
            IngestError::CredentialFetch(format!("Credential response is missing {}", field))
        };

        Ok(Credentials {
            access_key: self.access_key.ok_or_else(|| missing("accessKey"))?,
            secret: self.secret.ok_or_else(|| missing("secret"))?,
            session_token: self.session_token.ok_or_else(|| missing("sessionToken"))?,
            expires_at: self.expires_at.ok_or_else(|| missing("expiresAt"))?.into_datetime()?,
            bucket: self.bucket.ok_or_else(|| missing("bucket"))?,
            region: self.region.ok_or_else(|| missing("region"))?,
            path_prefix: self.path_prefix.trim_matches('/').to_string(),
        })
    }
}

pub struct HttpCredentialIssuer {
    client: Client,
    endpoint: String,
    output: Logger,
}

impl HttpCredentialIssuer {
    pub fn new(endpoint: &str, timeout: Duration, output: Logger) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            IngestError::CredentialFetch(format!("Failed to create credential client: {}", e))
        })?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            output,
        })
    }
}

#[async_trait]
impl CredentialIssuer for HttpCredentialIssuer {
    async fn issue(&self) -> Result<Credentials> {
        self.output
            .detail(&format!("Requesting credentials from: {}", self.endpoint));

        let response = self.client.get(&self.endpoint).send().await.map_err(|e| {
            NetworkErrorHandler::handle_network_error(&e, Endpoint::CredentialIssuer, "credential request")
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(HttpErrorHandler::handle_credential_error(status, &error_text));
        }

        let body = response.text().await.map_err(|e| {
            NetworkErrorHandler::handle_network_error(&e, Endpoint::CredentialIssuer, "credential response")
        })?;
        let parsed: CredentialResponse = serde_json::from_str(&body).map_err(|e| {
            IngestError::CredentialFetch(format!("Malformed credential response: {}", e))
        })?;

        let credentials = parsed.into_credentials()?;
        self.output.detail(&format!(
            "Credentials issued for bucket {} (expires {})",
            credentials.bucket, credentials.expires_at
        ));
        Ok(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_unix_expiry() {
        let parsed: CredentialResponse = serde_json::from_str(
            r#"{"accessKey":"a","secret":"s","sessionToken":"t","expiresAt":1767225600,
                "bucket":"b","region":"r","pathPrefix":"/users/7/"}"#,
        )
        .unwrap();
        let creds = parsed.into_credentials().unwrap();
        assert_eq!(creds.expires_at.timestamp(), 1_767_225_600);
        assert_eq!(creds.path_prefix, "users/7");
    }

    #[test]
    fn test_parses_rfc3339_expiry() {
        let parsed: CredentialResponse = serde_json::from_str(
            r#"{"accessKey":"a","secret":"s","sessionToken":"t","expiresAt":"2026-01-01T00:00:00Z",
                "bucket":"b","region":"r"}"#,
        )
        .unwrap();
        let creds = parsed.into_credentials().unwrap();
        assert_eq!(creds.expires_at.to_rfc3339(), "2026-01-01T00:00:00+00:00");
        assert_eq!(creds.path_prefix, "");
    }

    #[test]
    fn test_rejects_out_of_range_expiry() {
        let min_secs = DateTime::<Utc>::MIN_UTC.timestamp();
        let body = format!(
            r#"{{"accessKey":"a","secret":"s","sessionToken":"t","expiresAt":{},"bucket":"b","region":"r"}}"#,
            min_secs
        );
        let parsed: CredentialResponse = serde_json::from_str(&body).unwrap();
        let err = parsed.into_credentials().unwrap_err();
        assert!(matches!(err, IngestError::CredentialFetch(ref msg) if msg.contains("out of range")));

        let parsed: CredentialResponse = serde_json::from_str(
            r#"{"accessKey":"a","secret":"s","sessionToken":"t","expiresAt":"1900-01-01T00:00:00Z",
                "bucket":"b","region":"r"}"#,
        )
        .unwrap();
        assert!(matches!(parsed.into_credentials(), Err(IngestError::CredentialFetch(_))));
    }

    #[test]
    fn test_denial_and_missing_fields() {
        let denied: CredentialResponse = serde_json::from_str(r#"{"error":"quota exceeded"}"#).unwrap();
        let err = denied.into_credentials().unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));

        let partial: CredentialResponse = serde_json::from_str(r#"{"accessKey":"a"}"#).unwrap();
        assert!(matches!(partial.into_credentials(), Err(IngestError::CredentialFetch(_))));
    }
}
