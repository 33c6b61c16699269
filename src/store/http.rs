//! HTTP object store client

use crate::credentials::Credentials;
use crate::error::handlers::{Endpoint, HttpErrorHandler, NetworkErrorHandler};
use crate::error::{IngestError, Result};
use crate::logging::Logger;
use crate::store::{ObjectKey, ObjectStore};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};

pub const SESSION_TOKEN_HEADER: &str = "x-session-token";
pub const CHECKSUM_HEADER: &str = "x-checksum-sha256";

pub struct HttpObjectStore {
    client: Client,
    endpoint_template: String,
    output: Logger,
}

impl HttpObjectStore {
    pub fn new(endpoint_template: &str, timeout: Duration, output: Logger) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IngestError::Upload(format!("Failed to create store client: {}", e)))?;

        Ok(Self {
            client,
            endpoint_template: endpoint_template.trim_end_matches('/').to_string(),
            output,
        })
    }

    /// Expand `{bucket}` and `{region}` and append the key
    pub fn object_url(&self, credentials: &Credentials, key: &ObjectKey) -> String {
        let base = self
            .endpoint_template
            .replace("{bucket}", &credentials.bucket)
            .replace("{region}", &credentials.region);
        format!("{}/{}", base, key)
    }
}

/// Base64 SHA-256 of the body, sent so the store can verify integrity
pub fn content_checksum(body: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(body))
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put_object(
        &self,
        credentials: &Credentials,
        key: &ObjectKey,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let url = self.object_url(credentials, key);
        let size = body.len() as u64;
        let checksum = content_checksum(&body);
        let started = Instant::now();

        self.output.detail(&format!(
            "PUT {} ({})",
            url,
            self.output.format_size(size)
        ));

        let response = self
            .client
            .put(&url)
            .basic_auth(&credentials.access_key, Some(&credentials.secret))
            .header(SESSION_TOKEN_HEADER, &credentials.session_token)
            .header(CONTENT_TYPE, content_type)
            .header(CHECKSUM_HEADER, checksum)
            .body(body)
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, Endpoint::ObjectStore, "object upload"))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(HttpErrorHandler::handle_upload_error(status, &error_text, key.as_str()));
        }

        self.output.detail(&format!(
            "Stored {} in {:.2}s",
            key,
            started.elapsed().as_secs_f64()
        ));
        Ok(())
    }
}
