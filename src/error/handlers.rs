//! Standardized mapping of HTTP failures onto pipeline errors
//!
//! Each collaborator (credential issuer, object store, catalog) answers with
//! its own status codes; these helpers keep the resulting messages uniform.

use crate::error::IngestError;
use reqwest::StatusCode;

/// Which collaborator a request was addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    CredentialIssuer,
    ObjectStore,
    Catalog,
}

impl Endpoint {
    fn wrap(self, message: String) -> IngestError {
        match self {
            Endpoint::CredentialIssuer => IngestError::CredentialFetch(message),
            Endpoint::ObjectStore => IngestError::Upload(message),
            Endpoint::Catalog => IngestError::Registration(message),
        }
    }
}

/// Standard error handler for HTTP responses
pub struct HttpErrorHandler;

impl HttpErrorHandler {
    /// Handle credential issuer HTTP errors
    pub fn handle_credential_error(status: StatusCode, error_text: &str) -> IngestError {
        let error_msg = match status.as_u16() {
            400 => format!("Invalid credential request: {}", error_text),
            401 => "Session rejected by credential issuer".to_string(),
            403 => "Credential issuer denied write access".to_string(),
            404 => "Credential endpoint not found".to_string(),
            429 => format!("Credential issuer rate limited the request: {}", error_text),
            500..=599 => format!("Credential issuer unavailable (status {}): {}", status, error_text),
            _ => format!("Credential request failed (status {}): {}", status, error_text),
        };

        IngestError::CredentialFetch(error_msg)
    }

    /// Handle object store write errors
    pub fn handle_upload_error(status: StatusCode, error_text: &str, key: &str) -> IngestError {
        let error_msg = match status.as_u16() {
            400 => format!("Bad request while writing {}: {}", key, error_text),
            401 | 403 => format!(
                "Store refused credentials for {} (expired or insufficient): {}",
                key, error_text
            ),
            404 => format!("Bucket or path not found for {}: {}", key, error_text),
            409 => format!("Conflicting write for {}: {}", key, error_text),
            413 => format!("Object too large for store: {}", key),
            500 => format!("Store server error while writing {}: {}", key, error_text),
            502 | 503 => format!("Store unavailable while writing {}: {}", key, error_text),
            507 => format!("Store out of space while writing {}", key),
            _ => format!("Write of {} failed (status {}): {}", key, status, error_text),
        };

        IngestError::Upload(error_msg)
    }

    /// Handle catalog registration errors that carried no structured failure list
    pub fn handle_registration_error(status: StatusCode, error_text: &str, key: &str) -> IngestError {
        let error_msg = match status.as_u16() {
            400 | 422 => format!("Catalog rejected metadata for {}: {}", key, error_text),
            401 => "Catalog session expired".to_string(),
            403 => format!("Not allowed to register {}", key),
            409 => format!("Object {} is already registered", key),
            429 => format!("Catalog rate limited registration of {}", key),
            500..=599 => format!("Catalog unavailable (status {}): {}", status, error_text),
            _ => format!("Registration of {} failed (status {}): {}", key, status, error_text),
        };

        IngestError::Registration(error_msg)
    }
}

/// Network error categorization and handling
pub struct NetworkErrorHandler;

impl NetworkErrorHandler {
    /// Categorize a transport failure and attribute it to the endpoint's stage
    pub fn handle_network_error(error: &reqwest::Error, endpoint: Endpoint, context: &str) -> IngestError {
        let message = if error.is_timeout() {
            format!("{} timed out: {}", context, error)
        } else if error.is_connect() {
            format!("Connection error during {}: {}", context, error)
        } else if error.is_decode() {
            format!("Malformed response during {}: {}", context, error)
        } else {
            format!("{} network error: {}", context, error)
        };

        endpoint.wrap(message)
    }
}
