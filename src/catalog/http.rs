//! HTTP catalog client

use crate::catalog::{CatalogRegistrar, RegisteredAsset, RegistrationRequest};
use crate::error::handlers::{Endpoint, HttpErrorHandler, NetworkErrorHandler};
use crate::error::{IngestError, Result};
use crate::logging::Logger;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct FieldFailure {
    #[serde(default)]
    field: Option<String>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RegistrationResponse {
    id: Option<serde_json::Value>,
    #[serde(default)]
    errors: Vec<FieldFailure>,
}

fn describe_failures(failures: &[FieldFailure]) -> String {
    failures
        .iter()
        .map(|failure| match &failure.field {
            Some(field) => format!("{}: {}", field, failure.message),
            None => failure.message.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

pub struct HttpCatalog {
    client: Client,
    endpoint: String,
    output: Logger,
}

impl HttpCatalog {
    pub fn new(endpoint: &str, timeout: Duration, output: Logger) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            IngestError::Registration(format!("Failed to create catalog client: {}", e))
        })?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            output,
        })
    }
}

#[async_trait]
impl CatalogRegistrar for HttpCatalog {
    async fn register(&self, request: &RegistrationRequest) -> Result<RegisteredAsset> {
        self.output
            .detail(&format!("Registering {} with catalog", request.key));

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, Endpoint::Catalog, "registration"))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<RegistrationResponse>(&body).ok();

        // A structured failure list wins over the bare status code
        if let Some(parsed) = &parsed {
            if !parsed.errors.is_empty() {
                return Err(IngestError::Registration(format!(
                    "Catalog rejected {}: {}",
                    request.key,
                    describe_failures(&parsed.errors)
                )));
            }
        }

        if !status.is_success() {
            return Err(HttpErrorHandler::handle_registration_error(status, &body, &request.key));
        }

        let id = match parsed.and_then(|parsed| parsed.id) {
            Some(serde_json::Value::String(id)) => id,
            Some(serde_json::Value::Number(id)) => id.to_string(),
            _ => {
                return Err(IngestError::Registration(format!(
                    "Catalog response for {} carried no asset id",
                    request.key
                )));
            }
        };

        self.output
            .detail(&format!("Registered {} as asset {}", request.key, id));
        Ok(RegisteredAsset {
            id,
            key: request.key.clone(),
        })
    }
}
