//! Catalog registration of uploaded objects

pub mod http;

pub use http::HttpCatalog;

use crate::error::Result;
use crate::task::TaskMetadata;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Body sent to the catalog once the object exists in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationRequest {
    pub key: String,
    pub filename: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub size: u64,
    pub metadata: TaskMetadata,
}

/// Catalog-side identity of a registered object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredAsset {
    pub id: String,
    pub key: String,
}

/// Informs the catalog that an object now exists.
///
/// Only called after a successful upload; a failure here leaves the object
/// orphaned in the store.
#[async_trait]
pub trait CatalogRegistrar: Send + Sync {
    async fn register(&self, request: &RegistrationRequest) -> Result<RegisteredAsset>;
}
