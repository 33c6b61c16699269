//! Media Ingest Library
//!
//! Client-side ingestion pipeline: files are queued as upload tasks, normalized
//! by the compression stage, written to an object store with short-lived
//! credentials, and registered in a catalog. A bounded worker pool drains the
//! queue with whole-sequence retries and cooperative cancellation.

pub mod cancellation;
pub mod catalog;
pub mod cli;
pub mod compression;
pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod queue;
pub mod store;
pub mod task;

pub use cancellation::CancellationScope;
pub use config::IngestConfig;
pub use error::{IngestError, Result};
pub use logging::Logger;
pub use pipeline::IngestPipeline;
pub use queue::{BatchOutcome, QueueState, TaskEvent, TaskQueue};
pub use task::{ModelBase, Payload, StyleSource, TaskId, TaskMetadata, TaskSnapshot, TaskStatus, UploadTask};
