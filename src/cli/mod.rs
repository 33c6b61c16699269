//! Command line interface module
//!
//! Argument parsing, manifest loading and the runner that drives one batch
//! through the task queue for the `media-ingest` binary.

pub mod args;
pub mod manifest;
pub mod runner;

pub use args::Args;
pub use manifest::{Manifest, ManifestEntry};
pub use runner::Runner;
