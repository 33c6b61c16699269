//! Command-line argument parsing

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "media-ingest")]
#[command(about = "Compress media files, upload them to object storage and register them in the catalog")]
#[command(version)]
pub struct Args {
    /// Batch manifest
    #[arg(
        long = "manifest",
        short = 'm',
        help = "JSON manifest listing the files to ingest and their metadata"
    )]
    pub manifest: PathBuf,

    /// Configuration file path
    #[arg(long = "config", short = 'c', help = "Path to JSON configuration file")]
    pub config: Option<PathBuf>,

    /// Number of concurrent workers
    #[arg(
        long = "concurrency",
        short = 'j',
        help = "Number of concurrent upload workers (overrides config)"
    )]
    pub concurrency: Option<usize>,

    /// Attempts per task
    #[arg(
        long = "retry",
        help = "Attempts per task before it is marked failed (overrides config)"
    )]
    pub retry: Option<u32>,

    /// Verbose output
    #[arg(long = "verbose", short = 'v', help = "Enable verbose output")]
    pub verbose: bool,

    /// Quiet mode
    #[arg(
        long = "quiet",
        short = 'q',
        conflicts_with = "verbose",
        help = "Only print errors"
    )]
    pub quiet: bool,

    /// Dry run mode (validate without uploading)
    #[arg(
        long = "dry-run",
        short = 'n',
        help = "Validate the manifest and configuration without uploading"
    )]
    pub dry_run: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    /// Validate arguments
    pub fn validate(&self) -> Result<()> {
        if !self.manifest.is_file() {
            return Err(IngestError::Validation(format!(
                "Manifest does not exist: {}",
                self.manifest.display()
            )));
        }

        if let Some(config) = &self.config {
            if !config.is_file() {
                return Err(IngestError::Validation(format!(
                    "Config file does not exist: {}",
                    config.display()
                )));
            }
        }

        if self.concurrency == Some(0) {
            return Err(IngestError::Validation(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        if self.retry == Some(0) {
            return Err(IngestError::Validation(
                "Retry attempts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve the effective configuration: file, then environment, then flags
    pub fn load_config(&self) -> Result<IngestConfig> {
        let mut config = match &self.config {
            Some(path) => IngestConfig::from_file(path)?.merge_env(),
            None => IngestConfig::from_env(),
        };

        if let Some(concurrency) = self.concurrency {
            config.queue.concurrency = concurrency;
        }
        if let Some(retry) = self.retry {
            config.queue.max_retries = retry;
        }
        config.verbose |= self.verbose;

        config.validate()?;
        Ok(config)
    }
}
