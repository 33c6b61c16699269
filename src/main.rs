//! Media ingest command line tool

use anyhow::{Context, Result};
use media_ingest::cli::{Args, Runner};
use media_ingest::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();
    init_tracing(args.verbose);

    let runner = Runner::new(args);
    let state = runner.run().await.context("Media ingest failed")?;

    // Failed or interrupted tasks make the run unsuccessful
    if state.failed_count > 0 || state.pending_count > 0 {
        std::process::exit(1);
    }

    Ok(())
}
