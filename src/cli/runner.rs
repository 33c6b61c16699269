//! Batch runner behind the `media-ingest` binary

use crate::cli::args::Args;
use crate::cli::manifest::Manifest;
use crate::config::IngestConfig;
use crate::error::Result;
use crate::logging::Logger;
use crate::pipeline::IngestPipeline;
use crate::queue::{QueueState, TaskEvent, TaskQueue};
use crate::task::TaskStatus;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

pub struct Runner {
    args: Args,
    output: Logger,
}

impl Runner {
    pub fn new(args: Args) -> Self {
        let output = if args.quiet {
            Logger::new_quiet()
        } else {
            Logger::new(args.verbose)
        };

        Self { args, output }
    }

    /// Ingest the manifest; returns the final queue state
    pub async fn run(&self) -> Result<QueueState> {
        self.output.section("Media Ingest");

        self.args.validate()?;
        let config = self.args.load_config()?;
        let manifest = Manifest::load(&self.args.manifest)?;
        manifest.validate()?;
        self.print_plan(&config, &manifest);

        if self.args.dry_run {
            self.output.info("Dry run mode - skipping upload");
            return Ok(QueueState::from_tasks(Vec::new(), false));
        }

        let pipeline = Arc::new(IngestPipeline::from_config(&config, self.output.clone())?);
        let queue = TaskQueue::new(Arc::clone(&pipeline), &config.queue, self.output.clone());
        let state = self.drive(&queue, manifest).await;

        self.print_summary(&state, pipeline.credentials().fetch_count());
        self.output.info(&format!(
            "Finished in {}",
            self.output.format_duration(self.output.elapsed())
        ));
        Ok(state)
    }

    fn print_plan(&self, config: &IngestConfig, manifest: &Manifest) {
        self.output.summary_kv(
            "Batch",
            &[
                ("Files", manifest.entries.len().to_string()),
                ("Workers", config.queue.concurrency.to_string()),
                ("Attempts per task", config.queue.max_retries.to_string()),
                ("Catalog", config.catalog.endpoint.clone()),
            ],
        );
        for entry in &manifest.entries {
            self.output
                .detail(&format!("  {} ({})", entry.path.display(), entry.metadata.title));
        }
    }

    /// Submit the batch and render progress until the pool goes idle
    async fn drive(&self, queue: &TaskQueue, manifest: Manifest) -> QueueState {
        let mut events = queue.subscribe();
        queue.submit(manifest.into_tasks());

        let interrupt = {
            let queue = queue.clone();
            let output = self.output.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    output.warning("Interrupted, cancelling remaining uploads");
                    queue.cancel();
                }
            })
        };

        let idle = queue.wait_idle();
        tokio::pin!(idle);
        loop {
            tokio::select! {
                _ = &mut idle => break,
                event = events.recv() => match event {
                    Ok(event) => self.render(queue, &event),
                    Err(RecvError::Lagged(skipped)) => self
                        .output
                        .warning(&format!("Progress display skipped {} update(s)", skipped)),
                    Err(RecvError::Closed) => break,
                },
            }
        }

        interrupt.abort();
        queue.state()
    }

    fn render(&self, queue: &TaskQueue, event: &TaskEvent) {
        if event.status == TaskStatus::Pending {
            return;
        }

        let state = queue.state();
        let name = queue
            .task(&event.id)
            .map(|task| task.file_name)
            .unwrap_or_else(|| event.id.to_string());
        let prefix = format!("[{:>5.1}%]", state.progress());

        match (&event.status, &event.error) {
            (TaskStatus::Error, Some(error)) => self
                .output
                .error(&format!("{} {} failed: {}", prefix, name, error)),
            (TaskStatus::Success, _) => self.output.success(&format!(
                "{} {} done ({}/{})",
                prefix,
                name,
                state.completed_count + state.failed_count,
                state.total_count
            )),
            (status, _) => self.output.detail(&format!("{} {} {}", prefix, name, status)),
        }
    }

    fn print_summary(&self, state: &QueueState, credential_fetches: u64) {
        self.output.summary_kv(
            "Summary",
            &[
                ("Total", state.total_count.to_string()),
                ("Succeeded", state.completed_count.to_string()),
                ("Failed", state.failed_count.to_string()),
                ("Not processed", state.pending_count.to_string()),
                ("Credential fetches", credential_fetches.to_string()),
            ],
        );

        for task in state.tasks.iter().filter(|t| t.status == TaskStatus::Error) {
            self.output.error(&format!(
                "  {}: {}",
                task.file_name,
                task.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }
}
