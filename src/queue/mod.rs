//! Task queue and worker pool
//!
//! Submitted tasks land in one shared pending queue. A pool of at most
//! `concurrency` workers drains it: each worker pops a task under the
//! scheduler lock, drives it through the [`IngestPipeline`], and moves on.
//! A worker that finds the queue empty (or the run cancelled) retires; when
//! the last one retires the run is over and the completion callback fires.
//!
//! Progress is derived: [`TaskQueue::state`] projects counts from the task
//! table on every call, and [`TaskQueue::subscribe`] streams each transition.

pub mod state;

pub use state::{BatchOutcome, QueueState, TaskEvent};

use crate::cancellation::CancellationScope;
use crate::config::QueueConfig;
use crate::error::IngestError;
use crate::logging::Logger;
use crate::pipeline::IngestPipeline;
use crate::task::{TaskId, TaskSnapshot, TaskStatus, UploadTask};
use state::{TaskRecord, TaskTable, is_valid_transition};
use futures::FutureExt;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{broadcast, watch};

/// Invoked once each time a worker pool run ends
pub type CompletionCallback = Arc<dyn Fn(&QueueState, BatchOutcome) + Send + Sync>;

#[derive(Default)]
struct Scheduler {
    pending: VecDeque<UploadTask>,
    active_workers: usize,
    run: Option<CancellationScope>,
    /// Work arrived while a cancelled run was still winding down
    restart_requested: bool,
    next_worker_id: usize,
}

enum WorkerStep {
    Run(UploadTask),
    Retire(Option<BatchOutcome>),
}

struct QueueInner {
    pipeline: Arc<IngestPipeline>,
    concurrency: usize,
    root: CancellationScope,
    table: RwLock<TaskTable>,
    scheduler: Mutex<Scheduler>,
    events: broadcast::Sender<TaskEvent>,
    uploading: watch::Sender<bool>,
    on_complete: Option<CompletionCallback>,
    output: Logger,
}

/// Handle to a task queue; clones share the same queue
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

impl TaskQueue {
    pub fn new(pipeline: Arc<IngestPipeline>, config: &QueueConfig, output: Logger) -> Self {
        Self::build(pipeline, config, None, output)
    }

    /// Like [`TaskQueue::new`], with a callback run whenever a pool finishes
    pub fn with_completion_callback<F>(
        pipeline: Arc<IngestPipeline>,
        config: &QueueConfig,
        output: Logger,
        callback: F,
    ) -> Self
    where
        F: Fn(&QueueState, BatchOutcome) + Send + Sync + 'static,
    {
        Self::build(pipeline, config, Some(Arc::new(callback)), output)
    }

    fn build(
        pipeline: Arc<IngestPipeline>,
        config: &QueueConfig,
        on_complete: Option<CompletionCallback>,
        output: Logger,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (uploading, _) = watch::channel(false);

        Self {
            inner: Arc::new(QueueInner {
                pipeline,
                concurrency: config.concurrency.max(1),
                root: CancellationScope::new(),
                table: RwLock::new(TaskTable::default()),
                scheduler: Mutex::new(Scheduler::default()),
                events,
                uploading,
                on_complete,
                output,
            }),
        }
    }

    /// Queue tasks and make sure a worker pool is draining them.
    ///
    /// Tasks whose id is already known are ignored. Returns the accepted ids.
    /// Outside a tokio runtime the tasks are queued but stay `pending` until
    /// [`TaskQueue::resume`] is called from within one.
    pub fn submit(&self, tasks: Vec<UploadTask>) -> Vec<TaskId> {
        let inner = &self.inner;
        let mut accepted = Vec::with_capacity(tasks.len());

        {
            let mut table = inner.write_table();
            for task in tasks {
                if table.contains(task.id()) {
                    inner
                        .output
                        .warning(&format!("Task {} already queued, ignoring", task.id()));
                    continue;
                }
                table.insert(TaskRecord::from_task(&task));
                inner.emit(task.id(), TaskStatus::Pending, None);
                accepted.push(task);
            }
        }

        let ids: Vec<TaskId> = accepted.iter().map(|task| task.id().clone()).collect();
        if accepted.is_empty() {
            return ids;
        }

        inner
            .output
            .info(&format!("Queued {} task(s)", accepted.len()));

        let mut scheduler = inner.lock_scheduler();
        scheduler.pending.extend(accepted);
        QueueInner::ensure_workers(inner, &mut scheduler);
        ids
    }

    /// Stop the current run.
    ///
    /// Workers take no new tasks, in-flight network calls are aborted, and the
    /// affected tasks return to `pending`. Finished tasks are untouched.
    pub fn cancel(&self) {
        let mut scheduler = self.inner.lock_scheduler();
        scheduler.restart_requested = false;
        if let Some(run) = &scheduler.run {
            if !run.is_cancelled() {
                self.inner.output.warning(&format!(
                    "Cancelling upload run ({} task(s) still queued)",
                    scheduler.pending.len()
                ));
                run.cancel();
            }
        }
    }

    /// Start a pool for tasks left `pending` by a cancel; returns how many are queued
    pub fn resume(&self) -> usize {
        let mut scheduler = self.inner.lock_scheduler();
        let queued = scheduler.pending.len();
        QueueInner::ensure_workers(&self.inner, &mut scheduler);
        queued
    }

    /// Snapshot of every task plus derived counts
    pub fn state(&self) -> QueueState {
        let tasks = self.inner.read_table().snapshots();
        QueueState::from_tasks(tasks, self.is_uploading())
    }

    pub fn task(&self, id: &TaskId) -> Option<TaskSnapshot> {
        self.inner.read_table().get(id).map(TaskRecord::snapshot)
    }

    pub fn is_uploading(&self) -> bool {
        *self.inner.uploading.borrow()
    }

    /// Stream of status transitions from now on
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.events.subscribe()
    }

    /// Resolve once no worker pool is running
    pub async fn wait_idle(&self) {
        let mut receiver = self.inner.uploading.subscribe();
        let _ = receiver.wait_for(|uploading| !*uploading).await;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

impl QueueInner {
    fn lock_scheduler(&self) -> MutexGuard<'_, Scheduler> {
        self.scheduler.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_table(&self) -> RwLockReadGuard<'_, TaskTable> {
        self.table.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, TaskTable> {
        self.table.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish an event; callers hold the table write lock so order is preserved
    fn emit(&self, id: &TaskId, status: TaskStatus, error: Option<String>) {
        // No subscribers is fine
        let _ = self.events.send(TaskEvent {
            id: id.clone(),
            status,
            error,
        });
    }

    /// Top the pool up to `concurrency` workers while there is queued work
    fn ensure_workers(this: &Arc<Self>, scheduler: &mut Scheduler) {
        if scheduler.run.as_ref().is_some_and(CancellationScope::is_cancelled) {
            // Interrupted tasks are still being handed back; the last retiring
            // worker of the cancelled run restarts the pool
            scheduler.restart_requested = true;
            return;
        }
        if scheduler.pending.is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            this.output.error(&format!(
                "No async runtime available, {} task(s) left pending",
                scheduler.pending.len()
            ));
            return;
        };

        let scope = match &scheduler.run {
            Some(run) => run.clone(),
            None => {
                let run = this.root.child();
                scheduler.run = Some(run.clone());
                this.uploading.send_replace(true);
                this.output.detail("Starting upload workers");
                run
            }
        };

        let wanted = this
            .concurrency
            .min(scheduler.active_workers + scheduler.pending.len());
        while scheduler.active_workers < wanted {
            scheduler.active_workers += 1;
            scheduler.next_worker_id += 1;
            let worker_id = scheduler.next_worker_id;
            let inner = Arc::clone(this);
            let scope = scope.clone();
            runtime.spawn(async move { inner.worker(worker_id, scope).await });
        }
    }

    async fn worker(self: Arc<Self>, worker_id: usize, scope: CancellationScope) {
        self.output.debug(&format!("Worker {} started", worker_id));

        loop {
            let step = {
                let mut scheduler = self.lock_scheduler();
                let next = if scope.is_cancelled() {
                    None
                } else {
                    scheduler.pending.pop_front()
                };
                match next {
                    Some(task) => WorkerStep::Run(task),
                    None => WorkerStep::Retire(Self::retire_worker(&self, &mut scheduler, &scope)),
                }
            };

            match step {
                WorkerStep::Run(task) => self.run_task(task, &scope).await,
                WorkerStep::Retire(outcome) => {
                    self.output.debug(&format!("Worker {} exiting", worker_id));
                    if let Some(outcome) = outcome {
                        self.finish_run(outcome);
                    }
                    break;
                }
            }
        }
    }

    /// Account for a retiring worker; returns the outcome if it was the last one
    fn retire_worker(
        this: &Arc<Self>,
        scheduler: &mut Scheduler,
        scope: &CancellationScope,
    ) -> Option<BatchOutcome> {
        scheduler.active_workers = scheduler.active_workers.saturating_sub(1);
        if scheduler.active_workers > 0 {
            return None;
        }

        scheduler.run = None;
        let outcome = if scope.is_cancelled() {
            BatchOutcome::Cancelled
        } else {
            BatchOutcome::Drained
        };

        if scheduler.restart_requested {
            scheduler.restart_requested = false;
            Self::ensure_workers(this, scheduler);
        }
        if scheduler.run.is_none() {
            this.uploading.send_replace(false);
        }
        Some(outcome)
    }

    fn finish_run(&self, outcome: BatchOutcome) {
        let state = QueueState::from_tasks(self.read_table().snapshots(), *self.uploading.borrow());

        match outcome {
            BatchOutcome::Drained => self.output.success(&format!(
                "Upload run finished: {} succeeded, {} failed of {}",
                state.completed_count, state.failed_count, state.total_count
            )),
            BatchOutcome::Cancelled => self.output.warning(&format!(
                "Upload run cancelled: {} task(s) left pending",
                state.pending_count
            )),
        }

        if let Some(callback) = &self.on_complete {
            callback(&state, outcome);
        }
    }

    async fn run_task(self: &Arc<Self>, task: UploadTask, scope: &CancellationScope) {
        let id = task.id().clone();
        let report = |status: TaskStatus, attempt: u32| self.transition(&id, status, attempt, None, None);

        // A panicking stage fails its task, never the worker
        let result = AssertUnwindSafe(self.pipeline.process(&task, scope, &report))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(IngestError::Panicked(panic_message(panic.as_ref()))));

        match result {
            Ok(asset) => {
                self.output
                    .success(&format!("{} registered as {}", task.file_name(), asset.id));
                self.transition(&id, TaskStatus::Success, 0, None, Some(asset.id));
            }
            Err(e) if e.is_cancelled() => {
                self.output
                    .detail(&format!("{} interrupted, returning to queue", task.file_name()));
                self.transition(&id, TaskStatus::Pending, 0, None, None);
                self.lock_scheduler().pending.push_front(task);
            }
            Err(e) => {
                self.output
                    .error(&format!("{} failed ({}): {}", task.file_name(), e.kind(), e));
                self.transition(&id, TaskStatus::Error, 0, Some(e.to_string()), None);
            }
        }
    }

    /// Apply a status change to the table and broadcast it
    fn transition(
        &self,
        id: &TaskId,
        status: TaskStatus,
        attempt: u32,
        error: Option<String>,
        asset_id: Option<String>,
    ) {
        let mut table = self.write_table();
        let Some(record) = table.get_mut(id) else {
            return;
        };

        // Cancelled before its first stage started; nothing changed
        if record.status == TaskStatus::Pending && status == TaskStatus::Pending {
            return;
        }

        if !is_valid_transition(record.status, status) {
            self.output.warning(&format!(
                "Unexpected transition {} -> {} for task {}",
                record.status, status, id
            ));
        }

        record.status = status;
        if attempt > 0 {
            record.attempt = attempt;
        }
        match status {
            TaskStatus::Pending => {
                record.attempt = 0;
                record.error = None;
            }
            TaskStatus::Error => record.error = error.clone(),
            TaskStatus::Success => record.asset_id = asset_id,
            _ => {}
        }

        self.output
            .debug(&format!("Task {} -> {} (attempt {})", id, status, record.attempt));
        self.emit(id, status, error);
    }
}
