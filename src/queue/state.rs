//! Task table and the derived queue view

use crate::task::{TaskId, TaskMetadata, TaskSnapshot, TaskStatus, UploadTask};
use std::collections::HashMap;
use std::sync::Arc;

/// Status change broadcast to subscribers, in the order it was applied
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEvent {
    pub id: TaskId,
    pub status: TaskStatus,
    pub error: Option<String>,
}

/// How a worker pool run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every queued task was taken and finished
    Drained,
    /// `cancel()` stopped the run; unfinished tasks are back to `pending`
    Cancelled,
}

/// Projection of the task list; never mutated directly
#[derive(Debug, Clone, PartialEq)]
pub struct QueueState {
    pub tasks: Vec<TaskSnapshot>,
    pub is_uploading: bool,
    pub total_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub active_count: usize,
    pub pending_count: usize,
}

impl QueueState {
    pub fn from_tasks(tasks: Vec<TaskSnapshot>, is_uploading: bool) -> Self {
        let count = |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count();
        let completed_count = count(TaskStatus::Success);
        let failed_count = count(TaskStatus::Error);
        let pending_count = count(TaskStatus::Pending);
        let active_count = tasks.iter().filter(|t| t.status.is_active()).count();

        Self {
            total_count: tasks.len(),
            tasks,
            is_uploading,
            completed_count,
            failed_count,
            active_count,
            pending_count,
        }
    }

    /// Finished share of the batch in percent
    pub fn progress(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        (self.completed_count + self.failed_count) as f64 / self.total_count as f64 * 100.0
    }

    /// Every task reached a terminal state
    pub fn is_finished(&self) -> bool {
        self.completed_count + self.failed_count == self.total_count
    }
}

/// Whether a task may move from `from` to `to`
pub fn is_valid_transition(from: TaskStatus, to: TaskStatus) -> bool {
    use TaskStatus::*;
    if from.is_terminal() {
        return false;
    }
    match (from, to) {
        (Pending, Compressing) => true,
        (Compressing, Uploading) | (Uploading, Registering) | (Registering, Success) => true,
        // A retry re-enters the pipeline from the top
        (Compressing | Uploading | Registering, Compressing) => true,
        // Cancellation hands the task back
        (Compressing | Uploading | Registering, Pending) => true,
        (Compressing | Uploading | Registering, Error) => true,
        _ => false,
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TaskRecord {
    pub id: TaskId,
    pub file_name: String,
    pub metadata: Arc<TaskMetadata>,
    pub status: TaskStatus,
    pub error: Option<String>,
    pub asset_id: Option<String>,
    pub attempt: u32,
}

impl TaskRecord {
    pub fn from_task(task: &UploadTask) -> Self {
        Self {
            id: task.id().clone(),
            file_name: task.file_name(),
            metadata: task.shared_metadata(),
            status: TaskStatus::Pending,
            error: None,
            asset_id: None,
            attempt: 0,
        }
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id.clone(),
            file_name: self.file_name.clone(),
            metadata: Arc::clone(&self.metadata),
            status: self.status,
            error: self.error.clone(),
            asset_id: self.asset_id.clone(),
        }
    }
}

/// Tasks in insertion order, addressable by id
#[derive(Debug, Default)]
pub(crate) struct TaskTable {
    order: Vec<TaskId>,
    records: HashMap<TaskId, TaskRecord>,
}

impl TaskTable {
    pub fn contains(&self, id: &TaskId) -> bool {
        self.records.contains_key(id)
    }

    pub fn insert(&mut self, record: TaskRecord) {
        self.order.push(record.id.clone());
        self.records.insert(record.id.clone(), record);
    }

    pub fn get(&self, id: &TaskId) -> Option<&TaskRecord> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &TaskId) -> Option<&mut TaskRecord> {
        self.records.get_mut(id)
    }

    pub fn snapshots(&self) -> Vec<TaskSnapshot> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id))
            .map(TaskRecord::snapshot)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{ModelBase, Payload, StyleSource};

    fn snapshot(status: TaskStatus) -> TaskSnapshot {
        let task = UploadTask::new(
            Payload::memory("a.png", vec![]),
            TaskMetadata::new("t", ModelBase::Flux, StyleSource::None),
        );
        let mut record = TaskRecord::from_task(&task);
        record.status = status;
        record.snapshot()
    }

    #[test]
    fn test_counts_are_projected() {
        let state = QueueState::from_tasks(
            vec![
                snapshot(TaskStatus::Success),
                snapshot(TaskStatus::Error),
                snapshot(TaskStatus::Uploading),
                snapshot(TaskStatus::Pending),
            ],
            true,
        );

        assert_eq!(state.total_count, 4);
        assert_eq!(state.completed_count, 1);
        assert_eq!(state.failed_count, 1);
        assert_eq!(state.active_count, 1);
        assert_eq!(state.pending_count, 1);
        assert_eq!(state.progress(), 50.0);
        assert!(!state.is_finished());
    }

    #[test]
    fn test_empty_queue_progress() {
        let state = QueueState::from_tasks(Vec::new(), false);
        assert_eq!(state.progress(), 0.0);
        assert!(state.is_finished());
    }

    #[test]
    fn test_transition_rules() {
        use TaskStatus::*;
        assert!(is_valid_transition(Pending, Compressing));
        assert!(is_valid_transition(Registering, Compressing));
        assert!(is_valid_transition(Uploading, Pending));
        assert!(is_valid_transition(Uploading, Error));
        assert!(!is_valid_transition(Pending, Uploading));
        assert!(!is_valid_transition(Success, Compressing));
        assert!(!is_valid_transition(Error, Pending));
        assert!(!is_valid_transition(Compressing, Registering));
    }

    #[test]
    fn test_table_keeps_insertion_order() {
        let mut table = TaskTable::default();
        let ids: Vec<_> = (0..5)
            .map(|i| {
                let task = UploadTask::new(
                    Payload::memory(format!("{}.png", i), vec![]),
                    TaskMetadata::new("t", ModelBase::Other, StyleSource::Lora),
                );
                table.insert(TaskRecord::from_task(&task));
                task.id().clone()
            })
            .collect();

        let order: Vec<_> = table.snapshots().into_iter().map(|s| s.id).collect();
        assert_eq!(order, ids);
        assert!(table.contains(&ids[2]));
    }
}
