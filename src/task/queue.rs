use crate::task::types::{Task, TaskId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use tracing::debug;

/// Priority-ordered holding area for tasks waiting to run.
///
/// Higher priority first, FIFO among equal priorities. The queue tracks its own
/// copy of each entry's unmet dependencies so it can re-offer tasks as they clear;
/// the graph remains the authority on readiness.
#[derive(Debug, Default)]
pub struct TaskQueue {
    heap: BinaryHeap<QueueEntry>,
    pending: HashMap<TaskId, BTreeSet<TaskId>>,
    sequence: u64,
    stats: QueueStats,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub total_enqueued: u64,
    pub total_dequeued: u64,
    pub current_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueueEntry {
    priority: i64,
    sequence: u64,
    task_id: TaskId,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a task. Re-adding a queued task refreshes its dependencies and
    /// moves it to the back of its priority band.
    pub fn add(&mut self, task: &Task) {
        if self.pending.contains_key(&task.id) {
            self.heap.retain(|entry| entry.task_id != task.id);
        }

        self.sequence += 1;
        self.heap.push(QueueEntry {
            priority: task.priority,
            sequence: self.sequence,
            task_id: task.id.clone(),
        });
        self.pending
            .insert(task.id.clone(), task.dependencies.clone());
        self.stats.total_enqueued += 1;

        debug!(
            "Queued task {} (priority {}, {} unmet dependencies)",
            task.id,
            task.priority,
            task.dependencies.len()
        );
    }

    /// Pop the highest-priority entry with no tracked dependencies.
    /// Entries passed over on the way are put back unchanged.
    pub fn next(&mut self) -> Option<TaskId> {
        let mut deferred = Vec::new();
        let mut found = None;

        while let Some(entry) = self.heap.pop() {
            let ready = self
                .pending
                .get(&entry.task_id)
                .is_some_and(|deps| deps.is_empty());
            if ready {
                found = Some(entry.task_id);
                break;
            }
            deferred.push(entry);
        }

        self.heap.extend(deferred);

        let task_id = found?;
        self.pending.remove(&task_id);
        self.stats.total_dequeued += 1;
        Some(task_id)
    }

    /// Drop `task_id` from every queued entry's dependencies
    pub fn complete_task(&mut self, task_id: &str) {
        for deps in self.pending.values_mut() {
            deps.remove(task_id);
        }
    }

    /// Point every queued entry waiting on `old` at `new` instead
    pub fn replace_dependency(&mut self, old: &str, new: &str) {
        for deps in self.pending.values_mut() {
            if deps.remove(old) {
                deps.insert(new.to_string());
            }
        }
    }

    /// Permanently drop an entry. Returns true if it was queued.
    pub fn remove(&mut self, task_id: &str) -> bool {
        if self.pending.remove(task_id).is_none() {
            return false;
        }
        self.heap.retain(|entry| entry.task_id != task_id);
        true
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.pending.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            current_size: self.len(),
            ..self.stats.clone()
        }
    }
}
