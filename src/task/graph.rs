use crate::task::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::{debug, info, warn};

/// Dependency DAG over registered tasks.
///
/// Edges run from a dependency to the task that needs it. A dependency may name
/// a task that is not registered yet; the edge is kept and the dependent stays
/// not-ready until that task is registered and completes.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TaskGraph {
    tasks: HashMap<TaskId, Task>,
    /// Registration order, used for deterministic iteration
    order: Vec<TaskId>,
    /// Declared prerequisites per task. Unlike `Task::dependencies` these never shrink.
    prerequisites: HashMap<TaskId, BTreeSet<TaskId>>,
    /// Reverse edges: dependency -> tasks waiting on it
    dependents: HashMap<TaskId, BTreeSet<TaskId>>,
    pub metadata: GraphMetadata,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GraphMetadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u32,
    pub total_tasks_created: u32,
}

/// Graph statistics for monitoring
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct GraphStatistics {
    pub total_tasks: u32,
    pub pending_tasks: u32,
    pub in_progress_tasks: u32,
    pub completed_tasks: u32,
    pub failed_tasks: u32,
    pub blocked_tasks: u32,
    pub skipped_tasks: u32,
    /// Mean seconds of the finishing attempt over completed tasks
    pub average_completion_time: Option<f64>,
    pub success_rate: f64,
}

impl TaskGraph {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            tasks: HashMap::new(),
            order: Vec::new(),
            prerequisites: HashMap::new(),
            dependents: HashMap::new(),
            metadata: GraphMetadata {
                created_at: now,
                updated_at: now,
                version: 1,
                total_tasks_created: 0,
            },
        }
    }

    /// Register a task. Fails without touching the graph on duplicate ids or cycles.
    pub fn add_task(&mut self, mut task: Task) -> Result<TaskId, TaskError> {
        let task_id = task.id.clone();

        if self.tasks.contains_key(&task_id) {
            return Err(TaskError::InvalidTaskDefinition(format!(
                "task id {} is already registered",
                task_id
            )));
        }

        self.check_acyclic(&task_id, &task.dependencies)?;

        for dep_id in &task.dependencies {
            if !self.tasks.contains_key(dep_id) {
                debug!(
                    "Task {} has dependency {} that doesn't exist yet",
                    task_id, dep_id
                );
            }
            self.dependents
                .entry(dep_id.clone())
                .or_default()
                .insert(task_id.clone());
        }
        self.prerequisites
            .insert(task_id.clone(), task.dependencies.clone());

        // Prerequisites that already finished are satisfied on arrival
        let satisfied: Vec<TaskId> = task
            .dependencies
            .iter()
            .filter(|dep| self.is_completed(dep))
            .cloned()
            .collect();
        for dep_id in satisfied {
            task.remove_dependency(&dep_id);
        }

        self.tasks.insert(task_id.clone(), task);
        self.order.push(task_id.clone());
        self.touch();
        self.metadata.total_tasks_created += 1;

        debug!("Added task {} to graph", task_id);
        Ok(task_id)
    }

    /// Adding `task_id` with `deps` closes a cycle iff some dep is `task_id` itself
    /// or already reachable from it through existing dependents.
    fn check_acyclic(&self, task_id: &str, deps: &BTreeSet<TaskId>) -> Result<(), TaskError> {
        if deps.contains(task_id) {
            return Err(TaskError::CycleDetected {
                task_id: task_id.to_string(),
                via: task_id.to_string(),
            });
        }

        let downstream = self.descendants(task_id);
        if let Some(via) = deps.iter().find(|dep| downstream.contains(*dep)) {
            warn!("Rejected task {}: cycle through {}", task_id, via);
            return Err(TaskError::CycleDetected {
                task_id: task_id.to_string(),
                via: via.clone(),
            });
        }

        Ok(())
    }

    pub fn get_task(&self, task_id: &str) -> Result<&Task, TaskError> {
        self.tasks
            .get(task_id)
            .ok_or_else(|| TaskError::TaskNotFound(task_id.to_string()))
    }

    pub fn get_task_mut(&mut self, task_id: &str) -> Result<&mut Task, TaskError> {
        self.tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskError::TaskNotFound(task_id.to_string()))
    }

    /// Replace the stored copy of a task with an updated one
    pub fn update_task(&mut self, task: Task) -> Result<(), TaskError> {
        let slot = self.get_task_mut(&task.id)?;
        *slot = task;
        self.touch();
        Ok(())
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.tasks.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks in registration order
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.order.clone()
    }

    pub fn tasks_by_status(&self, status: TaskStatus) -> Vec<TaskId> {
        self.tasks()
            .filter(|task| task.status == status)
            .map(|task| task.id.clone())
            .collect()
    }

    fn is_completed(&self, task_id: &str) -> bool {
        self.tasks
            .get(task_id)
            .is_some_and(|task| task.status == TaskStatus::Completed)
    }

    /// Pending with every dependency registered and Completed
    pub fn is_ready(&self, task_id: &str) -> bool {
        self.tasks.get(task_id).is_some_and(|task| {
            task.status == TaskStatus::Pending
                && task.dependencies.iter().all(|dep| self.is_completed(dep))
        })
    }

    /// Ready tasks in registration order, capped at `limit` when given
    pub fn ready_tasks(&self, limit: Option<usize>) -> Vec<TaskId> {
        let ready = self
            .order
            .iter()
            .filter(|id| self.is_ready(id))
            .cloned();

        match limit {
            Some(limit) => ready.take(limit).collect(),
            None => ready.collect(),
        }
    }

    /// Direct dependents of a task
    pub fn dependents_of(&self, task_id: &str) -> Vec<TaskId> {
        self.dependents
            .get(task_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Everything `task_id` transitively depends on, registered or not
    pub fn ancestors(&self, task_id: &str) -> BTreeSet<TaskId> {
        Self::reachable(task_id, &self.prerequisites)
    }

    /// Everything that transitively depends on `task_id`
    pub fn descendants(&self, task_id: &str) -> BTreeSet<TaskId> {
        Self::reachable(task_id, &self.dependents)
    }

    fn reachable(start: &str, edges: &HashMap<TaskId, BTreeSet<TaskId>>) -> BTreeSet<TaskId> {
        let mut seen = BTreeSet::new();
        let mut frontier: VecDeque<&str> = VecDeque::from([start]);

        while let Some(current) = frontier.pop_front() {
            if let Some(next) = edges.get(current) {
                for id in next {
                    if id != start && seen.insert(id.clone()) {
                        frontier.push_back(id.as_str());
                    }
                }
            }
        }

        seen
    }

    /// Mark `task_id`'s prerequisites satisfied in every dependent.
    /// Returns the dependents that became ready.
    pub fn complete_task(&mut self, task_id: &str) -> Vec<TaskId> {
        let dependents = self.dependents_of(task_id);
        let mut unblocked = Vec::new();

        for dependent_id in dependents {
            if let Some(dependent) = self.tasks.get_mut(&dependent_id)
                && dependent.remove_dependency(task_id)
                && dependent.is_ready()
            {
                unblocked.push(dependent_id);
            }
        }

        if !unblocked.is_empty() {
            debug!("Completing {} unblocked {:?}", task_id, unblocked);
        }
        self.touch();
        unblocked
    }

    /// Register `replacement` and move every dependent of `failed` onto it.
    ///
    /// The replacement inherits the failed task's position in the DAG, so it must
    /// not depend on the failed task or on anything downstream of it.
    pub fn substitute(&mut self, failed: &str, replacement: Task) -> Result<TaskId, TaskError> {
        let downstream = self.descendants(failed);
        if let Some(via) = replacement
            .dependencies
            .iter()
            .find(|dep| *dep == failed || downstream.contains(*dep))
        {
            return Err(TaskError::CycleDetected {
                task_id: replacement.id.clone(),
                via: via.clone(),
            });
        }

        let replacement_id = self.add_task(replacement)?;
        let moved = self.dependents.remove(failed).unwrap_or_default();

        for dependent_id in &moved {
            if let Some(dependent) = self.tasks.get_mut(dependent_id)
                && dependent.remove_dependency(failed)
            {
                dependent.dependencies.insert(replacement_id.clone());
            }
            if let Some(declared) = self.prerequisites.get_mut(dependent_id) {
                declared.remove(failed);
                declared.insert(replacement_id.clone());
            }
        }

        self.dependents
            .entry(replacement_id.clone())
            .or_default()
            .extend(moved.iter().cloned());
        self.touch();

        info!(
            "Substituted {} for failed task {} ({} dependents moved)",
            replacement_id,
            failed,
            moved.len()
        );
        Ok(replacement_id)
    }

    /// Longest dependency chain by task count over registered tasks.
    /// Returns an empty path if the registered subgraph is not a DAG.
    pub fn critical_path(&self) -> Vec<TaskId> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        for id in &self.order {
            let registered_deps = self
                .prerequisites
                .get(id)
                .map(|deps| deps.iter().filter(|dep| self.contains(dep)).count())
                .unwrap_or(0);
            in_degree.insert(id.as_str(), registered_deps);
        }

        let mut queue: VecDeque<&str> = self
            .order
            .iter()
            .map(String::as_str)
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();
        let mut topo: Vec<&str> = Vec::with_capacity(self.order.len());

        while let Some(id) = queue.pop_front() {
            topo.push(id);
            if let Some(children) = self.dependents.get(id) {
                for child in children {
                    if let Some(degree) = in_degree.get_mut(child.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(child.as_str());
                        }
                    }
                }
            }
        }

        if topo.len() != self.order.len() {
            warn!(
                "Critical path unavailable: sorted {} of {} tasks",
                topo.len(),
                self.order.len()
            );
            return Vec::new();
        }

        let mut length: HashMap<&str, usize> = HashMap::new();
        let mut previous: HashMap<&str, &str> = HashMap::new();
        for &id in &topo {
            let mut best = 1;
            if let Some(deps) = self.prerequisites.get(id) {
                for dep in deps {
                    if let Some(&dep_length) = length.get(dep.as_str())
                        && dep_length + 1 > best
                    {
                        best = dep_length + 1;
                        previous.insert(id, dep.as_str());
                    }
                }
            }
            length.insert(id, best);
        }

        let Some(mut current) = topo
            .iter()
            .copied()
            .fold(None::<&str>, |best, id| match best {
                Some(b) if length[b] >= length[id] => Some(b),
                _ => Some(id),
            })
        else {
            return Vec::new();
        };

        let mut path = vec![current.to_string()];
        while let Some(&prev) = previous.get(current) {
            path.push(prev.to_string());
            current = prev;
        }
        path.reverse();
        path
    }

    /// Move tasks left Blocked by an earlier run back to Pending
    pub fn reopen_blocked(&mut self) -> usize {
        let mut reopened = 0;
        for task in self.tasks.values_mut() {
            if task.status == TaskStatus::Blocked {
                task.status = TaskStatus::Pending;
                task.error = None;
                reopened += 1;
            }
        }
        reopened
    }

    pub fn statistics(&self) -> GraphStatistics {
        let mut stats = GraphStatistics {
            total_tasks: self.tasks.len() as u32,
            ..Default::default()
        };
        let mut completion_times = Vec::new();

        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Pending => stats.pending_tasks += 1,
                TaskStatus::InProgress => stats.in_progress_tasks += 1,
                TaskStatus::Completed => {
                    stats.completed_tasks += 1;
                    if let Some(seconds) = task.metrics.completion_time {
                        completion_times.push(seconds);
                    }
                }
                TaskStatus::Failed => stats.failed_tasks += 1,
                TaskStatus::Blocked => stats.blocked_tasks += 1,
                TaskStatus::Skipped => stats.skipped_tasks += 1,
            }
        }

        if !completion_times.is_empty() {
            stats.average_completion_time =
                Some(completion_times.iter().sum::<f64>() / completion_times.len() as f64);
        }

        let finished = stats.completed_tasks + stats.failed_tasks + stats.skipped_tasks;
        if finished > 0 {
            stats.success_rate = stats.completed_tasks as f64 / finished as f64;
        }

        stats
    }

    /// Ids that appear as unmet dependencies but were never registered
    pub fn missing_dependencies(&self) -> BTreeSet<TaskId> {
        self.tasks()
            .flat_map(|task| task.dependencies.iter())
            .filter(|dep| !self.contains(dep))
            .cloned()
            .collect()
    }

    fn touch(&mut self) {
        self.metadata.updated_at = Utc::now();
        self.metadata.version += 1;
    }
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}
