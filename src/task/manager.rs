use crate::config::OrchestratorConfig;
use crate::task::collaborators::Collaborators;
use crate::task::executor::{ExecutionResult, TaskExecutor};
use crate::task::graph::{GraphStatistics, TaskGraph};
use crate::task::queue::{QueueStats, TaskQueue};
use crate::task::scheduler::{Assignment, TaskScheduler};
use crate::task::types::*;
use crate::task::worker::WorkerPool;
use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Top-level coordinator: owns the graph, queue, scheduler and executor and
/// drives tasks from registration to a terminal state.
pub struct TaskManager {
    state: Arc<Mutex<Coordinator>>,
    executor: Arc<TaskExecutor>,
    collaborators: Collaborators,
    config: TaskManagerConfig,
    event_handlers: Vec<Box<dyn TaskEventHandler + Send + Sync>>,
}

/// Configuration for task manager
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TaskManagerConfig {
    /// Tasks dispatched per tick by [`TaskManager::execute`]
    pub max_parallel: usize,
    /// Attempts a `retry` task gets before its dependents are skipped
    pub max_attempts: u32,
    /// Report finished tasks to the memory and knowledge-graph collaborators
    pub notify_collaborators: bool,
    /// Keep one [`ExecutionRecord`] per attempt
    pub record_history: bool,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            max_attempts: 3,
            notify_collaborators: true,
            record_history: true,
        }
    }
}

/// Aggregate counters over every run of this manager
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RunMetrics {
    /// Successful attempts
    pub tasks_completed: u32,
    /// Failed attempts, including ones later retried
    pub tasks_failed: u32,
    pub success_rate: f64,
    pub avg_completion_time_seconds: f64,
    /// Most tasks executed concurrently in one tick
    pub max_parallel_observed: usize,
}

/// Final state of a run
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RunReport {
    pub completed: Vec<TaskId>,
    pub failed: Vec<TaskId>,
    pub skipped: Vec<TaskId>,
    pub blocked: Vec<TaskId>,
    /// Error or skip reason for every task that did not complete
    pub errors: BTreeMap<TaskId, String>,
    pub metrics: RunMetrics,
}

impl RunReport {
    /// Every registered task completed
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty() && self.blocked.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| anyhow!("Serialization error: {}", e))
    }
}

/// One attempt at one task
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ExecutionRecord {
    pub task_id: TaskId,
    pub worker_id: WorkerId,
    pub attempt: u32,
    pub status: TaskStatus,
    pub steps_completed: usize,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Events that can occur during task management
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    TaskRegistered {
        task_id: TaskId,
        name: String,
    },
    TaskAssigned {
        task_id: TaskId,
        worker_id: WorkerId,
        score: f64,
        reason: String,
    },
    TaskCompleted {
        task_id: TaskId,
        worker_id: WorkerId,
        duration_ms: u64,
    },
    TaskFailed {
        task_id: TaskId,
        attempt: u32,
        error: String,
    },
    TaskRetryScheduled {
        task_id: TaskId,
        next_attempt: u32,
    },
    TaskSkipped {
        task_id: TaskId,
        reason: String,
    },
    AlternateRegistered {
        failed_id: TaskId,
        alternate_id: TaskId,
    },
    TasksGenerated {
        parent_id: TaskId,
        task_ids: Vec<TaskId>,
    },
    TaskBlocked {
        task_id: TaskId,
        unmet: Vec<TaskId>,
    },
    RunFinished {
        completed: usize,
        failed: usize,
        skipped: usize,
        blocked: usize,
    },
}

/// Handler for task events
pub trait TaskEventHandler {
    fn handle_event(&self, event: &TaskEvent) -> Result<()>;
}

/// Event handler that logs task events
pub struct LoggingEventHandler;

impl TaskEventHandler for LoggingEventHandler {
    fn handle_event(&self, event: &TaskEvent) -> Result<()> {
        match event {
            TaskEvent::TaskRegistered { task_id, name } => {
                info!("Task registered: {} ({})", task_id, name);
            }
            TaskEvent::TaskAssigned {
                task_id,
                worker_id,
                score,
                reason,
            } => {
                debug!(
                    "Task {} assigned to {} (score {:.2}: {})",
                    task_id, worker_id, score, reason
                );
            }
            TaskEvent::TaskCompleted {
                task_id,
                worker_id,
                duration_ms,
            } => {
                info!(
                    "Task completed: {} by {} in {}ms",
                    task_id, worker_id, duration_ms
                );
            }
            TaskEvent::TaskFailed {
                task_id,
                attempt,
                error,
            } => {
                warn!("Task failed: {} (attempt {}) - {}", task_id, attempt, error);
            }
            TaskEvent::TaskRetryScheduled {
                task_id,
                next_attempt,
            } => {
                info!("Task {} re-queued for attempt {}", task_id, next_attempt);
            }
            TaskEvent::TaskSkipped { task_id, reason } => {
                info!("Task skipped: {} - {}", task_id, reason);
            }
            TaskEvent::AlternateRegistered {
                failed_id,
                alternate_id,
            } => {
                info!("Alternate {} registered for {}", alternate_id, failed_id);
            }
            TaskEvent::TasksGenerated { parent_id, task_ids } => {
                info!(
                    "Task {} generated {} follow-up tasks",
                    parent_id,
                    task_ids.len()
                );
            }
            TaskEvent::TaskBlocked { task_id, unmet } => {
                warn!("Task blocked: {} waiting on {:?}", task_id, unmet);
            }
            TaskEvent::RunFinished {
                completed,
                failed,
                skipped,
                blocked,
            } => {
                info!(
                    "Run finished: {} completed, {} failed, {} skipped, {} blocked",
                    completed, failed, skipped, blocked
                );
            }
        }
        Ok(())
    }
}

/// A task that reached Completed or Failed in the last tick
struct Finished {
    task: Task,
    success: bool,
}

/// State shared under the coordination lock
struct Coordinator {
    graph: TaskGraph,
    queue: TaskQueue,
    scheduler: TaskScheduler,
    metrics: RunMetrics,
    total_completion_seconds: f64,
    history: Vec<ExecutionRecord>,
    /// (task, step index) pairs whose generator output was already accepted
    fired_generators: HashSet<(TaskId, usize)>,
}

impl Coordinator {
    fn new(scheduler: TaskScheduler) -> Self {
        Self {
            graph: TaskGraph::new(),
            queue: TaskQueue::new(),
            scheduler,
            metrics: RunMetrics::default(),
            total_completion_seconds: 0.0,
            history: Vec::new(),
            fired_generators: HashSet::new(),
        }
    }

    fn register(&mut self, task: Task) -> Result<TaskId, TaskError> {
        let task_id = self.graph.add_task(task)?;
        let stored = self.graph.get_task(&task_id)?;
        self.queue.add(stored);
        Ok(task_id)
    }

    /// Up to `limit` ready tasks: queue order first, graph as the authority
    fn select_batch(&mut self, limit: usize) -> Vec<TaskId> {
        let mut batch = Vec::new();
        let mut chosen = HashSet::new();

        while batch.len() < limit {
            let Some(task_id) = self.queue.next() else {
                break;
            };
            if self.graph.is_ready(&task_id) && chosen.insert(task_id.clone()) {
                batch.push(task_id);
            } else {
                debug!("Dropping stale queue entry {}", task_id);
            }
        }

        if batch.len() < limit {
            for task_id in self.graph.ready_tasks(None) {
                if batch.len() >= limit {
                    break;
                }
                if chosen.insert(task_id.clone()) {
                    warn!("Task {} is ready but was not queued; dispatching from graph", task_id);
                    self.queue.remove(&task_id);
                    batch.push(task_id);
                }
            }
        }

        batch
    }

    fn record_completion(&mut self, seconds: f64) {
        self.metrics.tasks_completed += 1;
        self.total_completion_seconds += seconds;
        self.metrics.avg_completion_time_seconds =
            self.total_completion_seconds / self.metrics.tasks_completed as f64;
        self.refresh_success_rate();
    }

    fn record_failure(&mut self) {
        self.metrics.tasks_failed += 1;
        self.refresh_success_rate();
    }

    fn refresh_success_rate(&mut self) {
        let total = self.metrics.tasks_completed + self.metrics.tasks_failed;
        if total > 0 {
            self.metrics.success_rate = self.metrics.tasks_completed as f64 / total as f64;
        }
    }

    /// Fold one attempt's result back into shared state
    fn apply_result(
        &mut self,
        mut task: Task,
        result: ExecutionResult,
        config: &TaskManagerConfig,
        events: &mut Vec<TaskEvent>,
    ) -> Option<Finished> {
        let task_id = task.id.clone();
        let success = result.is_success();
        self.scheduler
            .complete_task(&result.worker_id, &task_id, success);

        let error = result.error.as_ref().map(ToString::to_string);
        if success {
            task.complete(result.summary());
        } else {
            task.fail(error.clone().unwrap_or_else(|| "task failed".to_string()));
        }

        if config.record_history {
            self.history.push(ExecutionRecord {
                task_id: task_id.clone(),
                worker_id: result.worker_id.clone(),
                attempt: task.metrics.attempts,
                status: task.status,
                steps_completed: result.steps_completed,
                duration_ms: result.duration_ms,
                error: error.clone(),
                recorded_at: Utc::now(),
            });
        }

        let snapshot = task.clone();
        if let Err(e) = self.graph.update_task(task) {
            warn!("Finished task {} vanished from the graph: {}", task_id, e);
            return None;
        }

        if success {
            let unblocked = self.graph.complete_task(&task_id);
            self.queue.complete_task(&task_id);
            self.queue.remove(&task_id);
            self.record_completion(result.duration_ms as f64 / 1000.0);
            if !unblocked.is_empty() {
                debug!("Task {} unblocked {:?}", task_id, unblocked);
            }
            events.push(TaskEvent::TaskCompleted {
                task_id,
                worker_id: result.worker_id,
                duration_ms: result.duration_ms,
            });
        } else {
            self.record_failure();
            events.push(TaskEvent::TaskFailed {
                task_id: task_id.clone(),
                attempt: snapshot.metrics.attempts,
                error: error.unwrap_or_default(),
            });
            self.apply_failure_strategy(&task_id, config.max_attempts.max(1), events);
        }

        Some(Finished {
            task: snapshot,
            success,
        })
    }

    fn apply_failure_strategy(&mut self, task_id: &str, max_attempts: u32, events: &mut Vec<TaskEvent>) {
        let Ok(task) = self.graph.get_task(task_id) else {
            return;
        };
        let attempts = task.metrics.attempts;
        let strategy = task.failure_strategy;
        let alternate = task.alternate_task.clone();

        match strategy {
            FailureStrategy::Retry if attempts < max_attempts => {
                if let Ok(task) = self.graph.get_task_mut(task_id) {
                    task.reset();
                    let queued = task.clone();
                    self.queue.add(&queued);
                }
                events.push(TaskEvent::TaskRetryScheduled {
                    task_id: task_id.to_string(),
                    next_attempt: attempts + 1,
                });
            }
            FailureStrategy::Retry => {
                warn!(
                    "Task {} failed {} times; giving up on retries",
                    task_id, attempts
                );
                self.skip_descendants(task_id, "retry limit reached", events);
            }
            FailureStrategy::SkipDependent => {
                self.skip_descendants(task_id, "dependency failed", events);
            }
            FailureStrategy::Alternate => {
                let substituted = alternate
                    .ok_or_else(|| "no alternate task defined".to_string())
                    .and_then(|spec| Task::from_spec(*spec).map_err(|e| e.to_string()))
                    .and_then(|alt| {
                        self.graph
                            .substitute(task_id, alt)
                            .map_err(|e| e.to_string())
                    });

                match substituted {
                    Ok(alternate_id) => {
                        if let Ok(alt) = self.graph.get_task(&alternate_id) {
                            self.queue.add(alt);
                        }
                        self.queue.replace_dependency(task_id, &alternate_id);
                        events.push(TaskEvent::AlternateRegistered {
                            failed_id: task_id.to_string(),
                            alternate_id,
                        });
                    }
                    Err(reason) => {
                        warn!(
                            "Alternate for task {} unavailable ({}); skipping dependents",
                            task_id, reason
                        );
                        self.skip_descendants(task_id, "dependency failed", events);
                    }
                }
            }
        }
    }

    fn skip_descendants(&mut self, task_id: &str, why: &str, events: &mut Vec<TaskEvent>) {
        let reason = format!("{}: {}", why, task_id);
        for descendant in self.graph.descendants(task_id) {
            if let Ok(task) = self.graph.get_task_mut(&descendant)
                && task.status.is_open()
            {
                task.skip(reason.clone());
                self.queue.remove(&descendant);
                events.push(TaskEvent::TaskSkipped {
                    task_id: descendant,
                    reason: reason.clone(),
                });
            }
        }
    }

    /// Mark everything still Pending as Blocked
    fn block_remaining(&mut self, events: &mut Vec<TaskEvent>) {
        let missing = self.graph.missing_dependencies();
        if !missing.is_empty() {
            warn!("Dependencies never registered: {:?}", missing);
        }

        for task_id in self.graph.tasks_by_status(TaskStatus::Pending) {
            if let Ok(task) = self.graph.get_task_mut(&task_id) {
                task.block();
                events.push(TaskEvent::TaskBlocked {
                    task_id,
                    unmet: task.dependencies.iter().cloned().collect(),
                });
            }
        }
    }

    fn report(&self) -> RunReport {
        let mut report = RunReport {
            metrics: self.metrics.clone(),
            ..Default::default()
        };

        for task in self.graph.tasks() {
            let bucket = match task.status {
                TaskStatus::Completed => &mut report.completed,
                TaskStatus::Failed => &mut report.failed,
                TaskStatus::Skipped => &mut report.skipped,
                TaskStatus::Blocked => &mut report.blocked,
                TaskStatus::Pending | TaskStatus::InProgress => continue,
            };
            bucket.push(task.id.clone());

            if task.status != TaskStatus::Completed
                && let Some(error) = &task.error
            {
                report.errors.insert(task.id.clone(), error.clone());
            }
        }

        report
    }
}

impl TaskManager {
    /// Create a new task manager with default scheduler and executor
    pub fn new(config: TaskManagerConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(Coordinator::new(TaskScheduler::default()))),
            executor: Arc::new(TaskExecutor::default()),
            collaborators: Collaborators::in_memory(),
            config,
            event_handlers: Vec::new(),
        }
    }

    /// Build every component from one configuration
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(config.manager.clone())
            .with_scheduler(TaskScheduler::new(config.scheduler.clone()))
            .with_executor(TaskExecutor::new(config.executor.clone()))
    }

    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    pub fn with_executor(mut self, executor: TaskExecutor) -> Self {
        self.executor = Arc::new(executor);
        self
    }

    /// Replace the scheduler. Only takes effect while the manager is unshared.
    pub fn with_scheduler(mut self, scheduler: TaskScheduler) -> Self {
        match Arc::get_mut(&mut self.state) {
            Some(state) => state.get_mut().scheduler = scheduler,
            None => warn!("Scheduler can only be replaced before the manager is shared"),
        }
        self
    }

    pub fn add_event_handler(&mut self, handler: Box<dyn TaskEventHandler + Send + Sync>) {
        self.event_handlers.push(handler);
    }

    pub fn config(&self) -> &TaskManagerConfig {
        &self.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Validate a definition and register it in the graph and queue
    pub async fn add_task(&self, spec: TaskSpec) -> Result<TaskId, TaskError> {
        let task = Task::from_spec(spec)?;
        self.register(task).await
    }

    /// Register definitions in order, stopping at the first rejected one.
    /// Tasks registered before the failure stay registered.
    pub async fn add_tasks(&self, specs: Vec<TaskSpec>) -> Result<Vec<TaskId>, TaskError> {
        let mut ids = Vec::with_capacity(specs.len());
        for spec in specs {
            ids.push(self.add_task(spec).await?);
        }
        Ok(ids)
    }

    /// Register an already-built task
    pub async fn register(&self, task: Task) -> Result<TaskId, TaskError> {
        let name = task.name.clone();
        let task_id = self.state.lock().await.register(task)?;

        debug!("Registered task {} ({})", task_id, name);
        self.emit_event(&TaskEvent::TaskRegistered {
            task_id: task_id.clone(),
            name,
        });
        Ok(task_id)
    }

    /// Run with the configured parallelism
    pub async fn execute(&self, pool: &WorkerPool) -> RunReport {
        self.run(pool, self.config.max_parallel).await
    }

    /// Drive ready tasks to completion in bulk-synchronous ticks until nothing
    /// is ready, then report. Tasks still waiting on dependencies end Blocked.
    pub async fn run(&self, pool: &WorkerPool, max_parallel: usize) -> RunReport {
        let max_parallel = max_parallel.max(1);
        let reopened = self.state.lock().await.graph.reopen_blocked();
        if reopened > 0 {
            debug!("Reconsidering {} previously blocked tasks", reopened);
        }

        info!(
            "Starting run with {} workers, up to {} tasks per tick",
            pool.len(),
            max_parallel
        );

        let mut tick = 0u64;
        loop {
            let mut events = Vec::new();
            let (dispatch, batch_size) = {
                let mut state = self.state.lock().await;
                let batch = state.select_batch(max_parallel);
                let batch_size = batch.len();
                let mut dispatch: Vec<(Task, Assignment)> = Vec::new();

                for task_id in batch {
                    let Ok(task) = state.graph.get_task(&task_id).cloned() else {
                        continue;
                    };

                    match state.scheduler.assign_worker(&task, pool) {
                        Some(assignment) => {
                            if let Ok(stored) = state.graph.get_task_mut(&task_id) {
                                stored.status = TaskStatus::InProgress;
                                stored.assigned_workers.push(assignment.worker_id.clone());
                                events.push(TaskEvent::TaskAssigned {
                                    task_id: task_id.clone(),
                                    worker_id: assignment.worker_id.clone(),
                                    score: assignment.score.total,
                                    reason: assignment.selection_reason.clone(),
                                });
                                dispatch.push((stored.clone(), assignment));
                            }
                        }
                        None if state.scheduler.capacity_exhausted(&task, pool) => {
                            debug!(
                                "Capable workers for task {} are full this tick; deferring",
                                task_id
                            );
                            state.queue.add(&task);
                        }
                        None => {
                            let reason = TaskError::NoEligibleWorker {
                                task_id: task_id.clone(),
                                required: task.required_skills.iter().cloned().collect(),
                            }
                            .to_string();
                            warn!("{}", reason);
                            if let Ok(stored) = state.graph.get_task_mut(&task_id) {
                                stored.skip(reason.clone());
                            }
                            events.push(TaskEvent::TaskSkipped {
                                task_id: task_id.clone(),
                                reason,
                            });
                            state.skip_descendants(&task_id, "dependency skipped", &mut events);
                        }
                    }
                }

                if dispatch.len() > state.metrics.max_parallel_observed {
                    state.metrics.max_parallel_observed = dispatch.len();
                }
                (dispatch, batch_size)
            };

            if batch_size == 0 {
                break;
            }
            self.emit_events(&events);
            if dispatch.is_empty() {
                continue;
            }

            tick += 1;
            debug!("Tick {}: dispatching {} tasks", tick, dispatch.len());

            let runs = dispatch.into_iter().map(|(mut task, assignment)| {
                let executor = Arc::clone(&self.executor);
                let collaborators = self.collaborators.clone();
                async move {
                    let result = executor
                        .execute_task(&mut task, Arc::clone(&assignment.worker), &collaborators)
                        .await;
                    (task, result)
                }
            });
            let results = join_all(runs).await;

            let mut events = Vec::new();
            let mut finished = Vec::new();
            let mut generated = Vec::new();
            {
                let mut state = self.state.lock().await;
                for (task, mut result) in results {
                    for batch in std::mem::take(&mut result.generated_tasks) {
                        if !state.fired_generators.insert((task.id.clone(), batch.step_index)) {
                            debug!(
                                "Generator '{}' of task {} step {} already fired; ignoring repeat",
                                batch.generator, task.id, batch.step_index
                            );
                            continue;
                        }
                        if !batch.tasks.is_empty() {
                            generated.push((task.id.clone(), batch.tasks));
                        }
                    }
                    if let Some(done) = state.apply_result(task, result, &self.config, &mut events) {
                        finished.push(done);
                    }
                }
            }

            self.emit_events(&events);
            if self.config.notify_collaborators {
                for done in &finished {
                    self.notify_collaborators(done).await;
                }
            }
            for (parent_id, specs) in generated {
                self.register_generated(&parent_id, specs).await;
            }
        }

        let mut events = Vec::new();
        let report = {
            let mut state = self.state.lock().await;
            state.block_remaining(&mut events);
            state.report()
        };
        events.push(TaskEvent::RunFinished {
            completed: report.completed.len(),
            failed: report.failed.len(),
            skipped: report.skipped.len(),
            blocked: report.blocked.len(),
        });
        self.emit_events(&events);

        info!(
            "Run finished after {} ticks: {} completed, {} failed, {} skipped, {} blocked",
            tick,
            report.completed.len(),
            report.failed.len(),
            report.skipped.len(),
            report.blocked.len()
        );
        report
    }

    async fn register_generated(&self, parent_id: &str, specs: Vec<TaskSpec>) {
        let mut task_ids = Vec::new();
        for spec in specs {
            let name = spec.name.clone();
            match self.add_task(spec).await {
                Ok(task_id) => task_ids.push(task_id),
                Err(e) => warn!(
                    "Dropping task '{}' generated by {}: {}",
                    name, parent_id, e
                ),
            }
        }
        if !task_ids.is_empty() {
            self.emit_event(&TaskEvent::TasksGenerated {
                parent_id: parent_id.to_string(),
                task_ids,
            });
        }
    }

    async fn notify_collaborators(&self, done: &Finished) {
        let task = &done.task;
        let status = if done.success { "completed" } else { "failed" };

        let node = json!({
            "type": "task",
            "name": task.name,
            "task_type": task.task_type,
            "status": status,
            "attempts": task.metrics.attempts,
            "metadata": task.metadata,
        });
        if let Err(e) = self.collaborators.knowledge.add_node(&task.id, node).await {
            warn!("Failed to record task {} in knowledge graph: {}", task.id, e);
        }

        let record = if done.success {
            json!({
                "type": "task_completion",
                "task_id": task.id,
                "name": task.name,
                "result": task.results.last(),
                "timestamp": Utc::now().to_rfc3339(),
            })
        } else {
            json!({
                "type": "task_failure",
                "task_id": task.id,
                "name": task.name,
                "error": task.error,
                "timestamp": Utc::now().to_rfc3339(),
            })
        };
        if let Err(e) = self.collaborators.memory.add_memory(record).await {
            warn!("Failed to record task {} in memory: {}", task.id, e);
        }
    }

    fn emit_events(&self, events: &[TaskEvent]) {
        for event in events {
            self.emit_event(event);
        }
    }

    fn emit_event(&self, event: &TaskEvent) {
        for handler in &self.event_handlers {
            if let Err(e) = handler.handle_event(event) {
                error!("Event handler error: {}", e);
            }
        }
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Task, TaskError> {
        self.state.lock().await.graph.get_task(task_id).cloned()
    }

    pub async fn ready_tasks(&self, limit: Option<usize>) -> Vec<TaskId> {
        self.state.lock().await.graph.ready_tasks(limit)
    }

    pub async fn tasks_by_status(&self, status: TaskStatus) -> Vec<TaskId> {
        self.state.lock().await.graph.tasks_by_status(status)
    }

    pub async fn critical_path(&self) -> Vec<TaskId> {
        self.state.lock().await.graph.critical_path()
    }

    pub async fn ancestors(&self, task_id: &str) -> BTreeSet<TaskId> {
        self.state.lock().await.graph.ancestors(task_id)
    }

    pub async fn descendants(&self, task_id: &str) -> BTreeSet<TaskId> {
        self.state.lock().await.graph.descendants(task_id)
    }

    pub async fn statistics(&self) -> GraphStatistics {
        self.state.lock().await.graph.statistics()
    }

    pub async fn metrics(&self) -> RunMetrics {
        self.state.lock().await.metrics.clone()
    }

    pub async fn queue_stats(&self) -> QueueStats {
        self.state.lock().await.queue.stats()
    }

    pub async fn execution_history(&self) -> Vec<ExecutionRecord> {
        self.state.lock().await.history.clone()
    }

    /// Rolling success rate the scheduler holds for a worker
    pub async fn worker_performance(&self, worker_id: &str) -> f64 {
        self.state.lock().await.scheduler.performance(worker_id)
    }

    /// All tasks with their runtime state, in registration order
    pub async fn export_to_json(&self) -> Result<String> {
        let state = self.state.lock().await;
        let tasks: Vec<&Task> = state.graph.tasks().collect();
        serde_json::to_string_pretty(&tasks).map_err(|e| anyhow!("Serialization error: {}", e))
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new(TaskManagerConfig::default())
    }
}
