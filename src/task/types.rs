use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use super::step::Step;

/// Unique identifier for tasks
pub type TaskId = String;

/// Unique identifier for workers
pub type WorkerId = String;

/// Core task structure: the declarative definition plus runtime state
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub description: String,
    pub task_type: TaskType,
    pub steps: Vec<Step>,
    pub required_skills: BTreeSet<String>,
    pub priority: i64,
    /// Unmet prerequisites. Only shrinks as dependencies complete.
    pub dependencies: BTreeSet<TaskId>,
    pub deadline: Option<DateTime<Utc>>,
    pub resources: BTreeMap<String, f64>,
    pub failure_strategy: FailureStrategy,
    pub alternate_task: Option<Box<TaskSpec>>,
    pub metadata: BTreeMap<String, serde_json::Value>,

    pub status: TaskStatus,
    pub current_step: usize,
    pub assigned_workers: Vec<WorkerId>,
    pub created_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// One entry per completed attempt
    pub results: Vec<serde_json::Value>,
    pub error: Option<String>,
    pub metrics: TaskMetrics,
}

/// Classification of the work a task performs
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Research,
    Analysis,
    Design,
    Implementation,
    Testing,
    Review,
    Decision,
    #[default]
    Custom,
}

/// Task lifecycle state
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for dependencies or a free worker
    #[default]
    Pending,
    /// An attempt is in flight
    InProgress,
    /// Finished successfully
    Completed,
    /// Last attempt failed; may be reset when the strategy is `retry`
    Failed,
    /// Dependencies were still unmet when the run ended
    Blocked,
    /// Will never run
    Skipped,
}

impl TaskStatus {
    /// Completed, Failed or Skipped
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }

    /// States a failure cascade may still move to Skipped
    pub fn is_open(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Blocked)
    }
}

/// What happens to a task and its dependents after a failed attempt
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailureStrategy {
    /// Reset to Pending and run again, up to the manager's attempt cap
    Retry,
    /// Skip every transitive dependent
    #[default]
    SkipDependent,
    /// Register `alternate_task` and move the dependents onto it
    Alternate,
}

/// Running per-task counters
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct TaskMetrics {
    pub attempts: u32,
    /// Mean of attempt outcomes (1.0 success, 0.0 failure)
    pub success_rate: f64,
    /// Seconds spent in the last finished attempt
    pub completion_time: Option<f64>,
}

/// Orchestration errors
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, thiserror::Error)]
pub enum TaskError {
    #[error("Adding task {task_id} would create a dependency cycle through {via}")]
    CycleDetected { task_id: TaskId, via: TaskId },

    #[error("No eligible worker for task {task_id} (required skills: {required:?})")]
    NoEligibleWorker {
        task_id: TaskId,
        required: Vec<String>,
    },

    #[error("Step {step_index} ({step_type}) is invalid: {message}")]
    StepValidation {
        step_index: usize,
        step_type: String,
        message: String,
    },

    #[error("Provider call failed after {attempts} attempts: {message}")]
    TransientProvider { attempts: u32, message: String },

    #[error("Step {step_index} ({step_type}) failed: {message}")]
    StepExecution {
        step_index: usize,
        step_type: String,
        message: String,
    },

    #[error("Task {task_id} exceeded its deadline {deadline}")]
    DeadlineExceeded {
        task_id: TaskId,
        deadline: DateTime<Utc>,
    },

    #[error("Invalid task definition: {0}")]
    InvalidTaskDefinition(String),

    #[error("Task {0} not found")]
    TaskNotFound(TaskId),
}

/// Declarative task definition, as accepted from callers, JSON or YAML
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct TaskSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<TaskId>,
    pub name: String,
    pub description: String,
    #[serde(alias = "type")]
    pub task_type: TaskType,
    pub steps: Vec<Step>,
    pub required_skills: BTreeSet<String>,
    pub priority: i64,
    pub dependencies: BTreeSet<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    pub resources: BTreeMap<String, f64>,
    pub failure_strategy: FailureStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternate_task: Option<Box<TaskSpec>>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl TaskSpec {
    /// Create a definition with a name and type; everything else defaults
    pub fn new(name: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            name: name.into(),
            task_type,
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependency(mut self, id: impl Into<TaskId>) -> Self {
        self.dependencies.insert(id.into());
        self
    }

    pub fn with_skill(mut self, skill: impl Into<String>) -> Self {
        self.required_skills.insert(skill.into());
        self
    }

    pub fn with_resource(mut self, name: impl Into<String>, amount: f64) -> Self {
        self.resources.insert(name.into(), amount);
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_failure_strategy(mut self, strategy: FailureStrategy) -> Self {
        self.failure_strategy = strategy;
        self
    }

    /// Set the replacement registered when this task fails under `alternate`
    pub fn with_alternate(mut self, alternate: TaskSpec) -> Self {
        self.failure_strategy = FailureStrategy::Alternate;
        self.alternate_task = Some(Box::new(alternate));
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Reject definitions that can never be scheduled or executed
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.name.trim().is_empty() {
            return Err(TaskError::InvalidTaskDefinition(
                "task name must not be empty".to_string(),
            ));
        }

        if let Some(id) = &self.id {
            if id.trim().is_empty() {
                return Err(TaskError::InvalidTaskDefinition(format!(
                    "task '{}' has an empty id",
                    self.name
                )));
            }
            if self.dependencies.contains(id) {
                return Err(TaskError::CycleDetected {
                    task_id: id.clone(),
                    via: id.clone(),
                });
            }
        }

        for (index, step) in self.steps.iter().enumerate() {
            if step.step_type.trim().is_empty() {
                return Err(TaskError::InvalidTaskDefinition(format!(
                    "step {} of task '{}' has no type",
                    index, self.name
                )));
            }
            if let Some(secs) = step.retry_delay
                && (!secs.is_finite() || secs < 0.0)
            {
                return Err(TaskError::InvalidTaskDefinition(format!(
                    "step {} of task '{}' has invalid retry_delay {}",
                    index, self.name, secs
                )));
            }
        }

        if let Some((name, amount)) = self.resources.iter().find(|(_, v)| !v.is_finite() || **v < 0.0)
        {
            return Err(TaskError::InvalidTaskDefinition(format!(
                "resource '{}' of task '{}' has invalid amount {}",
                name, self.name, amount
            )));
        }

        if let Some(alternate) = &self.alternate_task {
            alternate.validate()?;
        }

        Ok(())
    }

    /// Parse a single definition from JSON
    pub fn from_json(content: &str) -> Result<Self, TaskError> {
        let spec: TaskSpec = serde_json::from_str(content)
            .map_err(|e| TaskError::InvalidTaskDefinition(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse a single definition from YAML
    pub fn from_yaml(content: &str) -> Result<Self, TaskError> {
        let spec: TaskSpec = serde_yaml::from_str(content)
            .map_err(|e| TaskError::InvalidTaskDefinition(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn to_json(&self) -> Result<String, TaskError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| TaskError::InvalidTaskDefinition(e.to_string()))
    }
}

impl Task {
    /// Build a Pending task from a validated definition, generating an id when absent
    pub fn from_spec(spec: TaskSpec) -> Result<Self, TaskError> {
        spec.validate()?;

        Ok(Self {
            id: spec.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: spec.name,
            description: spec.description,
            task_type: spec.task_type,
            steps: spec.steps,
            required_skills: spec.required_skills,
            priority: spec.priority,
            dependencies: spec.dependencies,
            deadline: spec.deadline,
            resources: spec.resources,
            failure_strategy: spec.failure_strategy,
            alternate_task: spec.alternate_task,
            metadata: spec.metadata,
            status: TaskStatus::Pending,
            current_step: 0,
            assigned_workers: Vec::new(),
            created_at: Utc::now(),
            start_time: None,
            end_time: None,
            results: Vec::new(),
            error: None,
            metrics: TaskMetrics::default(),
        })
    }

    /// Begin an attempt. Counts the attempt exactly once.
    pub fn start(&mut self) {
        self.status = TaskStatus::InProgress;
        self.start_time = Some(Utc::now());
        self.end_time = None;
        self.metrics.attempts += 1;
    }

    pub fn complete(&mut self, result: serde_json::Value) {
        self.status = TaskStatus::Completed;
        self.end_time = Some(Utc::now());
        self.results.push(result);
        self.error = None;
        self.record_outcome(true);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.end_time = Some(Utc::now());
        self.error = Some(error.into());
        self.record_outcome(false);
    }

    /// Terminal. The reason is kept as the task error so reports can show it.
    pub fn skip(&mut self, reason: impl Into<String>) {
        self.status = TaskStatus::Skipped;
        self.end_time = Some(Utc::now());
        self.error = Some(reason.into());
    }

    pub fn block(&mut self) {
        self.status = TaskStatus::Blocked;
        if self.error.is_none() {
            let unmet: Vec<&str> = self.dependencies.iter().map(String::as_str).collect();
            self.error = Some(format!("Unmet dependencies: {}", unmet.join(", ")));
        }
    }

    /// Back to Pending for another attempt. Keeps metrics, results and the last error.
    pub fn reset(&mut self) {
        self.status = TaskStatus::Pending;
        self.current_step = 0;
        self.start_time = None;
        self.end_time = None;
    }

    /// Pending with no unmet dependencies
    pub fn is_ready(&self) -> bool {
        self.status == TaskStatus::Pending && self.dependencies.is_empty()
    }

    /// Returns true if `id` was still an unmet dependency
    pub fn remove_dependency(&mut self, id: &str) -> bool {
        self.dependencies.remove(id)
    }

    /// Advance the step cursor; never moves backwards within an attempt
    pub fn advance_step(&mut self, next: usize) {
        if next > self.current_step {
            self.current_step = next;
        }
    }

    /// Wall-clock time of the current or last attempt
    pub fn duration(&self) -> Option<Duration> {
        let start = self.start_time?;
        Some(self.end_time.unwrap_or_else(Utc::now) - start)
    }

    fn record_outcome(&mut self, success: bool) {
        let attempts = self.metrics.attempts.max(1) as f64;
        let outcome = if success { 1.0 } else { 0.0 };
        self.metrics.success_rate += (outcome - self.metrics.success_rate) / attempts;
        self.metrics.completion_time = self
            .duration()
            .map(|d| d.num_milliseconds() as f64 / 1000.0);
    }
}

impl TryFrom<TaskSpec> for Task {
    type Error = TaskError;

    fn try_from(spec: TaskSpec) -> Result<Self, Self::Error> {
        Task::from_spec(spec)
    }
}
