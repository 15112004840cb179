use crate::llm::RetryPolicy;
use crate::task::collaborators::Collaborators;
use crate::task::generators::GeneratorRegistry;
use crate::task::handlers::{HandlerRegistry, StepContext};
use crate::task::step::StepOutcome;
use crate::task::types::*;
use crate::task::worker::Worker;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Configuration for the task executor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Fail attempts whose deadline passes instead of only warning
    pub enforce_deadlines: bool,
    /// Attempts for llm steps that don't set `max_retries`
    pub default_llm_retries: u32,
    /// Base backoff for llm steps that don't set `retry_delay_ms`
    pub default_retry_delay_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            enforce_deadlines: false,
            default_llm_retries: 3,
            default_retry_delay_ms: 1000,
        }
    }
}

impl ExecutorConfig {
    pub fn llm_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.default_llm_retries,
            Duration::from_millis(self.default_retry_delay_ms),
        )
    }
}

/// Outcome of one attempt at a task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    pub task_id: TaskId,
    pub worker_id: WorkerId,
    /// Completed or Failed
    pub status: TaskStatus,
    /// Steps that succeeded
    pub steps_completed: usize,
    pub outputs: Vec<StepOutcome>,
    pub error: Option<TaskError>,
    pub duration_ms: u64,
    /// Definitions produced by step generators, for the manager to register
    pub generated_tasks: Vec<GeneratedTasks>,
}

/// Definitions one succeeded step's generator produced
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedTasks {
    pub step_index: usize,
    pub generator: String,
    pub tasks: Vec<TaskSpec>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Compact record stored in `Task::results`
    pub fn summary(&self) -> serde_json::Value {
        json!({
            "worker_id": self.worker_id,
            "steps_completed": self.steps_completed,
            "outputs": self.outputs,
            "duration_ms": self.duration_ms,
            "generated_tasks": self.generated_tasks.iter().map(|g| g.tasks.len()).sum::<usize>(),
        })
    }
}

#[derive(Debug, Default)]
struct StepsReport {
    outcomes: Vec<StepOutcome>,
    steps_completed: usize,
    first_error: Option<TaskError>,
    generated: Vec<GeneratedTasks>,
}

/// Runs a task's steps in order against one worker
#[derive(Debug)]
pub struct TaskExecutor {
    config: ExecutorConfig,
    handlers: HandlerRegistry,
    generators: GeneratorRegistry,
}

impl TaskExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        let handlers = HandlerRegistry::with_builtins(config.llm_retry_policy());
        Self {
            config,
            handlers,
            generators: GeneratorRegistry::new(),
        }
    }

    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn with_generators(mut self, generators: GeneratorRegistry) -> Self {
        self.generators = generators;
        self
    }

    pub fn handlers_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.handlers
    }

    pub fn generators_mut(&mut self) -> &mut GeneratorRegistry {
        &mut self.generators
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run one attempt. Marks the task InProgress; the caller records the final status.
    pub async fn execute_task(
        &self,
        task: &mut Task,
        worker: Arc<dyn Worker>,
        collaborators: &Collaborators,
    ) -> ExecutionResult {
        let started = Instant::now();
        task.start();
        info!(
            "Executing task {} ({}) on worker {}, attempt {}",
            task.id,
            task.name,
            worker.id(),
            task.metrics.attempts
        );

        let mut report = StepsReport::default();
        let deadline = task.deadline;

        match deadline {
            Some(deadline) if self.config.enforce_deadlines => {
                let remaining = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                let timed_out = remaining.is_zero()
                    || tokio::time::timeout(
                        remaining,
                        self.run_steps(task, &worker, collaborators, &mut report),
                    )
                    .await
                    .is_err();
                if timed_out {
                    warn!("Task {} exceeded its deadline {}", task.id, deadline);
                    report.first_error = Some(TaskError::DeadlineExceeded {
                        task_id: task.id.clone(),
                        deadline,
                    });
                }
            }
            Some(deadline) => {
                if deadline < Utc::now() {
                    warn!(
                        "Task {} is past its deadline {}; running anyway",
                        task.id, deadline
                    );
                }
                self.run_steps(task, &worker, collaborators, &mut report).await;
            }
            None => self.run_steps(task, &worker, collaborators, &mut report).await,
        }

        let status = if report.first_error.is_none() {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        debug!(
            "Task {} attempt finished: {:?}, {}/{} steps succeeded in {}ms",
            task.id,
            status,
            report.steps_completed,
            task.steps.len(),
            duration_ms
        );

        ExecutionResult {
            task_id: task.id.clone(),
            worker_id: worker.id().to_string(),
            status,
            steps_completed: report.steps_completed,
            outputs: report.outcomes,
            error: report.first_error,
            duration_ms,
            generated_tasks: report.generated,
        }
    }

    async fn run_steps(
        &self,
        task: &mut Task,
        worker: &Arc<dyn Worker>,
        collaborators: &Collaborators,
        report: &mut StepsReport,
    ) {
        let steps = task.steps.clone();

        for (index, step) in steps.iter().enumerate() {
            if let Some(condition) = &step.condition
                && !condition.evaluate(&report.outcomes)
            {
                debug!(
                    "Skipping step {} ({}) of task {}: condition not met",
                    index, step.step_type, task.id
                );
                report.outcomes.push(StepOutcome::skipped(index, step));
                task.advance_step(index + 1);
                continue;
            }

            let ctx = StepContext {
                task_id: task.id.clone(),
                task_name: task.name.clone(),
                step_index: index,
                worker: Arc::clone(worker),
                collaborators: collaborators.clone(),
                previous_outputs: report
                    .outcomes
                    .iter()
                    .filter_map(|o| o.output.clone())
                    .collect(),
            };

            let handler = self.handlers.resolve(&step.step_type);
            let step_started = Instant::now();
            let result = handler.handle(step, &ctx).await;
            let elapsed_ms = step_started.elapsed().as_millis() as u64;
            task.advance_step(index + 1);

            match result {
                Ok(output) => {
                    report.steps_completed += 1;
                    let outcome = StepOutcome::succeeded(index, step, output, elapsed_ms);

                    if let Some(name) = &step.generator {
                        match self.generators.generate(name, &outcome) {
                            Some(specs) => {
                                debug!(
                                    "Generator '{}' produced {} tasks from task {}",
                                    name,
                                    specs.len(),
                                    task.id
                                );
                                report.generated.push(GeneratedTasks {
                                    step_index: index,
                                    generator: name.clone(),
                                    tasks: specs,
                                });
                            }
                            None => warn!(
                                "Step {} of task {} references unknown generator '{}'",
                                index, task.id, name
                            ),
                        }
                    }

                    report.outcomes.push(outcome);
                }
                Err(error) => {
                    warn!(
                        "Step {} ({}) of task {} failed: {}",
                        index, step.step_type, task.id, error
                    );
                    report
                        .outcomes
                        .push(StepOutcome::failed(index, step, error.to_string(), elapsed_ms));
                    if report.first_error.is_none() {
                        report.first_error = Some(error);
                    }
                    if step.fail_fast {
                        debug!("Step {} is fail-fast; aborting task {}", index, task.id);
                        break;
                    }
                }
            }
        }
    }
}

impl Default for TaskExecutor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}
