use crate::task::step::Step;
use crate::task::types::{TaskId, WorkerId};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

static NO_RESOURCES: BTreeMap<String, f64> = BTreeMap::new();

/// Outcome reported by a worker for one step
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Success,
    Failure,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WorkerOutput {
    pub status: WorkerStatus,
    pub output: serde_json::Value,
    pub error: Option<String>,
}

impl WorkerOutput {
    pub fn success(output: serde_json::Value) -> Self {
        Self {
            status: WorkerStatus::Success,
            output,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: WorkerStatus::Failure,
            output: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == WorkerStatus::Success
    }
}

/// What a handler hands to the worker alongside the step
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StepInput {
    pub task_id: TaskId,
    pub task_name: String,
    pub step_index: usize,
    /// Handler-specific payload (query, data plus context, options...)
    pub payload: serde_json::Value,
    /// Outputs of the steps that already succeeded in this attempt
    pub previous_outputs: Vec<serde_json::Value>,
}

/// External executor of steps.
///
/// Workers are black boxes to the orchestrator: it only needs their identity,
/// advertised skills and resources, and a way to run one step.
#[async_trait::async_trait]
pub trait Worker: Send + Sync {
    fn id(&self) -> &str;

    fn skills(&self) -> &BTreeSet<String>;

    /// Externally reported busy flag, independent of scheduler load
    fn is_busy(&self) -> bool {
        false
    }

    fn resources(&self) -> &BTreeMap<String, f64> {
        &NO_RESOURCES
    }

    async fn execute_step(&self, step: &Step, input: &StepInput) -> Result<WorkerOutput>;
}

/// Workers available to a run, iterated in id order
#[derive(Clone, Default)]
pub struct WorkerPool {
    workers: BTreeMap<WorkerId, Arc<dyn Worker>>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_worker(mut self, worker: Arc<dyn Worker>) -> Self {
        self.add(worker);
        self
    }

    /// Insert a worker, replacing any previous one with the same id
    pub fn add(&mut self, worker: Arc<dyn Worker>) -> Option<Arc<dyn Worker>> {
        self.workers.insert(worker.id().to_string(), worker)
    }

    pub fn remove(&mut self, worker_id: &str) -> Option<Arc<dyn Worker>> {
        self.workers.remove(worker_id)
    }

    pub fn get(&self, worker_id: &str) -> Option<&Arc<dyn Worker>> {
        self.workers.get(worker_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Worker>> {
        self.workers.values()
    }

    pub fn ids(&self) -> Vec<WorkerId> {
        self.workers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.ids())
            .finish()
    }
}

type StepFn = dyn Fn(&Step, &StepInput) -> Result<WorkerOutput> + Send + Sync;

/// Worker backed by a synchronous closure, handy for local agents and tests
pub struct FnWorker {
    id: WorkerId,
    skills: BTreeSet<String>,
    resources: BTreeMap<String, f64>,
    busy: AtomicBool,
    run: Arc<StepFn>,
}

impl FnWorker {
    pub fn new<F>(id: impl Into<WorkerId>, run: F) -> Self
    where
        F: Fn(&Step, &StepInput) -> Result<WorkerOutput> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            skills: BTreeSet::new(),
            resources: BTreeMap::new(),
            busy: AtomicBool::new(false),
            run: Arc::new(run),
        }
    }

    /// Echoes the step payload back as a successful output
    pub fn echo(id: impl Into<WorkerId>) -> Self {
        Self::new(id, |step, input| {
            Ok(WorkerOutput::success(serde_json::json!({
                "step": step.step_type,
                "payload": input.payload,
            })))
        })
    }

    pub fn with_skill(mut self, skill: impl Into<String>) -> Self {
        self.skills.insert(skill.into());
        self
    }

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skills.extend(skills.into_iter().map(Into::into));
        self
    }

    pub fn with_resource(mut self, name: impl Into<String>, amount: f64) -> Self {
        self.resources.insert(name.into(), amount);
        self
    }

    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Worker for FnWorker {
    fn id(&self) -> &str {
        &self.id
    }

    fn skills(&self) -> &BTreeSet<String> {
        &self.skills
    }

    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn resources(&self) -> &BTreeMap<String, f64> {
        &self.resources
    }

    async fn execute_step(&self, step: &Step, input: &StepInput) -> Result<WorkerOutput> {
        (self.run)(step, input)
    }
}
