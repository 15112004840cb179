#![allow(dead_code)]

use anyhow::Result;
use futures::future::BoxFuture;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use taskweave::llm::{GenerationRequest, GenerationResponse, LLMError, LLMProvider, TokenUsage};
use taskweave::task::{Step, StepInput, TaskEvent, TaskEventHandler, TaskId, Worker, WorkerOutput};

pub fn init_tracing() {
    taskweave::logging::init_logging_with_filter("taskweave=debug");
}

/// Worker that fails a task a configured number of times before succeeding,
/// and records which tasks it started, in order.
pub struct ScriptedWorker {
    id: String,
    skills: BTreeSet<String>,
    failures: Mutex<HashMap<TaskId, u32>>,
    log: Arc<Mutex<Vec<TaskId>>>,
}

impl ScriptedWorker {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            skills: BTreeSet::new(),
            failures: Mutex::new(HashMap::new()),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_skill(mut self, skill: &str) -> Self {
        self.skills.insert(skill.to_string());
        self
    }

    /// Fail the first `times` attempts at `task_id`; `u32::MAX` fails forever
    pub fn failing(self, task_id: &str, times: u32) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(task_id.to_string(), times);
        self
    }

    pub fn sharing_log(mut self, log: Arc<Mutex<Vec<TaskId>>>) -> Self {
        self.log = log;
        self
    }

    pub fn log(&self) -> Vec<TaskId> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Worker for ScriptedWorker {
    fn id(&self) -> &str {
        &self.id
    }

    fn skills(&self) -> &BTreeSet<String> {
        &self.skills
    }

    async fn execute_step(&self, step: &Step, input: &StepInput) -> Result<WorkerOutput> {
        if input.step_index == 0 {
            self.log.lock().unwrap().push(input.task_id.clone());
        }

        let mut failures = self.failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(&input.task_id)
            && *remaining > 0
        {
            if *remaining != u32::MAX {
                *remaining -= 1;
            }
            return Ok(WorkerOutput::failure(format!(
                "{} refused {}",
                self.id, input.task_id
            )));
        }

        Ok(WorkerOutput::success(serde_json::json!({
            "worker": self.id,
            "step": step.step_type,
            "task": input.task_id,
        })))
    }
}

/// Provider that fails with a retryable error a fixed number of times
pub struct FlakyProvider {
    failures_left: AtomicU32,
    calls: AtomicU32,
    error: LLMError,
}

impl FlakyProvider {
    pub fn new(failures: u32) -> Self {
        Self::with_error(failures, LLMError::ProviderUnavailable("overloaded".into()))
    }

    pub fn with_error(failures: u32, error: LLMError) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
            error,
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LLMProvider for FlakyProvider {
    fn generate(&self, request: GenerationRequest) -> BoxFuture<'_, Result<GenerationResponse, LLMError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if failing {
                return Err(self.error.clone());
            }
            Ok(GenerationResponse {
                text: format!("generated: {}", request.prompt),
                model_used: Some("flaky-1".to_string()),
                token_usage: TokenUsage::new(10, 5),
                ..Default::default()
            })
        })
    }

    fn provider_name(&self) -> &str {
        "flaky"
    }
}

/// Event handler that keeps every event it sees
#[derive(Clone, Default)]
pub struct RecordingHandler {
    events: Arc<Mutex<Vec<TaskEvent>>>,
}

impl RecordingHandler {
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl TaskEventHandler for RecordingHandler {
    fn handle_event(&self, event: &TaskEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
