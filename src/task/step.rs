use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Tags of the steps with built-in handlers
pub mod step_types {
    pub const RESEARCH: &str = "research";
    pub const ANALYSIS: &str = "analysis";
    pub const DECISION: &str = "decision";
    pub const LLM: &str = "llm";
}

/// One unit of a task's ordered work list.
///
/// The `type` tag selects the handler. Typed fields are read by the built-in
/// handlers; anything else a custom handler needs is kept in `extra`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Step {
    #[serde(rename = "type")]
    pub step_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub criteria: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Base backoff in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<f64>,
    /// Base backoff in milliseconds; wins over `retry_delay` when both are set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub few_shot_examples: Vec<FewShotExample>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub chain_of_thought: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_query: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<StepCondition>,
    /// Name of a registered generator run after this step succeeds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub fail_fast: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Input/output pair prepended to an LLM prompt
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FewShotExample {
    pub input: String,
    pub output: String,
}

/// Gate evaluated against the outcomes of the steps already executed in this attempt
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepCondition {
    /// Every executed step succeeded (vacuously true before the first step)
    AllSuccess,
    /// At least one executed step succeeded
    AnySuccess,
    /// At least `min_successes` executed steps succeeded
    Threshold {
        #[serde(alias = "value")]
        min_successes: usize,
    },
}

impl StepCondition {
    pub fn evaluate(&self, prior: &[StepOutcome]) -> bool {
        let mut executed = prior.iter().filter(|o| o.status != StepStatus::Skipped);
        match self {
            StepCondition::AllSuccess => executed.all(StepOutcome::is_success),
            StepCondition::AnySuccess => executed.any(StepOutcome::is_success),
            StepCondition::Threshold { min_successes } => {
                executed.filter(|o| o.is_success()).count() >= *min_successes
            }
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    /// Condition evaluated false; not a failure
    Skipped,
}

/// Record of one step within an attempt
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StepOutcome {
    pub index: usize,
    pub step_type: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl StepOutcome {
    pub fn succeeded(index: usize, step: &Step, output: Value, duration_ms: u64) -> Self {
        Self {
            index,
            step_type: step.step_type.clone(),
            status: StepStatus::Succeeded,
            output: Some(output),
            error: None,
            duration_ms,
        }
    }

    pub fn failed(index: usize, step: &Step, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            index,
            step_type: step.step_type.clone(),
            status: StepStatus::Failed,
            output: None,
            error: Some(error.into()),
            duration_ms,
        }
    }

    pub fn skipped(index: usize, step: &Step) -> Self {
        Self {
            index,
            step_type: step.step_type.clone(),
            status: StepStatus::Skipped,
            output: None,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Succeeded
    }
}

impl Step {
    /// A step with the given tag and no fields
    pub fn new(step_type: impl Into<String>) -> Self {
        Self {
            step_type: step_type.into(),
            ..Default::default()
        }
    }

    pub fn research(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::new(step_types::RESEARCH)
        }
    }

    pub fn analysis(data: Value, analysis_type: impl Into<String>) -> Self {
        Self {
            data: Some(data),
            analysis_type: Some(analysis_type.into()),
            ..Self::new(step_types::ANALYSIS)
        }
    }

    pub fn decision(options: Vec<Value>, criteria: Vec<String>) -> Self {
        Self {
            options: Some(options),
            criteria,
            ..Self::new(step_types::DECISION)
        }
    }

    pub fn llm(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Self::new(step_types::LLM)
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay_ms: u64) -> Self {
        self.max_retries = Some(max_retries);
        self.retry_delay_ms = Some(retry_delay_ms);
        self
    }

    pub fn with_few_shot(mut self, input: impl Into<String>, output: impl Into<String>) -> Self {
        self.few_shot_examples.push(FewShotExample {
            input: input.into(),
            output: output.into(),
        });
        self
    }

    pub fn with_chain_of_thought(mut self) -> Self {
        self.chain_of_thought = true;
        self
    }

    pub fn with_condition(mut self, condition: StepCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_generator(mut self, name: impl Into<String>) -> Self {
        self.generator = Some(name.into());
        self
    }

    pub fn with_context_query(mut self, query: impl Into<String>) -> Self {
        self.context_query = Some(query.into());
        self
    }

    pub fn with_knowledge_query(mut self, query: impl Into<String>) -> Self {
        self.knowledge_query = Some(query.into());
        self
    }

    /// Abort the remaining steps of the attempt if this one fails
    pub fn fail_fast(mut self) -> Self {
        self.fail_fast = true;
        self
    }

    /// Backoff base from `retry_delay_ms` or `retry_delay`, if either is usable
    pub fn retry_backoff(&self) -> Option<Duration> {
        match (self.retry_delay_ms, self.retry_delay) {
            (Some(ms), _) => Some(Duration::from_millis(ms)),
            (None, Some(secs)) => Duration::try_from_secs_f64(secs).ok(),
            (None, None) => None,
        }
    }

    /// Attach a custom field, kept in `extra`
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}
