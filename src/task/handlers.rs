use crate::llm::{DEFAULT_PROVIDER, GenerationRequest, LLMError, RetryPolicy};
use crate::task::collaborators::Collaborators;
use crate::task::step::{Step, step_types};
use crate::task::types::{TaskError, TaskId};
use crate::task::worker::{StepInput, Worker};
use chrono::Utc;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything a handler needs to run one step of one attempt
#[derive(Clone)]
pub struct StepContext {
    pub task_id: TaskId,
    pub task_name: String,
    pub step_index: usize,
    pub worker: Arc<dyn Worker>,
    pub collaborators: Collaborators,
    /// Outputs of the steps that already succeeded in this attempt
    pub previous_outputs: Vec<Value>,
}

impl StepContext {
    pub fn validation_error(&self, step: &Step, message: impl Into<String>) -> TaskError {
        TaskError::StepValidation {
            step_index: self.step_index,
            step_type: step.step_type.clone(),
            message: message.into(),
        }
    }

    pub fn execution_error(&self, step: &Step, message: impl fmt::Display) -> TaskError {
        TaskError::StepExecution {
            step_index: self.step_index,
            step_type: step.step_type.clone(),
            message: message.to_string(),
        }
    }

    /// Hand the step to the assigned worker; worker errors and failure reports
    /// both become `StepExecution` errors.
    pub async fn invoke_worker(&self, step: &Step, payload: Value) -> Result<Value, TaskError> {
        let input = StepInput {
            task_id: self.task_id.clone(),
            task_name: self.task_name.clone(),
            step_index: self.step_index,
            payload,
            previous_outputs: self.previous_outputs.clone(),
        };

        let output = self
            .worker
            .execute_step(step, &input)
            .await
            .map_err(|e| self.execution_error(step, e))?;

        if output.is_success() {
            Ok(output.output)
        } else {
            let message = output
                .error
                .unwrap_or_else(|| format!("worker {} reported failure", self.worker.id()));
            Err(self.execution_error(step, message))
        }
    }

    /// Memory lookup; a failing store fails the step
    async fn recall(&self, step: &Step, query: &str) -> Result<Vec<Value>, TaskError> {
        self.collaborators
            .memory
            .search_memories(query)
            .await
            .map_err(|e| self.execution_error(step, format!("memory search failed: {}", e)))
    }

    /// Knowledge-graph lookup; a failing store fails the step
    async fn lookup(&self, step: &Step, query: &str) -> Result<Vec<Value>, TaskError> {
        self.collaborators
            .knowledge
            .search(query)
            .await
            .map_err(|e| self.execution_error(step, format!("knowledge search failed: {}", e)))
    }

    /// Write-back to memory. The step already succeeded, so failures are only logged.
    async fn remember(&self, record: Value) {
        if let Err(e) = self.collaborators.memory.add_memory(record).await {
            warn!("Failed to record memory for task {}: {}", self.task_id, e);
        }
    }

    /// Store a provenance node and link it to the task
    async fn record_node(&self, node_id: &str, attributes: Value, relation: &str) {
        let knowledge = &self.collaborators.knowledge;
        if let Err(e) = knowledge.add_node(node_id, attributes).await {
            warn!("Failed to add knowledge node {}: {}", node_id, e);
            return;
        }
        let relation_attrs = json!({ "step_index": self.step_index });
        if let Err(e) = knowledge
            .add_relation(&self.task_id, node_id, relation, relation_attrs)
            .await
        {
            warn!(
                "Failed to relate task {} to {}: {}",
                self.task_id, node_id, e
            );
        }
    }

    fn node_id(&self, kind: &str) -> String {
        format!("{}:{}:{}", kind, self.task_id, self.step_index)
    }
}

/// Executes one kind of step
#[async_trait::async_trait]
pub trait StepHandler: Send + Sync {
    async fn handle(&self, step: &Step, ctx: &StepContext) -> Result<Value, TaskError>;
}

/// Step handlers keyed by step tag, with a fallback for unknown tags
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn StepHandler>>,
    fallback: Arc<dyn StepHandler>,
}

impl HandlerRegistry {
    /// Only the default forwarding handler
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(DefaultHandler),
        }
    }

    /// research, analysis, decision and llm handlers; llm steps that do not set
    /// their own retry fields use `llm_policy`
    pub fn with_builtins(llm_policy: RetryPolicy) -> Self {
        let mut registry = Self::empty();
        registry.register(step_types::RESEARCH, Arc::new(ResearchHandler));
        registry.register(step_types::ANALYSIS, Arc::new(AnalysisHandler));
        registry.register(step_types::DECISION, Arc::new(DecisionHandler));
        registry.register(step_types::LLM, Arc::new(LlmHandler::new(llm_policy)));
        registry
    }

    /// Register or replace the handler for `tag`
    pub fn register(&mut self, tag: impl Into<String>, handler: Arc<dyn StepHandler>) {
        self.handlers.insert(tag.into(), handler);
    }

    pub fn set_fallback(&mut self, handler: Arc<dyn StepHandler>) {
        self.fallback = handler;
    }

    pub fn resolve(&self, tag: &str) -> Arc<dyn StepHandler> {
        self.handlers
            .get(tag)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    pub fn has_handler(&self, tag: &str) -> bool {
        self.handlers.contains_key(tag)
    }

    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.handlers.keys().cloned().collect();
        tags.sort();
        tags
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_builtins(RetryPolicy::default())
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("tags", &self.tags())
            .finish_non_exhaustive()
    }
}

/// Memory cache, then knowledge graph, then the worker
pub struct ResearchHandler;

#[async_trait::async_trait]
impl StepHandler for ResearchHandler {
    async fn handle(&self, step: &Step, ctx: &StepContext) -> Result<Value, TaskError> {
        let query = step
            .query
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| ctx.validation_error(step, "research step requires 'query'"))?;

        let cached = ctx.recall(step, query).await?;
        if !cached.is_empty() {
            debug!("Research '{}' answered from memory ({} hits)", query, cached.len());
            return Ok(json!({ "source": "memory", "results": cached }));
        }

        let known = ctx.lookup(step, query).await?;
        if !known.is_empty() {
            debug!(
                "Research '{}' answered from knowledge graph ({} hits)",
                query,
                known.len()
            );
            return Ok(json!({ "source": "knowledge_graph", "results": known }));
        }

        let results = ctx.invoke_worker(step, json!({ "query": query })).await?;

        ctx.remember(json!({
            "type": "research",
            "query": query,
            "results": results,
            "task_id": ctx.task_id,
            "timestamp": Utc::now().to_rfc3339(),
        }))
        .await;
        ctx.record_node(
            &ctx.node_id("research"),
            json!({ "type": "research", "query": query, "results": results }),
            "researched",
        )
        .await;

        Ok(json!({ "source": "worker", "results": results }))
    }
}

/// Worker analysis enriched with prior analyses and known patterns
pub struct AnalysisHandler;

#[async_trait::async_trait]
impl StepHandler for AnalysisHandler {
    async fn handle(&self, step: &Step, ctx: &StepContext) -> Result<Value, TaskError> {
        let data = step
            .data
            .clone()
            .ok_or_else(|| ctx.validation_error(step, "analysis step requires 'data'"))?;
        let analysis_type = step.analysis_type.as_deref().unwrap_or("general");

        let mut context = Map::new();
        let previous = ctx
            .recall(step, &format!("analysis {}", analysis_type))
            .await?;
        if !previous.is_empty() {
            context.insert("previous_analyses".to_string(), Value::from(previous));
        }
        let patterns = ctx.lookup(step, analysis_type).await?;
        if !patterns.is_empty() {
            context.insert("patterns".to_string(), Value::from(patterns));
        }

        let results = ctx
            .invoke_worker(
                step,
                json!({ "data": data, "analysis_type": analysis_type, "context": context }),
            )
            .await?;

        ctx.remember(json!({
            "type": "analysis",
            "analysis_type": analysis_type,
            "results": results,
            "task_id": ctx.task_id,
            "timestamp": Utc::now().to_rfc3339(),
        }))
        .await;
        ctx.record_node(
            &ctx.node_id("analysis"),
            json!({ "type": "analysis", "analysis_type": analysis_type, "data": data, "results": results }),
            "analyzed",
        )
        .await;

        Ok(results)
    }
}

/// Worker decision with per-criterion history from memory
pub struct DecisionHandler;

#[async_trait::async_trait]
impl StepHandler for DecisionHandler {
    async fn handle(&self, step: &Step, ctx: &StepContext) -> Result<Value, TaskError> {
        let options = step
            .options
            .clone()
            .filter(|options| !options.is_empty())
            .ok_or_else(|| ctx.validation_error(step, "decision step requires non-empty 'options'"))?;

        let mut context = Map::new();
        for criterion in &step.criteria {
            let history = ctx.recall(step, criterion).await?;
            context.insert(format!("{}_history", criterion), Value::from(history));
        }
        let patterns = ctx.lookup(step, "decision").await?;
        if !patterns.is_empty() {
            context.insert("patterns".to_string(), Value::from(patterns));
        }

        let decision = ctx
            .invoke_worker(
                step,
                json!({ "options": options, "criteria": step.criteria, "context": context }),
            )
            .await?;

        ctx.remember(json!({
            "type": "decision",
            "options": options,
            "criteria": step.criteria,
            "decision": decision,
            "task_id": ctx.task_id,
            "timestamp": Utc::now().to_rfc3339(),
        }))
        .await;
        ctx.record_node(
            &ctx.node_id("decision"),
            json!({ "type": "decision", "criteria": step.criteria, "decision": decision }),
            "decided",
        )
        .await;

        Ok(decision)
    }
}

/// Prompt assembly plus a retried call to a registered provider
pub struct LlmHandler {
    default_policy: RetryPolicy,
}

impl LlmHandler {
    pub fn new(default_policy: RetryPolicy) -> Self {
        Self { default_policy }
    }

    fn policy_for(&self, step: &Step) -> RetryPolicy {
        RetryPolicy {
            max_retries: step.max_retries.unwrap_or(self.default_policy.max_retries),
            retry_delay: step.retry_backoff().unwrap_or(self.default_policy.retry_delay),
        }
    }
}

/// Few-shot examples, then context, then the chain-of-thought cue, then the prompt
pub fn build_prompt(step: &Step, prompt: &str, context: &[(String, Value)]) -> String {
    let mut parts = Vec::new();

    for example in &step.few_shot_examples {
        parts.push(format!("Input: {}", example.input));
        parts.push(format!("Output: {}\n", example.output));
    }

    if !context.is_empty() {
        parts.push("Context:".to_string());
        for (key, value) in context {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            parts.push(format!("{}: {}", key, rendered));
        }
        parts.push(String::new());
    }

    if step.chain_of_thought {
        parts.push("Let's solve this step by step:".to_string());
    }

    parts.push(prompt.to_string());
    parts.join("\n")
}

#[async_trait::async_trait]
impl StepHandler for LlmHandler {
    async fn handle(&self, step: &Step, ctx: &StepContext) -> Result<Value, TaskError> {
        let prompt = step
            .prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ctx.validation_error(step, "llm step requires 'prompt'"))?;
        let provider_name = step.provider.as_deref().unwrap_or(DEFAULT_PROVIDER);
        let provider = ctx.collaborators.providers.get(provider_name).ok_or_else(|| {
            ctx.validation_error(step, format!("unknown LLM provider '{}'", provider_name))
        })?;
        let llm_type = step.llm_type.as_deref().unwrap_or("completion");

        let mut context = Vec::new();
        let memories = ctx.recall(step, &format!("llm {}", llm_type)).await?;
        if !memories.is_empty() {
            context.push(("memories".to_string(), Value::from(memories)));
        }
        let knowledge = ctx.lookup(step, llm_type).await?;
        if !knowledge.is_empty() {
            context.push(("knowledge".to_string(), Value::from(knowledge)));
        }

        let request = GenerationRequest {
            prompt: build_prompt(step, prompt, &context),
            model: step.model.clone(),
            temperature: step.temperature,
            max_tokens: step.max_tokens,
            stop: step.stop.clone(),
        };

        let policy = self.policy_for(step);
        let outcome = policy
            .run(|attempt| {
                let provider = Arc::clone(&provider);
                let request = request.clone();
                async move {
                    debug!(
                        "LLM attempt {} via {}",
                        attempt,
                        provider.provider_name()
                    );
                    match provider.generate(request).await {
                        Ok(response) if response.text.trim().is_empty() => {
                            Err(LLMError::EmptyResponse)
                        }
                        other => other,
                    }
                }
            })
            .await;

        let (failures, result) = match outcome {
            Ok(success) => (success.failures.clone(), Ok(success)),
            Err(exhausted) => (exhausted.failures.clone(), Err(exhausted)),
        };

        for (index, error) in failures.iter().enumerate() {
            ctx.remember(json!({
                "type": "llm_error",
                "llm_type": llm_type,
                "provider": provider_name,
                "prompt": prompt,
                "error": error.to_string(),
                "attempt": index + 1,
                "task_id": ctx.task_id,
                "timestamp": Utc::now().to_rfc3339(),
            }))
            .await;
        }

        match result {
            Ok(success) => {
                let response = success.value;
                ctx.remember(json!({
                    "type": "llm_response",
                    "llm_type": llm_type,
                    "provider": provider_name,
                    "prompt": prompt,
                    "response": response.text,
                    "attempt": success.attempts,
                    "task_id": ctx.task_id,
                    "timestamp": Utc::now().to_rfc3339(),
                }))
                .await;
                ctx.record_node(
                    &ctx.node_id("llm_response"),
                    json!({
                        "type": "llm_response",
                        "llm_type": llm_type,
                        "prompt": prompt,
                        "response": response.text,
                    }),
                    "generated",
                )
                .await;

                Ok(json!({
                    "text": response.text,
                    "model": response.model_used,
                    "provider": provider_name,
                    "attempts": success.attempts,
                    "token_usage": response.token_usage,
                }))
            }
            Err(exhausted) if exhausted.last_error.is_retryable() => {
                Err(TaskError::TransientProvider {
                    attempts: exhausted.attempts,
                    message: exhausted.last_error.to_string(),
                })
            }
            Err(exhausted) => Err(ctx.execution_error(step, exhausted.last_error)),
        }
    }
}

/// Forwards the step to the worker, enriched by the optional context and
/// knowledge queries
pub struct DefaultHandler;

#[async_trait::async_trait]
impl StepHandler for DefaultHandler {
    async fn handle(&self, step: &Step, ctx: &StepContext) -> Result<Value, TaskError> {
        let mut payload = serde_json::to_value(step)
            .map_err(|e| ctx.execution_error(step, format!("cannot encode step: {}", e)))?;

        if let Value::Object(fields) = &mut payload {
            if let Some(query) = step.context_query.as_deref() {
                let memories = ctx.recall(step, query).await?;
                fields.insert("context".to_string(), Value::from(memories));
            }
            if let Some(query) = step.knowledge_query.as_deref() {
                let knowledge = ctx.lookup(step, query).await?;
                fields.insert("knowledge".to_string(), Value::from(knowledge));
            }
        }

        ctx.invoke_worker(step, payload).await
    }
}
