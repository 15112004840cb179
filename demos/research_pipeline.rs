//! Research pipeline: research, analysis, an LLM summary and a decision, with a
//! generator fanning out follow-up reviews.
//!
//! Run with `TASKWEAVE_LOG=taskweave=debug cargo run --example research_pipeline`.

use anyhow::Result;
use futures::future::BoxFuture;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use taskweave::llm::{
    GenerationRequest, GenerationResponse, LLMError, LLMProvider, ProviderRegistry, TokenUsage,
};
use taskweave::task::{
    Collaborators, FnWorker, GeneratorRegistry, LoggingEventHandler, Step, StepCondition,
    TaskExecutor, TaskSpec, TaskType, WorkerOutput, WorkerPool,
};
use taskweave::{ConfigDiscovery, TaskManager};

/// Answers with the last line of the prompt, reversed word by word
struct MirrorProvider;

impl LLMProvider for MirrorProvider {
    fn generate(&self, request: GenerationRequest) -> BoxFuture<'_, Result<GenerationResponse, LLMError>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let last_line = request.prompt.lines().last().unwrap_or_default();
            let text = last_line.split_whitespace().rev().collect::<Vec<_>>().join(" ");
            let input_tokens = self.estimate_tokens(&request.prompt);
            let output_tokens = self.estimate_tokens(&text);
            Ok(GenerationResponse {
                text,
                model_used: Some("mirror-1".to_string()),
                token_usage: TokenUsage::new(input_tokens, output_tokens),
                ..Default::default()
            })
        })
    }

    fn provider_name(&self) -> &str {
        "mirror"
    }
}

fn researcher() -> FnWorker {
    FnWorker::new("researcher", |step, input| {
        Ok(WorkerOutput::success(json!({
            "findings": format!("{} findings for {}", step.step_type, input.task_name),
            "payload": input.payload,
        })))
    })
    .with_skills(["research", "analysis"])
    .with_resource("memory_gb", 16.0)
}

fn reviewer() -> FnWorker {
    FnWorker::new("reviewer", |step, input| {
        let verdict = match step.options.as_ref().and_then(|options| options.first()) {
            Some(choice) => json!({ "choice": choice }),
            None => json!({ "reviewed": input.task_id }),
        };
        Ok(WorkerOutput::success(verdict))
    })
    .with_skills(["review", "decision"])
}

#[tokio::main]
async fn main() -> Result<()> {
    taskweave::logging::init_logging();

    let config = ConfigDiscovery::discover_config()?;

    let generators = GeneratorRegistry::new().with_generator("review_each", |outcome| {
        ["correctness", "performance"]
            .iter()
            .map(|aspect| {
                TaskSpec::new(format!("Review {}", aspect), TaskType::Review)
                    .with_id(format!("review-{}", aspect))
                    .with_dependency("summarize")
                    .with_skill("review")
                    .with_metadata("source_step", json!(outcome.index))
                    .with_step(Step::new("review"))
            })
            .collect()
    });

    let providers = ProviderRegistry::new().with_provider("mirror", Arc::new(MirrorProvider));
    let mut manager = TaskManager::from_config(&config)
        .with_executor(TaskExecutor::new(config.executor.clone()).with_generators(generators))
        .with_collaborators(Collaborators::in_memory().with_providers(providers));
    manager.add_event_handler(Box::new(LoggingEventHandler));

    manager
        .add_task(
            TaskSpec::new("Survey schedulers", TaskType::Research)
                .with_id("survey")
                .with_priority(10)
                .with_skill("research")
                .with_step(Step::research("work stealing schedulers")),
        )
        .await?;
    manager
        .add_task(
            TaskSpec::new("Compare designs", TaskType::Analysis)
                .with_id("compare")
                .with_dependency("survey")
                .with_skill("analysis")
                .with_resource("memory_gb", 8.0)
                .with_step(Step::analysis(
                    json!({ "designs": ["global queue", "work stealing"] }),
                    "comparative",
                )),
        )
        .await?;
    manager
        .add_task(
            TaskSpec::new("Summarize", TaskType::Analysis)
                .with_id("summarize")
                .with_dependency("compare")
                .with_step(
                    Step::llm("work stealing wins under skewed load")
                        .with_few_shot("global queue contention", "contention queue global")
                        .with_chain_of_thought()
                        .with_retries(3, 200)
                        .with_generator("review_each"),
                ),
        )
        .await?;
    manager
        .add_task(
            TaskSpec::new("Choose a design", TaskType::Decision)
                .with_id("choose")
                .with_dependency("summarize")
                .with_skill("decision")
                .with_step(Step::decision(
                    vec![json!("work stealing"), json!("global queue")],
                    vec!["throughput".to_string(), "simplicity".to_string()],
                ))
                .with_step(Step::new("review").with_condition(StepCondition::AllSuccess)),
        )
        .await?;

    println!("Critical path: {:?}", manager.critical_path().await);

    let pool = WorkerPool::new()
        .with_worker(Arc::new(researcher()))
        .with_worker(Arc::new(reviewer()));
    let report = manager.execute(&pool).await;

    println!("{}", report.to_json()?);
    println!("{:#?}", manager.statistics().await);
    Ok(())
}
