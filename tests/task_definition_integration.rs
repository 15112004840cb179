mod common;

use common::ScriptedWorker;
use std::fs;
use std::sync::Arc;
use taskweave::task::{
    DefinitionError, FailureStrategy, StepCondition, TaskError, TaskLoader, TaskManager, TaskType,
    WorkerPool,
};
use tempfile::TempDir;

const PIPELINE_YAML: &str = r#"
tasks:
  - id: collect
    name: Collect benchmark data
    type: research
    priority: 10
    required_skills: [benchmarks]
    steps:
      - type: research
        query: allocator benchmarks
  - id: analyze
    name: Analyze results
    type: analysis
    dependencies: [collect]
    failure_strategy: retry
    steps:
      - type: analysis
        data: {samples: [1, 2, 3]}
        analysis_type: statistical
      - type: report
        condition:
          type: all_success
  - id: decide
    name: Pick an allocator
    type: decision
    dependencies: [analyze]
    failure_strategy: alternate
    alternate_task:
      id: decide-manually
      name: Escalate the choice
    steps:
      - type: decision
        options: [jemalloc, mimalloc]
        criteria: [throughput]
"#;

#[test]
fn test_yaml_pipeline_parses() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("pipeline.yaml");
    fs::write(&path, PIPELINE_YAML).unwrap();

    let specs = TaskLoader::load_specs(&path).expect("Should load YAML definitions");
    assert_eq!(specs.len(), 3);

    assert_eq!(specs[0].task_type, TaskType::Research);
    assert!(specs[0].required_skills.contains("benchmarks"));
    assert_eq!(specs[1].failure_strategy, FailureStrategy::Retry);
    assert_eq!(specs[1].steps[1].condition, Some(StepCondition::AllSuccess));
    assert_eq!(specs[2].failure_strategy, FailureStrategy::Alternate);
    assert_eq!(
        specs[2].alternate_task.as_ref().and_then(|alt| alt.id.as_deref()),
        Some("decide-manually")
    );
}

#[tokio::test]
async fn test_loaded_definitions_run_to_completion() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("pipeline.yml");
    fs::write(&path, PIPELINE_YAML).unwrap();

    let manager = TaskManager::default();
    let specs = TaskLoader::load_specs(&path).unwrap();
    let registered = manager.add_tasks(specs).await.unwrap();
    assert_eq!(registered, vec!["collect", "analyze", "decide"]);

    let worker = Arc::new(ScriptedWorker::new("bench-runner").with_skill("benchmarks"));
    let pool = WorkerPool::new().with_worker(worker.clone());
    let report = manager.execute(&pool).await;

    assert!(report.is_success(), "unexpected report: {:?}", report);
    assert_eq!(worker.log(), vec!["collect", "analyze", "decide"]);

    let analyze = manager.get_task("analyze").await.unwrap();
    assert_eq!(analyze.current_step, 2);
}

#[test]
fn test_json_list_definitions() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("tasks.json");
    fs::write(
        &path,
        r#"[
            {"id": "one", "name": "First", "priority": 1},
            {"id": "two", "name": "Second", "dependencies": ["one"],
             "steps": [{"type": "llm", "prompt": "Explain", "max_retries": 5, "retry_delay_ms": 10,
                        "few_shot_examples": [{"input": "a", "output": "b"}],
                        "chain_of_thought": true}]}
        ]"#,
    )
    .unwrap();

    let specs = TaskLoader::load_specs(&path).unwrap();
    assert_eq!(specs.len(), 2);

    let llm = &specs[1].steps[0];
    assert_eq!(llm.max_retries, Some(5));
    assert_eq!(llm.retry_delay_ms, Some(10));
    assert_eq!(llm.few_shot_examples.len(), 1);
    assert!(llm.chain_of_thought);
}

#[test]
fn test_definition_errors() {
    let temp_dir = TempDir::new().unwrap();

    let self_loop = temp_dir.path().join("loop.json");
    fs::write(&self_loop, r#"{"id": "x", "name": "Loop", "dependencies": ["x"]}"#).unwrap();
    assert!(matches!(
        TaskLoader::load_specs(&self_loop),
        Err(DefinitionError::Invalid(TaskError::CycleDetected { .. }))
    ));

    let malformed = temp_dir.path().join("bad.yaml");
    fs::write(&malformed, "tasks: [unclosed").unwrap();
    assert!(matches!(
        TaskLoader::load_specs(&malformed),
        Err(DefinitionError::Parse(_))
    ));

    let wrong_type = temp_dir.path().join("wrong.json");
    fs::write(&wrong_type, r#"{"name": "Bad", "priority": "high"}"#).unwrap();
    assert!(matches!(
        TaskLoader::load_specs(&wrong_type),
        Err(DefinitionError::Parse(_))
    ));
}

#[tokio::test]
async fn test_add_tasks_stops_at_first_rejection() {
    let manager = TaskManager::default();
    let specs = TaskLoader::parse_specs(
        r#"[
            {"id": "a", "name": "A"},
            {"id": "a", "name": "Duplicate"},
            {"id": "c", "name": "C"}
        ]"#,
        taskweave::task::DefinitionFormat::Json,
    )
    .unwrap();

    let result = manager.add_tasks(specs).await;
    assert!(matches!(result, Err(TaskError::InvalidTaskDefinition(_))));

    let stats = manager.statistics().await;
    assert_eq!(stats.total_tasks, 1);
    assert!(manager.get_task("c").await.is_err());
}

#[test]
fn test_llm_retry_delay_from_yaml() {
    let specs = TaskLoader::parse_specs(
        r#"
id: summarize
name: Summarize findings
steps:
  - type: llm
    prompt: Summarize the benchmark results
    max_retries: 4
    retry_delay: 1.5
"#,
        taskweave::task::DefinitionFormat::Yaml,
    )
    .unwrap();

    let step = &specs[0].steps[0];
    assert_eq!(step.max_retries, Some(4));
    assert_eq!(step.retry_backoff(), Some(std::time::Duration::from_millis(1500)));
    assert!(step.extra.get("retry_delay").is_none());
}
