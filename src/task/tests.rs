#[cfg(test)]
mod tests {
    use crate::llm::{GenerationRequest, GenerationResponse, LLMError, LLMProvider, ProviderRegistry};
    use crate::task::*;
    use chrono::{Duration, Utc};
    use futures::future::BoxFuture;
    use serde_json::json;
    use std::sync::Arc;

    fn spec(id: &str) -> TaskSpec {
        TaskSpec::new(format!("Task {}", id), TaskType::Custom).with_id(id)
    }

    fn task(id: &str) -> Task {
        Task::from_spec(spec(id)).unwrap()
    }

    fn task_with_deps(id: &str, deps: &[&str]) -> Task {
        let spec = deps
            .iter()
            .fold(spec(id), |spec, dep| spec.with_dependency(*dep));
        Task::from_spec(spec).unwrap()
    }

    /// Succeeds on every step except ones tagged `boom`
    fn scripted_worker(id: &str) -> Arc<dyn Worker> {
        Arc::new(FnWorker::new(id, |step, input| {
            if step.step_type == "boom" {
                Ok(WorkerOutput::failure("exploded"))
            } else {
                Ok(WorkerOutput::success(json!({
                    "handled": step.step_type,
                    "payload": input.payload,
                })))
            }
        }))
    }

    struct FixedProvider;

    impl LLMProvider for FixedProvider {
        fn generate(
            &self,
            request: GenerationRequest,
        ) -> BoxFuture<'_, Result<GenerationResponse, LLMError>> {
            let text = format!("answer to: {}", request.prompt);
            Box::pin(async move { Ok(GenerationResponse::text(text)) })
        }

        fn provider_name(&self) -> &str {
            "fixed"
        }
    }

    // Task model

    #[test]
    fn test_task_from_spec_generates_id() {
        let task = Task::from_spec(TaskSpec::new("Anonymous", TaskType::Research)).unwrap();

        assert!(!task.id.is_empty());
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.current_step, 0);
        assert_eq!(task.metrics.attempts, 0);
        assert!(task.is_ready());
    }

    #[test]
    fn test_spec_validation() {
        let empty_name = TaskSpec::new("  ", TaskType::Custom);
        assert!(matches!(
            empty_name.validate(),
            Err(TaskError::InvalidTaskDefinition(_))
        ));

        let self_dependent = spec("loop").with_dependency("loop");
        assert!(matches!(
            self_dependent.validate(),
            Err(TaskError::CycleDetected { .. })
        ));

        let negative_resource = spec("r").with_resource("cpu", -1.0);
        assert!(negative_resource.validate().is_err());

        let untyped_step = spec("s").with_step(Step::new(""));
        assert!(untyped_step.validate().is_err());

        let bad_alternate = spec("alt").with_alternate(TaskSpec::new("", TaskType::Custom));
        assert!(bad_alternate.validate().is_err());
    }

    #[test]
    fn test_spec_json_accepts_type_alias() {
        let spec = TaskSpec::from_json(
            r#"{"id": "r1", "name": "Read papers", "type": "research", "priority": 3,
                "steps": [{"type": "research", "query": "dag schedulers"}]}"#,
        )
        .unwrap();

        assert_eq!(spec.task_type, TaskType::Research);
        assert_eq!(spec.priority, 3);
        assert_eq!(spec.failure_strategy, FailureStrategy::SkipDependent);
        assert_eq!(spec.steps[0].query.as_deref(), Some("dag schedulers"));
    }

    #[test]
    fn test_task_lifecycle() {
        let mut task = task("life");

        task.start();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.metrics.attempts, 1);
        assert!(task.start_time.is_some());

        task.fail("first attempt failed");
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.metrics.success_rate, 0.0);

        task.reset();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.current_step, 0);
        assert_eq!(task.metrics.attempts, 1);

        task.start();
        task.complete(json!({"ok": true}));
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.metrics.attempts, 2);
        assert!((task.metrics.success_rate - 0.5).abs() < f64::EPSILON);
        assert!(task.error.is_none());
        assert_eq!(task.results.len(), 1);
        assert!(task.status.is_terminal());
    }

    #[test]
    fn test_block_records_unmet_dependencies() {
        let mut task = task_with_deps("waiting", &["a", "b"]);
        task.block();

        assert_eq!(task.status, TaskStatus::Blocked);
        assert_eq!(task.error.as_deref(), Some("Unmet dependencies: a, b"));
    }

    #[test]
    fn test_advance_step_is_monotonic() {
        let mut task = task("steps");
        task.advance_step(2);
        task.advance_step(1);
        assert_eq!(task.current_step, 2);
    }

    // Graph

    #[test]
    fn test_graph_dependency_resolution() {
        let mut graph = TaskGraph::new();
        graph.add_task(task("a")).unwrap();
        graph.add_task(task_with_deps("b", &["a"])).unwrap();
        graph.add_task(task_with_deps("c", &["a", "b"])).unwrap();

        assert_eq!(graph.ready_tasks(None), vec!["a".to_string()]);
        assert!(!graph.is_ready("b"));

        graph.get_task_mut("a").unwrap().complete(json!(null));
        assert_eq!(graph.complete_task("a"), vec!["b".to_string()]);
        assert!(graph.get_task("c").unwrap().dependencies.contains("b"));

        graph.get_task_mut("b").unwrap().complete(json!(null));
        assert_eq!(graph.complete_task("b"), vec!["c".to_string()]);
        assert!(graph.is_ready("c"));
    }

    #[test]
    fn test_graph_rejects_duplicates() {
        let mut graph = TaskGraph::new();
        graph.add_task(task("a")).unwrap();
        assert!(matches!(
            graph.add_task(task("a")),
            Err(TaskError::InvalidTaskDefinition(_))
        ));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_graph_rejects_cycle_unchanged() {
        let mut graph = TaskGraph::new();
        graph.add_task(task_with_deps("b", &["a"])).unwrap();
        graph.add_task(task_with_deps("c", &["b"])).unwrap();

        let result = graph.add_task(task_with_deps("a", &["c"]));
        assert!(matches!(result, Err(TaskError::CycleDetected { .. })));

        assert_eq!(graph.len(), 2);
        assert!(!graph.contains("a"));
        assert!(graph.dependents_of("c").is_empty());
        assert_eq!(graph.critical_path(), vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_graph_completed_dependency_satisfied_on_arrival() {
        let mut graph = TaskGraph::new();
        graph.add_task(task("a")).unwrap();
        graph.get_task_mut("a").unwrap().complete(json!(null));
        graph.complete_task("a");

        graph.add_task(task_with_deps("late", &["a"])).unwrap();
        assert!(graph.is_ready("late"));
        assert_eq!(graph.ancestors("late").len(), 1);
    }

    #[test]
    fn test_graph_ancestors_and_descendants() {
        let mut graph = TaskGraph::new();
        graph.add_task(task("a")).unwrap();
        graph.add_task(task_with_deps("b", &["a"])).unwrap();
        graph.add_task(task_with_deps("c", &["b"])).unwrap();
        graph.add_task(task("unrelated")).unwrap();

        let descendants: Vec<TaskId> = graph.descendants("a").into_iter().collect();
        assert_eq!(descendants, vec!["b".to_string(), "c".to_string()]);

        let ancestors: Vec<TaskId> = graph.ancestors("c").into_iter().collect();
        assert_eq!(ancestors, vec!["a".to_string(), "b".to_string()]);

        assert!(graph.descendants("unrelated").is_empty());
    }

    #[test]
    fn test_graph_critical_path() {
        let mut graph = TaskGraph::new();
        graph.add_task(task("a")).unwrap();
        graph.add_task(task_with_deps("b", &["a"])).unwrap();
        graph.add_task(task_with_deps("c", &["a"])).unwrap();
        graph.add_task(task_with_deps("d", &["b"])).unwrap();

        assert_eq!(
            graph.critical_path(),
            vec!["a".to_string(), "b".to_string(), "d".to_string()]
        );
        assert!(TaskGraph::new().critical_path().is_empty());
    }

    #[test]
    fn test_graph_substitute_moves_dependents() {
        let mut graph = TaskGraph::new();
        graph.add_task(task("a")).unwrap();
        graph.add_task(task_with_deps("b", &["a"])).unwrap();
        graph.add_task(task_with_deps("c", &["b"])).unwrap();

        let replacement_id = graph.substitute("a", task("a2")).unwrap();
        assert_eq!(replacement_id, "a2");
        assert!(graph.get_task("b").unwrap().dependencies.contains("a2"));
        assert!(!graph.get_task("b").unwrap().dependencies.contains("a"));
        assert!(graph.dependents_of("a").is_empty());
        assert_eq!(graph.descendants("a2").len(), 2);

        let looping = task_with_deps("a3", &["c"]);
        assert!(matches!(
            graph.substitute("a2", looping),
            Err(TaskError::CycleDetected { .. })
        ));
        assert!(!graph.contains("a3"));
    }

    #[test]
    fn test_graph_statistics_and_missing_dependencies() {
        let mut graph = TaskGraph::new();
        graph.add_task(task("a")).unwrap();
        graph.add_task(task_with_deps("b", &["ghost"])).unwrap();
        graph.get_task_mut("a").unwrap().start();
        graph.get_task_mut("a").unwrap().complete(json!(null));

        let stats = graph.statistics();
        assert_eq!(stats.total_tasks, 2);
        assert_eq!(stats.completed_tasks, 1);
        assert_eq!(stats.pending_tasks, 1);
        assert_eq!(stats.success_rate, 1.0);
        assert!(stats.average_completion_time.is_some());

        let missing: Vec<TaskId> = graph.missing_dependencies().into_iter().collect();
        assert_eq!(missing, vec!["ghost".to_string()]);
    }

    // Queue

    #[test]
    fn test_queue_priority_then_fifo() {
        let mut queue = TaskQueue::new();
        let low = Task::from_spec(spec("low").with_priority(5)).unwrap();
        let first = Task::from_spec(spec("first").with_priority(10)).unwrap();
        let second = Task::from_spec(spec("second").with_priority(10)).unwrap();

        queue.add(&low);
        queue.add(&first);
        queue.add(&second);

        assert_eq!(queue.next().as_deref(), Some("first"));
        assert_eq!(queue.next().as_deref(), Some("second"));
        assert_eq!(queue.next().as_deref(), Some("low"));
        assert_eq!(queue.next(), None);

        let stats = queue.stats();
        assert_eq!(stats.total_enqueued, 3);
        assert_eq!(stats.total_dequeued, 3);
        assert_eq!(stats.current_size, 0);
    }

    #[test]
    fn test_queue_defers_until_dependencies_complete() {
        let mut queue = TaskQueue::new();
        let blocked = Task::from_spec(spec("blocked").with_priority(100).with_dependency("a")).unwrap();
        queue.add(&blocked);
        queue.add(&task("a"));

        assert_eq!(queue.next().as_deref(), Some("a"));
        assert_eq!(queue.next(), None);
        assert!(queue.contains("blocked"));

        queue.complete_task("a");
        assert_eq!(queue.next().as_deref(), Some("blocked"));
    }

    #[test]
    fn test_queue_replace_dependency_and_remove() {
        let mut queue = TaskQueue::new();
        queue.add(&task_with_deps("b", &["a"]));
        queue.replace_dependency("a", "a2");

        queue.complete_task("a");
        assert_eq!(queue.next(), None);
        queue.complete_task("a2");
        assert_eq!(queue.next().as_deref(), Some("b"));

        queue.add(&task("gone"));
        assert!(queue.remove("gone"));
        assert!(!queue.remove("gone"));
        assert!(queue.is_empty());
    }

    // Scheduler

    #[test]
    fn test_scheduler_scoring_and_tie_break() {
        let pool = WorkerPool::new()
            .with_worker(Arc::new(FnWorker::echo("w2").with_skill("rust")))
            .with_worker(Arc::new(FnWorker::echo("w1").with_skill("rust")));
        let scheduler = TaskScheduler::default();
        let task = Task::from_spec(spec("t").with_skill("rust")).unwrap();

        let ranked = scheduler.rank_workers(&task, &pool);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0.id(), "w1");
        assert!((ranked[0].1.total - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_scheduler_prefers_better_performance() {
        let pool = WorkerPool::new()
            .with_worker(Arc::new(FnWorker::echo("w1")))
            .with_worker(Arc::new(FnWorker::echo("w2")));
        let mut scheduler = TaskScheduler::default();

        let first = scheduler.assign_worker(&task("t1"), &pool).unwrap();
        assert_eq!(first.worker_id, "w1");
        scheduler.complete_task("w1", "t1", false);

        let second = scheduler.assign_worker(&task("t2"), &pool).unwrap();
        assert_eq!(second.worker_id, "w2");
        assert_eq!(scheduler.performance("w1"), 0.0);
        assert_eq!(scheduler.performance_history("w1"), vec![0.0]);
        assert_eq!(scheduler.assigned_tasks("w2"), vec!["t2".to_string()]);
    }

    #[test]
    fn test_scheduler_skill_filter_and_capacity() {
        let pool = WorkerPool::new()
            .with_worker(Arc::new(FnWorker::echo("w1").with_skill("rust")))
            .with_worker(Arc::new(FnWorker::echo("w2").with_skills(["rust", "python"])));
        let mut scheduler = TaskScheduler::default();

        let python = Task::from_spec(spec("py").with_skill("python")).unwrap();
        assert_eq!(scheduler.assign_worker(&python, &pool).unwrap().worker_id, "w2");

        let go = Task::from_spec(spec("go").with_skill("go")).unwrap();
        assert!(scheduler.assign_worker(&go, &pool).is_none());
        assert!(!scheduler.capacity_exhausted(&go, &pool));

        let rust = Task::from_spec(spec("rs").with_skill("rust")).unwrap();
        assert_eq!(scheduler.assign_worker(&rust, &pool).unwrap().worker_id, "w1");

        let more_python = Task::from_spec(spec("py2").with_skill("python")).unwrap();
        assert!(scheduler.assign_worker(&more_python, &pool).is_none());
        assert!(scheduler.capacity_exhausted(&more_python, &pool));

        scheduler.complete_task("w2", "py", true);
        assert_eq!(scheduler.current_load("w2"), 0);
        assert!(scheduler.assign_worker(&more_python, &pool).is_some());
    }

    #[test]
    fn test_scheduler_skips_busy_workers() {
        let busy = Arc::new(FnWorker::echo("w1"));
        busy.set_busy(true);
        let pool = WorkerPool::new()
            .with_worker(busy.clone())
            .with_worker(Arc::new(FnWorker::echo("w2")));
        let mut scheduler = TaskScheduler::default();

        assert_eq!(scheduler.assign_worker(&task("t"), &pool).unwrap().worker_id, "w2");
    }

    #[test]
    fn test_scheduler_resource_match() {
        let pool = WorkerPool::new()
            .with_worker(Arc::new(FnWorker::echo("small").with_resource("memory_gb", 4.0)))
            .with_worker(Arc::new(FnWorker::echo("large").with_resource("memory_gb", 32.0)));
        let scheduler = TaskScheduler::default();
        let task = Task::from_spec(spec("big").with_resource("memory_gb", 16.0)).unwrap();

        let ranked = scheduler.rank_workers(&task, &pool);
        assert_eq!(ranked[0].0.id(), "large");
        assert_eq!(ranked[1].1.resource_match, 0.0);
    }

    // Steps and handlers

    #[test]
    fn test_step_conditions() {
        let step = Step::new("work");
        let outcomes = vec![
            StepOutcome::succeeded(0, &step, json!(1), 0),
            StepOutcome::failed(1, &step, "no", 0),
            StepOutcome::skipped(2, &step),
        ];

        assert!(StepCondition::AllSuccess.evaluate(&[]));
        assert!(!StepCondition::AllSuccess.evaluate(&outcomes));
        assert!(StepCondition::AnySuccess.evaluate(&outcomes));
        assert!(StepCondition::Threshold { min_successes: 1 }.evaluate(&outcomes));
        assert!(!StepCondition::Threshold { min_successes: 2 }.evaluate(&outcomes));
    }

    #[test]
    fn test_step_condition_deserializes_value_alias() {
        let step: Step = serde_json::from_value(json!({
            "type": "llm",
            "prompt": "summarize",
            "condition": {"type": "threshold", "value": 2},
            "custom_flag": true
        }))
        .unwrap();

        assert_eq!(
            step.condition,
            Some(StepCondition::Threshold { min_successes: 2 })
        );
        assert_eq!(step.extra.get("custom_flag"), Some(&json!(true)));
    }

    #[test]
    fn test_llm_retry_delay_in_seconds() {
        let step: Step = serde_json::from_value(json!({
            "type": "llm",
            "prompt": "hi",
            "max_retries": 3,
            "retry_delay": 0.05
        }))
        .unwrap();

        assert_eq!(step.retry_delay, Some(0.05));
        assert!(step.extra.is_empty());
        assert_eq!(step.retry_backoff(), Some(std::time::Duration::from_millis(50)));

        let both = Step {
            retry_delay: Some(2.0),
            ..Step::llm("hi").with_retries(3, 10)
        };
        assert_eq!(both.retry_backoff(), Some(std::time::Duration::from_millis(10)));
        assert_eq!(Step::llm("hi").retry_backoff(), None);

        let negative = spec("neg").with_step(Step {
            retry_delay: Some(-1.0),
            ..Step::llm("hi")
        });
        assert!(matches!(
            negative.validate(),
            Err(TaskError::InvalidTaskDefinition(_))
        ));
    }

    #[test]
    fn test_build_prompt_order() {
        let step = Step::llm("What is 3+3?")
            .with_few_shot("2+2", "4")
            .with_chain_of_thought();
        let context = vec![("memories".to_string(), json!("prior"))];

        let prompt = build_prompt(&step, "What is 3+3?", &context);
        assert_eq!(
            prompt,
            "Input: 2+2\nOutput: 4\n\nContext:\nmemories: prior\n\nLet's solve this step by step:\nWhat is 3+3?"
        );

        assert_eq!(build_prompt(&Step::llm("plain"), "plain", &[]), "plain");
    }

    #[test]
    fn test_handler_registry_fallback() {
        let registry = HandlerRegistry::default();
        assert_eq!(
            registry.tags(),
            vec!["analysis", "decision", "llm", "research"]
        );
        assert!(!registry.has_handler("custom"));
        assert!(HandlerRegistry::empty().tags().is_empty());
    }

    // Executor

    #[tokio::test]
    async fn test_executor_fail_fast_stops_remaining_steps() {
        let mut task = Task::from_spec(
            spec("ff")
                .with_step(Step::new("work"))
                .with_step(Step::new("boom").fail_fast())
                .with_step(Step::new("work")),
        )
        .unwrap();

        let result = TaskExecutor::default()
            .execute_task(&mut task, scripted_worker("w"), &Collaborators::in_memory())
            .await;

        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.steps_completed, 1);
        assert_eq!(result.outputs.len(), 2);
        assert!(matches!(
            result.error,
            Some(TaskError::StepExecution { step_index: 1, .. })
        ));
        assert_eq!(task.metrics.attempts, 1);
    }

    #[tokio::test]
    async fn test_executor_continues_without_fail_fast() {
        let mut task = Task::from_spec(
            spec("cont")
                .with_step(Step::new("work"))
                .with_step(Step::new("boom"))
                .with_step(Step::new("work")),
        )
        .unwrap();

        let result = TaskExecutor::default()
            .execute_task(&mut task, scripted_worker("w"), &Collaborators::in_memory())
            .await;

        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.steps_completed, 2);
        assert_eq!(result.outputs.len(), 3);
        assert_eq!(task.current_step, 3);
    }

    #[tokio::test]
    async fn test_executor_conditional_steps() {
        let mut task = Task::from_spec(
            spec("cond")
                .with_step(Step::new("work"))
                .with_step(Step::new("boom"))
                .with_step(Step::new("work").with_condition(StepCondition::AllSuccess))
                .with_step(Step::new("work").with_condition(StepCondition::AnySuccess)),
        )
        .unwrap();

        let result = TaskExecutor::default()
            .execute_task(&mut task, scripted_worker("w"), &Collaborators::in_memory())
            .await;

        let statuses: Vec<StepStatus> = result.outputs.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![
                StepStatus::Succeeded,
                StepStatus::Failed,
                StepStatus::Skipped,
                StepStatus::Succeeded
            ]
        );
        assert_eq!(result.steps_completed, 2);
    }

    #[tokio::test]
    async fn test_executor_runs_generators() {
        let generators = GeneratorRegistry::new().with_generator("fanout", |outcome| {
            (0..2)
                .map(|i| {
                    TaskSpec::new(format!("follow-up {}", i), TaskType::Analysis)
                        .with_metadata("parent_step", json!(outcome.index))
                })
                .collect()
        });
        let executor = TaskExecutor::default().with_generators(generators);

        let mut task = Task::from_spec(
            spec("gen")
                .with_step(Step::new("work").with_generator("fanout"))
                .with_step(Step::new("work").with_generator("unknown")),
        )
        .unwrap();

        let result = executor
            .execute_task(&mut task, scripted_worker("w"), &Collaborators::in_memory())
            .await;

        assert!(result.is_success());
        assert_eq!(result.generated_tasks.len(), 1);
        let batch = &result.generated_tasks[0];
        assert_eq!(batch.step_index, 0);
        assert_eq!(batch.generator, "fanout");
        assert_eq!(batch.tasks.len(), 2);
        assert_eq!(batch.tasks[1].name, "follow-up 1");
    }

    #[tokio::test]
    async fn test_research_uses_memory_cache() {
        let memory = Arc::new(InMemoryMemory::new());
        let knowledge = Arc::new(InMemoryKnowledgeGraph::new());
        let collaborators = Collaborators::in_memory()
            .with_memory(memory.clone())
            .with_knowledge(knowledge.clone());
        let executor = TaskExecutor::default();

        let mut first = Task::from_spec(spec("r1").with_step(Step::research("rust async"))).unwrap();
        let result = executor
            .execute_task(&mut first, scripted_worker("w"), &collaborators)
            .await;
        assert!(result.is_success());
        assert_eq!(result.outputs[0].output.as_ref().unwrap()["source"], "worker");
        assert_eq!(memory.records_of_type("research").await.len(), 1);
        assert!(knowledge.node("research:r1:0").is_some());
        assert_eq!(knowledge.relations_from("r1").await[0].kind, "researched");

        let mut second = Task::from_spec(spec("r2").with_step(Step::research("Rust Async"))).unwrap();
        let result = executor
            .execute_task(&mut second, scripted_worker("w"), &collaborators)
            .await;
        assert_eq!(result.outputs[0].output.as_ref().unwrap()["source"], "memory");
    }

    #[tokio::test]
    async fn test_step_validation_errors() {
        let executor = TaskExecutor::default();
        let collaborators = Collaborators::in_memory();

        let mut analysis = Task::from_spec(spec("a").with_step(Step::new("analysis"))).unwrap();
        let result = executor
            .execute_task(&mut analysis, scripted_worker("w"), &collaborators)
            .await;
        assert!(matches!(
            result.error,
            Some(TaskError::StepValidation { step_index: 0, .. })
        ));

        let mut decision =
            Task::from_spec(spec("d").with_step(Step::decision(vec![], vec!["cost".into()]))).unwrap();
        let result = executor
            .execute_task(&mut decision, scripted_worker("w"), &collaborators)
            .await;
        assert!(matches!(result.error, Some(TaskError::StepValidation { .. })));

        let mut llm = Task::from_spec(spec("l").with_step(Step::llm("hello"))).unwrap();
        let result = executor
            .execute_task(&mut llm, scripted_worker("w"), &collaborators)
            .await;
        assert!(matches!(result.error, Some(TaskError::StepValidation { .. })));
    }

    #[tokio::test]
    async fn test_memory_search_matches_whole_words() {
        let memory = Arc::new(InMemoryMemory::new());
        memory
            .add_memory(json!({
                "type": "task_failure",
                "task_id": "t1",
                "error": "worker failed to respond",
            }))
            .await
            .unwrap();

        assert!(memory.search_memories("ai").await.unwrap().is_empty());
        assert!(memory.search_memories("fail").await.unwrap().is_empty());
        assert_eq!(memory.search_memories("FAILED worker").await.unwrap().len(), 1);
        assert_eq!(memory.search_memories("task_failure").await.unwrap().len(), 1);

        let collaborators = Collaborators::in_memory().with_memory(memory);
        let mut task = Task::from_spec(spec("r").with_step(Step::research("ai"))).unwrap();
        let result = TaskExecutor::default()
            .execute_task(&mut task, scripted_worker("w"), &collaborators)
            .await;

        assert!(result.is_success());
        assert_eq!(result.outputs[0].output.as_ref().unwrap()["source"], "worker");
    }

    #[tokio::test]
    async fn test_knowledge_search_matches_whole_words() {
        let knowledge = InMemoryKnowledgeGraph::new();
        knowledge
            .add_node("rust-async", json!({"topic": "Rust async runtimes"}))
            .await
            .unwrap();

        assert_eq!(knowledge.search("runtimes rust").await.unwrap().len(), 1);
        assert!(knowledge.search("runtime").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_decision_and_analysis_reach_worker() {
        let executor = TaskExecutor::default();
        let collaborators = Collaborators::in_memory();
        let mut task = Task::from_spec(
            spec("pick")
                .with_step(Step::analysis(json!({"latency_ms": [12, 15]}), "performance"))
                .with_step(Step::decision(
                    vec![json!("tokio"), json!("async-std")],
                    vec!["maturity".to_string()],
                )),
        )
        .unwrap();

        let result = executor
            .execute_task(&mut task, scripted_worker("w"), &collaborators)
            .await;

        assert!(result.is_success());
        let decision = result.outputs[1].output.as_ref().unwrap();
        assert_eq!(decision["handled"], "decision");
        assert!(decision["payload"]["context"].get("maturity_history").is_some());
    }

    #[tokio::test]
    async fn test_llm_step_records_response() {
        let memory = Arc::new(InMemoryMemory::new());
        let collaborators = Collaborators::in_memory()
            .with_memory(memory.clone())
            .with_providers(ProviderRegistry::new().with_provider("fixed", Arc::new(FixedProvider)));
        let mut task = Task::from_spec(spec("llm").with_step(Step::llm("Name a color"))).unwrap();

        let result = TaskExecutor::default()
            .execute_task(&mut task, scripted_worker("w"), &collaborators)
            .await;

        assert!(result.is_success());
        let output = result.outputs[0].output.as_ref().unwrap();
        assert_eq!(output["text"], "answer to: Name a color");
        assert_eq!(output["attempts"], 1);
        assert_eq!(memory.records_of_type("llm_response").await.len(), 1);
    }

    #[tokio::test]
    async fn test_deadline_enforcement() {
        let past = Utc::now() - Duration::seconds(5);

        let mut late = Task::from_spec(spec("late").with_deadline(past).with_step(Step::new("work"))).unwrap();
        let strict = TaskExecutor::new(ExecutorConfig {
            enforce_deadlines: true,
            ..Default::default()
        });
        let result = strict
            .execute_task(&mut late, scripted_worker("w"), &Collaborators::in_memory())
            .await;
        assert!(matches!(result.error, Some(TaskError::DeadlineExceeded { .. })));
        assert_eq!(result.steps_completed, 0);

        let mut advisory = Task::from_spec(spec("advisory").with_deadline(past).with_step(Step::new("work"))).unwrap();
        let result = TaskExecutor::default()
            .execute_task(&mut advisory, scripted_worker("w"), &Collaborators::in_memory())
            .await;
        assert!(result.is_success());
    }
}
