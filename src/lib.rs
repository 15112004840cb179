//! # Taskweave
//!
//! A dependency-aware task orchestration engine. Tasks are ordered sequences of
//! typed steps; they form a DAG through their dependencies and are dispatched
//! in priority order to the best-scoring capable worker.
//!
//! ## Architecture Overview
//!
//! - **[`task`]**: task model, dependency graph, priority queue, scheduler,
//!   step handlers, executor and the [`TaskManager`] that ties them together
//! - **[`llm`]**: provider-agnostic text generation with retry and backoff
//! - **[`config`]**: TOML configuration with discovery
//! - **[`logging`]**: tracing subscriber setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use taskweave::task::{FnWorker, Step, TaskSpec, TaskType, WorkerPool};
//! use taskweave::TaskManager;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     taskweave::logging::init_logging();
//!
//!     let manager = TaskManager::default();
//!     manager
//!         .add_task(
//!             TaskSpec::new("Survey prior work", TaskType::Research)
//!                 .with_id("survey")
//!                 .with_step(Step::research("task scheduling")),
//!         )
//!         .await?;
//!
//!     let pool = WorkerPool::new().with_worker(Arc::new(FnWorker::echo("worker-1")));
//!     let report = manager.execute(&pool).await;
//!     println!("{}", report.to_json()?);
//!     Ok(())
//! }
//! ```

/// Task orchestration: model, graph, queue, scheduling and execution.
pub mod task;

/// Provider-agnostic LLM interface.
///
/// Providers are registered by name; llm steps pick one and retry transient
/// failures with linear backoff.
pub mod llm;

/// Orchestrator configuration and file discovery.
pub mod config;

/// Environment constants and path utilities.
pub mod env;

pub mod logging;

pub use config::{ConfigDiscovery, OrchestratorConfig};
pub use llm::{LLMProvider, ProviderRegistry, RetryPolicy};
pub use task::{
    FailureStrategy, RunReport, Step, Task, TaskError, TaskExecutor, TaskGraph, TaskManager,
    TaskManagerConfig, TaskQueue, TaskScheduler, TaskSpec, TaskStatus, TaskType,
};
