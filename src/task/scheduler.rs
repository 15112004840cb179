use crate::task::types::*;
use crate::task::worker::{Worker, WorkerPool};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Worker selection by weighted scoring.
///
/// Keeps the per-worker load and a bounded outcome history; both are private
/// bookkeeping, the workers themselves never see them.
#[derive(Debug)]
pub struct TaskScheduler {
    config: SchedulerConfig,
    loads: HashMap<WorkerId, u32>,
    history: HashMap<WorkerId, VecDeque<f64>>,
    assignments: HashMap<WorkerId, BTreeSet<TaskId>>,
}

/// Weights for the worker scoring algorithm
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringWeights {
    pub skill_match_weight: f64,
    pub performance_weight: f64,
    pub load_weight: f64,
    pub resource_weight: f64,
}

/// Scheduler configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub weights: ScoringWeights,
    /// Number of recent outcomes averaged into the performance score
    pub history_window: usize,
    /// Load at which the load factor bottoms out at zero
    pub max_load: u32,
    /// Performance assumed for a worker with no history
    pub default_performance: f64,
    /// Concurrent tasks one worker may hold before it stops being idle
    pub worker_capacity: u32,
}

/// Per-criterion scores behind a selection
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct ScoreBreakdown {
    pub skill_match: f64,
    pub performance: f64,
    pub load_factor: f64,
    pub resource_match: f64,
    pub total: f64,
}

/// Result of assigning a task to a worker
#[derive(Clone)]
pub struct Assignment {
    pub worker: Arc<dyn Worker>,
    pub worker_id: WorkerId,
    pub score: ScoreBreakdown,
    pub selection_reason: String,
}

impl fmt::Debug for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assignment")
            .field("worker_id", &self.worker_id)
            .field("score", &self.score)
            .field("selection_reason", &self.selection_reason)
            .finish()
    }
}

impl TaskScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            loads: HashMap::new(),
            history: HashMap::new(),
            assignments: HashMap::new(),
        }
    }

    /// Replace the scoring weights
    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.config.weights = weights;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Eligible workers for `task`, best first. Ties go to the lower worker id.
    pub fn rank_workers(&self, task: &Task, pool: &WorkerPool) -> Vec<(Arc<dyn Worker>, ScoreBreakdown)> {
        let mut ranked: Vec<(Arc<dyn Worker>, ScoreBreakdown)> = Vec::new();
        for worker in pool.iter() {
            if !self.is_idle(worker.as_ref()) || !task.required_skills.is_subset(worker.skills()) {
                continue;
            }
            let score = self.score_worker(task, worker.as_ref());
            ranked.push((Arc::clone(worker), score));
        }

        ranked.sort_by(|(a, a_score), (b, b_score)| {
            b_score
                .total
                .partial_cmp(&a_score.total)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id().cmp(b.id()))
        });
        ranked
    }

    /// Pick the best worker and charge one unit of load to it
    pub fn assign_worker(&mut self, task: &Task, pool: &WorkerPool) -> Option<Assignment> {
        let Some((worker, score)) = self.rank_workers(task, pool).into_iter().next() else {
            debug!(
                "No eligible worker for task {} among {} workers",
                task.id,
                pool.len()
            );
            return None;
        };

        let worker_id = worker.id().to_string();
        *self.loads.entry(worker_id.clone()).or_insert(0) += 1;
        self.assignments
            .entry(worker_id.clone())
            .or_default()
            .insert(task.id.clone());

        let selection_reason = self.build_selection_reason(task, &worker_id, &score);
        info!(
            "Assigned task {} to worker {} with score {:.2}: {}",
            task.id, worker_id, score.total, selection_reason
        );

        Some(Assignment {
            worker,
            worker_id,
            score,
            selection_reason,
        })
    }

    /// Release the load held by `task_id` and record the outcome
    pub fn complete_task(&mut self, worker_id: &str, task_id: &str, success: bool) {
        if let Some(load) = self.loads.get_mut(worker_id) {
            *load = load.saturating_sub(1);
        }
        if let Some(tasks) = self.assignments.get_mut(worker_id) {
            tasks.remove(task_id);
        }

        let window = self.config.history_window.max(1);
        let history = self.history.entry(worker_id.to_string()).or_default();
        history.push_back(if success { 1.0 } else { 0.0 });
        while history.len() > window {
            history.pop_front();
        }

        debug!(
            "Worker {} finished task {} (success: {}), load now {}",
            worker_id,
            task_id,
            success,
            self.current_load(worker_id)
        );
    }

    /// A worker could take `task` but is already holding its full capacity.
    /// Such tasks should wait for the next round rather than be skipped.
    pub fn capacity_exhausted(&self, task: &Task, pool: &WorkerPool) -> bool {
        let capacity = self.config.worker_capacity.max(1);
        pool.iter().any(|worker| {
            !worker.is_busy()
                && task.required_skills.is_subset(worker.skills())
                && self.current_load(worker.id()) >= capacity
        })
    }

    pub fn current_load(&self, worker_id: &str) -> u32 {
        self.loads.get(worker_id).copied().unwrap_or(0)
    }

    /// Mean of the recent outcome window, or the configured default when unseen
    pub fn performance(&self, worker_id: &str) -> f64 {
        match self.history.get(worker_id) {
            Some(history) if !history.is_empty() => {
                history.iter().sum::<f64>() / history.len() as f64
            }
            _ => self.config.default_performance,
        }
    }

    pub fn performance_history(&self, worker_id: &str) -> Vec<f64> {
        self.history
            .get(worker_id)
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn assigned_tasks(&self, worker_id: &str) -> Vec<TaskId> {
        self.assignments
            .get(worker_id)
            .map(|tasks| tasks.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn is_idle(&self, worker: &dyn Worker) -> bool {
        !worker.is_busy() && self.current_load(worker.id()) < self.config.worker_capacity.max(1)
    }

    fn score_worker(&self, task: &Task, worker: &dyn Worker) -> ScoreBreakdown {
        let skill_match = self.calculate_skill_score(task, worker);
        let performance = self.performance(worker.id());
        let load_factor = self.calculate_load_score(worker);
        let resource_match = self.calculate_resource_score(task, worker);

        let weights = &self.config.weights;
        let total = skill_match * weights.skill_match_weight
            + performance * weights.performance_weight
            + load_factor * weights.load_weight
            + resource_match * weights.resource_weight;

        ScoreBreakdown {
            skill_match,
            performance,
            load_factor,
            resource_match,
            total,
        }
    }

    fn calculate_skill_score(&self, task: &Task, worker: &dyn Worker) -> f64 {
        if task.required_skills.is_empty() {
            return 1.0;
        }
        let matched = task.required_skills.intersection(worker.skills()).count() as f64;
        matched / task.required_skills.len() as f64
    }

    fn calculate_load_score(&self, worker: &dyn Worker) -> f64 {
        let cap = self.config.max_load.max(1);
        let load = self.current_load(worker.id()).min(cap);
        1.0 - load as f64 / cap as f64
    }

    fn calculate_resource_score(&self, task: &Task, worker: &dyn Worker) -> f64 {
        if task.resources.is_empty() {
            return 1.0;
        }
        let available = worker.resources();
        let satisfied = task
            .resources
            .iter()
            .filter(|(name, needed)| available.get(*name).is_some_and(|have| have >= *needed))
            .count() as f64;
        satisfied / task.resources.len() as f64
    }

    fn build_selection_reason(&self, task: &Task, worker_id: &str, score: &ScoreBreakdown) -> String {
        let mut reasons = Vec::new();

        if !task.required_skills.is_empty() {
            let skills: Vec<&str> = task.required_skills.iter().map(String::as_str).collect();
            reasons.push(format!("has skills [{}]", skills.join(", ")));
        }

        if self.history.contains_key(worker_id) {
            reasons.push(format!("performance {:.2}", score.performance));
        } else {
            reasons.push("no history".to_string());
        }

        if score.load_factor >= 1.0 {
            reasons.push("idle".to_string());
        } else {
            reasons.push(format!("load factor {:.2}", score.load_factor));
        }

        if !task.resources.is_empty() && score.resource_match < 1.0 {
            reasons.push(format!("partial resources ({:.0}%)", score.resource_match * 100.0));
        }

        reasons.push(format!("score {:.2}", score.total));
        reasons.join(", ")
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            skill_match_weight: 0.4,
            performance_weight: 0.3,
            load_weight: 0.2,
            resource_weight: 0.1,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            history_window: 10,
            max_load: 5,
            default_performance: 0.5,
            worker_capacity: 1,
        }
    }
}
