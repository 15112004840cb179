use crate::task::step::StepOutcome;
use crate::task::types::TaskSpec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Pure function turning a successful step outcome into follow-up task definitions
pub type TaskGenerator = dyn Fn(&StepOutcome) -> Vec<TaskSpec> + Send + Sync;

/// Named task generators. Steps refer to them by name so definitions stay serializable.
#[derive(Clone, Default)]
pub struct GeneratorRegistry {
    generators: HashMap<String, Arc<TaskGenerator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, generator: F)
    where
        F: Fn(&StepOutcome) -> Vec<TaskSpec> + Send + Sync + 'static,
    {
        self.generators.insert(name.into(), Arc::new(generator));
    }

    pub fn with_generator<F>(mut self, name: impl Into<String>, generator: F) -> Self
    where
        F: Fn(&StepOutcome) -> Vec<TaskSpec> + Send + Sync + 'static,
    {
        self.register(name, generator);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.generators.contains_key(name)
    }

    /// `None` when no generator is registered under `name`
    pub fn generate(&self, name: &str, outcome: &StepOutcome) -> Option<Vec<TaskSpec>> {
        self.generators.get(name).map(|generator| generator(outcome))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.generators.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }
}

impl fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorRegistry")
            .field("generators", &self.names())
            .finish()
    }
}
