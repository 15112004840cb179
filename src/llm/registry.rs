use crate::llm::provider::LLMProvider;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Name steps use to ask for whichever provider is the default
pub const DEFAULT_PROVIDER: &str = "default";

/// Named LLM providers, constructed by the caller and injected into the executor
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn LLMProvider>>,
    default_provider: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under `name`. The first provider registered becomes the default.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn LLMProvider>) {
        let name = name.into();
        debug!(
            "Registered LLM provider '{}' ({})",
            name,
            provider.provider_name()
        );
        if self.default_provider.is_none() {
            self.default_provider = Some(name.clone());
        }
        self.providers.insert(name, provider);
    }

    pub fn with_provider(mut self, name: impl Into<String>, provider: Arc<dyn LLMProvider>) -> Self {
        self.register(name, provider);
        self
    }

    /// Returns false when no provider is registered under `name`
    pub fn set_default(&mut self, name: &str) -> bool {
        if self.providers.contains_key(name) {
            self.default_provider = Some(name.to_string());
            true
        } else {
            false
        }
    }

    /// Look up by name; `"default"` resolves to the default provider unless a
    /// provider was explicitly registered under that name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn LLMProvider>> {
        if let Some(provider) = self.providers.get(name) {
            return Some(Arc::clone(provider));
        }
        if name == DEFAULT_PROVIDER {
            return self
                .default_provider
                .as_ref()
                .and_then(|default| self.providers.get(default))
                .cloned();
        }
        None
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .field("default_provider", &self.default_provider)
            .finish()
    }
}
