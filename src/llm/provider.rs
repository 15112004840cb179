use crate::llm::types::{GenerationRequest, GenerationResponse, LLMError};
use futures::future::BoxFuture;

/// Text generation backend used by `llm` steps.
///
/// Concrete clients live outside this crate; they are registered by name in a
/// [`ProviderRegistry`](crate::llm::ProviderRegistry) handed to the executor.
pub trait LLMProvider: Send + Sync {
    /// Generate a completion for a single request
    fn generate(&self, request: GenerationRequest)
    -> BoxFuture<'_, Result<GenerationResponse, LLMError>>;

    /// Get provider name/identifier
    fn provider_name(&self) -> &str;

    /// Estimate token count for text
    fn estimate_tokens(&self, text: &str) -> u64 {
        (text.len() as u64).div_ceil(4)
    }
}
