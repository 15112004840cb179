use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Text generation request handed to a provider
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

/// Provider response
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GenerationResponse {
    pub text: String,
    pub model_used: Option<String>,
    pub token_usage: TokenUsage,
    pub execution_time: Duration,
}

/// Token usage statistics
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub estimated_cost: f64,
}

/// LLM provider errors
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum LLMError {
    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        reset_time: Option<DateTime<Utc>>,
    },
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Model not available: {0}")]
    ModelUnavailable(String),
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("Context too large: {current} > {max}")]
    ContextTooLarge { current: u64, max: u64 },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Provider returned an empty response")]
    EmptyResponse,
    #[error("Provider-specific error: {0}")]
    ProviderSpecific(String),
}

impl LLMError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            LLMError::RateLimit { .. } => true,
            LLMError::ProviderUnavailable(_) => true,
            LLMError::Network(_) => true,
            LLMError::EmptyResponse => true,
            LLMError::ProviderSpecific(_) => true,
            LLMError::Authentication(_) => false,
            LLMError::InvalidRequest(_) => false,
            LLMError::ModelUnavailable(_) => false,
            LLMError::ContextTooLarge { .. } => false,
        }
    }
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            estimated_cost: 0.0,
        }
    }
}

impl GenerationResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}
