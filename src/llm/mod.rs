pub mod provider;
pub mod registry;
pub mod retry;
pub mod types;


pub use provider::LLMProvider;
pub use registry::{DEFAULT_PROVIDER, ProviderRegistry};
pub use retry::{RetryExhausted, RetryOutcome, RetryPolicy};
pub use types::*;
