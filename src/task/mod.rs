pub mod collaborators;
pub mod executor;
pub mod generators;
pub mod graph;
pub mod handlers;
pub mod loader;
pub mod manager;
pub mod queue;
pub mod scheduler;
pub mod step;
pub mod types;
pub mod worker;

#[cfg(test)]
mod tests;

pub use collaborators::*;
pub use executor::*;
pub use generators::*;
pub use graph::*;
pub use handlers::{
    AnalysisHandler, DecisionHandler, DefaultHandler, HandlerRegistry, LlmHandler,
    ResearchHandler, StepContext, StepHandler, build_prompt,
};
pub use loader::*;
pub use manager::*;
pub use queue::*;
pub use scheduler::*;
pub use step::*;
pub use types::*;
pub use worker::*;
