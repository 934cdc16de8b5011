//! Text-generation backend.
//!
//! The poll loop only depends on the [`LlmProvider`] trait. The shipped
//! backend is an OpenAI-compatible legacy completions endpoint, which takes a
//! raw prompt plus stop sequences and sampling penalties.

pub mod openai;
pub mod provider;

pub use openai::OpenAiCompletions;
pub use provider::*;

use std::sync::Arc;

use crate::config::GenerationConfig;
use crate::error::ConfigError;

/// Create the completion provider from configuration.
pub fn create_provider(config: &GenerationConfig) -> Result<Arc<dyn LlmProvider>, ConfigError> {
    let provider = OpenAiCompletions::new(config)?;
    tracing::info!("Using OpenAI completions (model: {})", config.model);
    Ok(Arc::new(provider))
}
