//! Provider-neutral completion types and the `LlmProvider` trait.

use async_trait::async_trait;

use crate::error::GenerationError;

/// Most completion APIs accept at most four stop sequences.
pub const MAX_STOP_SEQUENCES: usize = 4;

/// A plain-text completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub stop: Vec<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    /// Server-side candidates to sample before returning the best one.
    pub best_of: u32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens: 256,
            stop: Vec::new(),
            temperature: 1.0,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            best_of: 1,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_sampling(mut self, temperature: f32, top_p: f32) -> Self {
        self.temperature = temperature;
        self.top_p = top_p;
        self
    }

    pub fn with_penalties(mut self, frequency: f32, presence: f32) -> Self {
        self.frequency_penalty = frequency;
        self.presence_penalty = presence;
        self
    }

    /// Reject requests the backend would refuse anyway.
    pub fn validate(&self) -> Result<(), GenerationError> {
        let invalid = |reason: String| Err(GenerationError::InvalidRequest { reason });

        if self.prompt.trim().is_empty() {
            return invalid("prompt is empty".into());
        }
        if self.max_tokens == 0 {
            return invalid("max_tokens must be positive".into());
        }
        if self.stop.len() > MAX_STOP_SEQUENCES {
            return invalid(format!(
                "{} stop sequences given, at most {MAX_STOP_SEQUENCES} allowed",
                self.stop.len()
            ));
        }
        if self.stop.iter().any(|s| s.is_empty()) {
            return invalid("stop sequences must be non-empty".into());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return invalid(format!("temperature {} outside [0, 2]", self.temperature));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return invalid(format!("top_p {} outside [0, 1]", self.top_p));
        }
        for (name, value) in [
            ("frequency_penalty", self.frequency_penalty),
            ("presence_penalty", self.presence_penalty),
        ] {
            if !(-2.0..=2.0).contains(&value) {
                return invalid(format!("{name} {value} outside [-2, 2]"));
            }
        }
        if self.best_of == 0 {
            return invalid("best_of must be positive".into());
        }
        Ok(())
    }
}

/// Candidate completions, in the order the provider returned them.
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    pub choices: Vec<String>,
}

impl CompletionResponse {
    /// The first candidate, trimmed. `None` when it is missing or blank.
    pub fn first_text(&self) -> Option<&str> {
        self.choices
            .first()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
    }
}

/// A text-completion backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, GenerationError>;
}
