//! Reply prompt construction.

use crate::error::GenerationError;
use crate::llm::CompletionRequest;

const MAX_TOKENS: u32 = 600;
const TEMPERATURE: f32 = 0.9;
const TOP_P: f32 = 0.75;
const FREQUENCY_PENALTY: f32 = 2.0;
const PRESENCE_PENALTY: f32 = 1.7;

/// Remove the bot's own mention (`u/<username> ` or `/u/<username> `)
/// wherever it appears, leaving the question addressed to it.
pub fn strip_mention(body: &str, username: &str) -> String {
    let mention = format!("u/{username} ");
    body.replace(&format!("/{mention}"), "")
        .replace(&mention, "")
        .trim()
        .to_string()
}

/// The pieces of a reply prompt, before they become a completion request.
#[derive(Debug, Clone)]
pub struct ReplyPrompt<'a> {
    /// Name the model answers as.
    pub persona: &'a str,
    /// Completes "<persona> is ...".
    pub description: &'a str,
    pub question: &'a str,
}

impl<'a> ReplyPrompt<'a> {
    pub fn new(persona: &'a str, description: &'a str, question: &'a str) -> Self {
        Self {
            persona,
            description,
            question,
        }
    }

    /// Dialogue-style prompt ending on the persona's turn.
    pub fn render(&self) -> String {
        format!(
            "{persona} is {description}.\n\nHuman: {question}\n{persona}:",
            persona = self.persona,
            description = self.description.trim_end_matches('.'),
            question = self.question,
        )
    }

    /// Cut generation off where the model would start a new speaker turn.
    pub fn stop_sequences(&self) -> Vec<String> {
        vec![
            "Human".to_string(),
            "Human:".to_string(),
            self.persona.to_string(),
            format!("{}:", self.persona),
        ]
    }

    /// Build and validate the completion request.
    pub fn into_request(self) -> Result<CompletionRequest, GenerationError> {
        if self.question.trim().is_empty() {
            return Err(GenerationError::InvalidRequest {
                reason: "question is empty after removing the mention".into(),
            });
        }
        if self.persona.trim().is_empty() {
            return Err(GenerationError::InvalidRequest {
                reason: "persona is empty".into(),
            });
        }

        let request = CompletionRequest::new(self.render())
            .with_max_tokens(MAX_TOKENS)
            .with_stop(self.stop_sequences())
            .with_sampling(TEMPERATURE, TOP_P)
            .with_penalties(FREQUENCY_PENALTY, PRESENCE_PENALTY);

        request.validate()?;
        Ok(request)
    }
}
