//! OpenAI-compatible legacy completions client (`POST {base}/completions`).
//!
//! Written directly on `reqwest` in place of a `rig-core` adapter: rig only
//! speaks chat-style completions, and replies here need a raw prompt with stop
//! sequences, penalties and `best_of`.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::provider::{CompletionRequest, CompletionResponse, LlmProvider};
use crate::config::GenerationConfig;
use crate::error::{ConfigError, GenerationError};

const PROVIDER: &str = "openai";

/// Client for `/v1/completions` style endpoints.
pub struct OpenAiCompletions {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
}

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    stop: &'a [String],
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
    best_of: u32,
    n: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionReply {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    text: String,
}

impl OpenAiCompletions {
    pub fn new(config: &GenerationConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompletions {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, GenerationError> {
        request.validate()?;

        let body = CompletionBody {
            model: &self.model,
            prompt: &request.prompt,
            max_tokens: request.max_tokens,
            stop: &request.stop,
            temperature: request.temperature,
            top_p: request.top_p,
            frequency_penalty: request.frequency_penalty,
            presence_penalty: request.presence_penalty,
            best_of: request.best_of,
            n: 1,
        };

        let resp = self
            .client
            .post(format!("{}/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                provider: PROVIDER.to_string(),
                status,
                body,
            });
        }

        let reply: CompletionReply =
            resp.json().await.map_err(|e| GenerationError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(
            model = %self.model,
            choices = reply.choices.len(),
            "Completion received"
        );

        Ok(CompletionResponse {
            choices: reply.choices.into_iter().map(|c| c.text).collect(),
        })
    }
}
