//! Messaging platform client: OAuth token grant, inbox listing, replies.
//!
//! [`RedditClient`] owns one `reqwest::Client` with a request timeout, so no
//! platform call can stall the poll loop indefinitely. The poll loop and the
//! token refresher only see the [`RedditApi`] and [`TokenGrant`] traits.

pub mod auth;
pub mod inbox;
pub mod reply;

pub use auth::{AccessToken, TokenManager, TokenReader, spawn_token_refresher};
pub use inbox::InboxMessage;
pub use reply::comment_fullname;

use async_trait::async_trait;

use crate::config::{PlatformConfig, RedditCredentials};
use crate::error::{AuthError, ConfigError, FetchError, PostError};

/// Longest error body kept in an error value.
const MAX_ERROR_BODY: usize = 200;

/// Exchanges static credentials for a fresh access token.
#[async_trait]
pub trait TokenGrant: Send + Sync {
    async fn request_token(&self) -> Result<AccessToken, AuthError>;
}

/// Authenticated inbox operations used by the poll loop.
#[async_trait]
pub trait RedditApi: Send + Sync {
    /// Current inbox page, in feed order.
    async fn fetch_inbox(&self, token: &AccessToken) -> Result<Vec<InboxMessage>, FetchError>;

    /// Reply to the message with the given (unprefixed) id.
    async fn post_reply(
        &self,
        token: &AccessToken,
        message_id: &str,
        text: &str,
    ) -> Result<(), PostError>;
}

/// HTTP client for the platform's OAuth API.
pub struct RedditClient {
    client: reqwest::Client,
    credentials: RedditCredentials,
    config: PlatformConfig,
}

impl RedditClient {
    pub fn new(
        credentials: RedditCredentials,
        config: PlatformConfig,
    ) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self {
            client,
            credentials,
            config,
        })
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}{path}", self.config.auth_url)
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url)
    }
}

#[async_trait]
impl TokenGrant for RedditClient {
    async fn request_token(&self) -> Result<AccessToken, AuthError> {
        self.password_grant().await
    }
}

#[async_trait]
impl RedditApi for RedditClient {
    async fn fetch_inbox(&self, token: &AccessToken) -> Result<Vec<InboxMessage>, FetchError> {
        self.inbox(token).await
    }

    async fn post_reply(
        &self,
        token: &AccessToken,
        message_id: &str,
        text: &str,
    ) -> Result<(), PostError> {
        self.comment(token, message_id, text).await
    }
}

/// The platform expects a lowercase `bearer` scheme.
fn bearer(token: &AccessToken) -> String {
    format!("bearer {}", token.as_str())
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
pub(crate) fn test_client(base_url: &str) -> RedditClient {
    use std::time::Duration;

    use secrecy::SecretString;

    RedditClient::new(
        RedditCredentials {
            client_id: "id".into(),
            client_secret: SecretString::from("secret"),
            username: "SocratesBot".into(),
            password: SecretString::from("hunter2"),
        },
        PlatformConfig {
            auth_url: base_url.to_string(),
            api_url: base_url.to_string(),
            user_agent: "inbox-responder-tests/0.1".into(),
            http_timeout: Duration::from_secs(5),
        },
    )
    .unwrap()
}
