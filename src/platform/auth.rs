//! Access token lifecycle.
//!
//! The token lives in a `watch` cell: the [`TokenManager`] is the only
//! writer, poll ticks read it through a [`TokenReader`]. A read returns
//! either the empty initial token or a value from a completed refresh,
//! never a partial write.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{RedditClient, TokenGrant, truncate_body};
use crate::error::AuthError;

/// Opaque bearer token. Empty until the first refresh succeeds.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AccessToken(Arc<str>);

impl AccessToken {
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("AccessToken(<empty>)")
        } else {
            f.write_str("AccessToken(<redacted>)")
        }
    }
}

/// Owns the current token and refreshes it on demand.
pub struct TokenManager {
    grant: Arc<dyn TokenGrant>,
    current: watch::Sender<AccessToken>,
}

impl TokenManager {
    pub fn new(grant: Arc<dyn TokenGrant>) -> Self {
        let (current, _rx) = watch::channel(AccessToken::default());
        Self { grant, current }
    }

    /// A cheap handle for reading the latest token.
    pub fn reader(&self) -> TokenReader {
        TokenReader(self.current.subscribe())
    }

    /// Request a new token and publish it.
    ///
    /// On failure the previously published token stays in place.
    pub async fn refresh(&self) -> Result<AccessToken, AuthError> {
        let token = self.grant.request_token().await?;
        self.current.send_replace(token.clone());
        Ok(token)
    }
}

/// Read side of the token cell.
#[derive(Clone)]
pub struct TokenReader(watch::Receiver<AccessToken>);

impl TokenReader {
    pub fn current(&self) -> AccessToken {
        self.0.borrow().clone()
    }
}

/// Spawn a background task that refreshes the token every `interval`.
///
/// The first refresh runs immediately. Returns a `JoinHandle` and a
/// shutdown flag.
pub fn spawn_token_refresher(
    manager: Arc<TokenManager>,
    interval: Duration,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!("Token refresher started, refreshing every {}s", interval.as_secs());

        let mut tick = tokio::time::interval(interval);

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Token refresher shutting down");
                return;
            }

            match manager.refresh().await {
                Ok(_) => info!("Access token refreshed"),
                Err(e) => warn!(error = %e, "Token refresh failed; keeping previous token"),
            }
        }
    });

    (handle, shutdown_flag)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    /// A string like `invalid_grant`, or a numeric status on 401 bodies.
    error: Option<serde_json::Value>,
}

impl RedditClient {
    /// Password grant against `{auth_url}/api/v1/access_token`.
    pub(crate) async fn password_grant(&self) -> Result<AccessToken, AuthError> {
        let resp = self
            .client
            .post(self.auth_url("/api/v1/access_token"))
            .basic_auth(
                &self.credentials.client_id,
                Some(self.credentials.client_secret.expose_secret()),
            )
            .form(&[
                ("grant_type", "password"),
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.expose_secret()),
            ])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(AuthError::Status {
                status,
                body: truncate_body(&body),
            });
        }

        parse_token_response(&body)
    }
}

fn parse_token_response(body: &str) -> Result<AccessToken, AuthError> {
    let resp: TokenResponse = serde_json::from_str(body).map_err(|e| AuthError::Decode {
        reason: e.to_string(),
    })?;

    if let Some(error) = resp.error {
        let reason = match error {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        return Err(AuthError::Rejected { reason });
    }

    match resp.access_token {
        Some(token) if !token.is_empty() => Ok(AccessToken::new(token)),
        _ => Err(AuthError::Decode {
            reason: "response has no access_token".into(),
        }),
    }
}
