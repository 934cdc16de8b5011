//! Error types for the inbox responder.
//!
//! Every runtime error is local to the refresh or poll cycle that raised it:
//! callers log it and carry on. Only [`ConfigError`] is fatal, at startup.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Post error: {0}")]
    Post(#[from] PostError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Token refresh failures.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Token request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Token endpoint returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Token grant rejected: {reason}")]
    Rejected { reason: String },

    #[error("Token response could not be decoded: {reason}")]
    Decode { reason: String },
}

/// Inbox retrieval failures.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Inbox request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Inbox endpoint returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Inbox listing could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Text-completion failures.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} returned {status}: {body}")]
    Status {
        provider: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Invalid completion request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Provider {provider} returned no usable completion")]
    EmptyCompletion { provider: String },

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),
}

/// Reply submission failures.
#[derive(Debug, thiserror::Error)]
pub enum PostError {
    #[error("Reply request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Reply endpoint returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Result type alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;
