//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

pub const DEFAULT_AUTH_URL: &str = "https://www.reddit.com";
pub const DEFAULT_API_URL: &str = "https://oauth.reddit.com";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo-instruct";
pub const DEFAULT_PERSONA_DESCRIPTION: &str = "a philosopher";

const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_TOKEN_REFRESH_SECS: u64 = 86_400;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 60;

/// Static identity material for the bot account. Read-only at runtime.
#[derive(Debug, Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
    pub username: String,
    pub password: SecretString,
}

/// Where and how to reach the messaging platform.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Base URL of the token endpoint host.
    pub auth_url: String,
    /// Base URL for authenticated inbox and reply calls.
    pub api_url: String,
    pub user_agent: String,
    /// Per-request timeout applied to every platform call.
    pub http_timeout: Duration,
}

/// Text-completion backend settings and the reply persona.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
    /// Name the bot speaks as. Also used as a stop sequence.
    pub persona: String,
    /// Completes the sentence "<persona> is ...".
    pub persona_description: String,
    pub timeout: Duration,
}

/// Scheduling and dedup behaviour.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub poll_interval: Duration,
    pub token_refresh_interval: Duration,
    /// `None` keeps every seen id for the life of the process.
    pub seen_capacity: Option<usize>,
    /// Generate replies but never post them.
    pub dry_run: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            token_refresh_interval: Duration::from_secs(DEFAULT_TOKEN_REFRESH_SECS),
            seen_capacity: None,
            dry_run: false,
        }
    }
}

/// Complete bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub credentials: RedditCredentials,
    pub platform: PlatformConfig,
    pub generation: GenerationConfig,
    pub poll: PollConfig,
    /// When set, logs are also written to daily-rotated files here.
    pub log_dir: Option<PathBuf>,
}

impl BotConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let username = env.required("REDDIT_USERNAME")?;
        let credentials = RedditCredentials {
            client_id: env.required("REDDIT_CLIENT_ID")?,
            client_secret: SecretString::from(env.required("REDDIT_CLIENT_SECRET")?),
            password: SecretString::from(env.required("REDDIT_PASSWORD")?),
            username: username.clone(),
        };

        let platform = PlatformConfig {
            auth_url: env.url("REDDIT_AUTH_URL", DEFAULT_AUTH_URL),
            api_url: env.url("REDDIT_API_URL", DEFAULT_API_URL),
            user_agent: env.optional("REDDIT_USER_AGENT").unwrap_or_else(|| {
                format!(
                    "{}/{} (by u/{username})",
                    env!("CARGO_PKG_NAME"),
                    env!("CARGO_PKG_VERSION")
                )
            }),
            http_timeout: env.seconds("BOT_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
        };

        let generation = GenerationConfig {
            api_key: SecretString::from(env.required("OPENAI_API_KEY")?),
            base_url: env.url("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
            model: env
                .optional("OPENAI_MODEL")
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            persona: env.optional("BOT_PERSONA").unwrap_or_else(|| username.clone()),
            persona_description: env
                .optional("BOT_PERSONA_DESCRIPTION")
                .unwrap_or_else(|| DEFAULT_PERSONA_DESCRIPTION.to_string()),
            timeout: env.seconds("BOT_GENERATION_TIMEOUT_SECS", DEFAULT_GENERATION_TIMEOUT_SECS)?,
        };

        let seen_capacity = match env.optional("BOT_SEEN_CAPACITY") {
            None => None,
            Some(raw) => match raw.parse::<usize>() {
                Ok(0) | Err(_) => {
                    return Err(ConfigError::InvalidValue {
                        key: "BOT_SEEN_CAPACITY".into(),
                        message: format!("expected a positive integer, got {raw:?}"),
                    });
                }
                Ok(n) => Some(n),
            },
        };

        let poll = PollConfig {
            poll_interval: env.seconds("BOT_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?,
            token_refresh_interval: env
                .seconds("BOT_TOKEN_REFRESH_SECS", DEFAULT_TOKEN_REFRESH_SECS)?,
            seen_capacity,
            dry_run: env.flag("BOT_DRY_RUN")?,
        };

        Ok(Self {
            credentials,
            platform,
            generation,
            poll,
            log_dir: env.optional("BOT_LOG_DIR").map(PathBuf::from),
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-empty, trimmed value.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn url(&self, key: &str, default: &str) -> String {
        self.optional(key)
            .unwrap_or_else(|| default.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    /// Positive number of seconds. Zero would make a tokio interval panic.
    fn seconds(&self, key: &str, default: u64) -> Result<Duration, ConfigError> {
        let secs = match self.optional(key) {
            None => default,
            Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            })?,
        };
        if secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: "must be greater than zero".into(),
            });
        }
        Ok(Duration::from_secs(secs))
    }

    fn flag(&self, key: &str) -> Result<bool, ConfigError> {
        match self.optional(key).map(|v| v.to_ascii_lowercase()).as_deref() {
            None | Some("0" | "false" | "no" | "off") => Ok(false),
            Some("1" | "true" | "yes" | "on") => Ok(true),
            Some(other) => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected a boolean, got {other:?}"),
            }),
        }
    }
}
