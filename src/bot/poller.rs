//! Poll loop: fetch inbox, filter, generate, post, mark seen.
//!
//! Each tick is a self-contained unit of work run on a single task, so ticks
//! never overlap. Missed firings while a tick overruns are skipped, not
//! queued.
//!
//! Delivery is at-most-once: a message is marked seen after its reply
//! attempt whether generation and posting succeeded or not, so a failed
//! reply is dropped rather than risking a duplicate on a later tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::prompt::{ReplyPrompt, strip_mention};
use super::seen::SeenSet;
use crate::config::BotConfig;
use crate::error::{FetchError, GenerationError, Result};
use crate::llm::LlmProvider;
use crate::platform::{AccessToken, InboxMessage, RedditApi, TokenReader, comment_fullname};

/// Startup instant. Messages created at or before it are backlog and never
/// answered. Captured once; never re-evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessEpoch(DateTime<Utc>);

impl ProcessEpoch {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn at(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.0
    }

    /// Whether a message created at `created_utc` (epoch seconds) is new.
    pub fn admits(&self, created_utc: f64) -> bool {
        created_utc > self.0.timestamp() as f64
    }
}

/// Collaborators the poller drives.
pub struct PollerDeps {
    pub api: Arc<dyn RedditApi>,
    pub llm: Arc<dyn LlmProvider>,
    pub tokens: TokenReader,
}

/// Per-reply behaviour.
#[derive(Debug, Clone)]
pub struct ReplySettings {
    /// Bot account name, stripped from incoming mentions.
    pub username: String,
    pub persona: String,
    pub persona_description: String,
    pub generation_timeout: Duration,
    pub dry_run: bool,
}

impl ReplySettings {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            username: config.credentials.username.clone(),
            persona: config.generation.persona.clone(),
            persona_description: config.generation.persona_description.clone(),
            generation_timeout: config.generation.timeout,
            dry_run: config.poll.dry_run,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Actionable entries in the fetched page.
    pub fetched: usize,
    /// Created at or before the process epoch.
    pub backlog: usize,
    pub already_seen: usize,
    pub replied: usize,
    /// Reply attempts that failed in generation or posting.
    pub failed: usize,
}

pub struct Poller {
    deps: PollerDeps,
    settings: ReplySettings,
    seen: SeenSet,
    epoch: ProcessEpoch,
}

impl Poller {
    pub fn new(
        deps: PollerDeps,
        settings: ReplySettings,
        seen: SeenSet,
        epoch: ProcessEpoch,
    ) -> Self {
        Self {
            deps,
            settings,
            seen,
            epoch,
        }
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    pub fn epoch(&self) -> ProcessEpoch {
        self.epoch
    }

    /// Run one poll cycle.
    ///
    /// A fetch failure aborts the tick before any state changes.
    pub async fn tick(&mut self) -> Result<TickReport, FetchError> {
        let token = self.deps.tokens.current();
        if token.is_empty() {
            debug!("No access token yet; fetching anyway");
        }

        let messages = self.deps.api.fetch_inbox(&token).await?;
        let mut report = TickReport {
            fetched: messages.len(),
            ..TickReport::default()
        };

        for message in messages {
            if !self.epoch.admits(message.created_utc) {
                report.backlog += 1;
                continue;
            }
            if self.seen.contains(&message.id) {
                report.already_seen += 1;
                continue;
            }

            match self.reply_to(&token, &message).await {
                Ok(()) => report.replied += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        message_id = %message.id,
                        kind = %message.kind,
                        author = %message.author,
                        error = %e,
                        "Reply failed; message will not be retried"
                    );
                }
            }

            self.seen.insert(message.id);
        }

        Ok(report)
    }

    async fn reply_to(&self, token: &AccessToken, message: &InboxMessage) -> Result<()> {
        let question = strip_mention(&message.body, &self.settings.username);
        debug!(
            message_id = %message.id,
            kind = %message.kind,
            subject = message.subject.as_deref().unwrap_or(""),
            "Generating reply"
        );
        let request = ReplyPrompt::new(
            &self.settings.persona,
            &self.settings.persona_description,
            &question,
        )
        .into_request()?;

        let timeout = self.settings.generation_timeout;
        let response = tokio::time::timeout(timeout, self.deps.llm.complete(request))
            .await
            .map_err(|_| GenerationError::Timeout(timeout))??;

        let text = response
            .first_text()
            .ok_or_else(|| GenerationError::EmptyCompletion {
                provider: self.deps.llm.model_name().to_string(),
            })?;

        if self.settings.dry_run {
            info!(
                message_id = %message.id,
                thing_id = %comment_fullname(&message.id),
                reply = %text,
                "Dry run: reply not posted"
            );
            return Ok(());
        }

        self.deps.api.post_reply(token, &message.id, text).await?;

        info!(
            message_id = %message.id,
            kind = %message.kind,
            author = %message.author,
            reply_len = text.len(),
            "Replied"
        );
        Ok(())
    }
}

/// Spawn the poll loop on its own task.
///
/// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop polling.
pub fn spawn_poller(mut poller: Poller, interval: Duration) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            epoch = %poller.epoch().instant(),
            "Inbox poller started, polling every {}s",
            interval.as_secs()
        );

        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Inbox poller shutting down");
                return;
            }

            match poller.tick().await {
                Ok(report) if report.replied > 0 || report.failed > 0 => {
                    info!(
                        fetched = report.fetched,
                        replied = report.replied,
                        failed = report.failed,
                        seen = poller.seen().len(),
                        "Poll tick complete"
                    );
                }
                Ok(report) => {
                    debug!(
                        fetched = report.fetched,
                        backlog = report.backlog,
                        already_seen = report.already_seen,
                        "Nothing new in inbox"
                    );
                }
                Err(e) => error!("Inbox fetch failed: {e}"),
            }
        }
    });

    (handle, shutdown_flag)
}
