//! Integration tests for the poll loop.
//!
//! The platform and the completion backend are replaced by in-memory stubs
//! that record every call, so each test can assert exactly what was fetched,
//! generated and posted.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use inbox_responder::bot::{
    Poller, PollerDeps, ProcessEpoch, ReplySettings, SeenSet, TickReport, spawn_poller,
};
use inbox_responder::error::{AuthError, FetchError, GenerationError, PostError};
use inbox_responder::llm::{CompletionRequest, CompletionResponse, LlmProvider};
use inbox_responder::platform::{
    AccessToken, InboxMessage, RedditApi, TokenGrant, TokenManager, TokenReader,
};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const BOT: &str = "Bot";

// ── Stubs ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct PostedReply {
    token: String,
    message_id: String,
    text: String,
}

/// In-memory inbox. Serves `feed` on every fetch unless told to fail.
#[derive(Default)]
struct StubInbox {
    feed: Mutex<Vec<InboxMessage>>,
    /// Serve one brand-new message per fetch instead of `feed`.
    fresh_per_fetch: AtomicBool,
    fail_fetch: AtomicBool,
    fail_post: AtomicBool,
    fetches: AtomicUsize,
    fetch_tokens: Mutex<Vec<String>>,
    posts: Mutex<Vec<PostedReply>>,
}

impl StubInbox {
    fn with_feed(feed: Vec<InboxMessage>) -> Arc<Self> {
        Arc::new(Self {
            feed: Mutex::new(feed),
            ..Self::default()
        })
    }

    fn posts(&self) -> Vec<PostedReply> {
        self.posts.lock().unwrap().clone()
    }

    fn fetch_tokens(&self) -> Vec<String> {
        self.fetch_tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl RedditApi for StubInbox {
    async fn fetch_inbox(&self, token: &AccessToken) -> Result<Vec<InboxMessage>, FetchError> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst);
        self.fetch_tokens
            .lock()
            .unwrap()
            .push(token.as_str().to_string());

        if self.fail_fetch.load(Ordering::SeqCst) {
            // A real transport failure: nothing listens on port 1.
            let err = reqwest::Client::new()
                .get("http://127.0.0.1:1/message/inbox.json")
                .send()
                .await
                .unwrap_err();
            return Err(FetchError::Request(err));
        }

        if self.fresh_per_fetch.load(Ordering::SeqCst) {
            return Ok(vec![message(&format!("m{n}"), "u/Bot hello?", future())]);
        }

        Ok(self.feed.lock().unwrap().clone())
    }

    async fn post_reply(
        &self,
        token: &AccessToken,
        message_id: &str,
        text: &str,
    ) -> Result<(), PostError> {
        self.posts.lock().unwrap().push(PostedReply {
            token: token.as_str().to_string(),
            message_id: message_id.to_string(),
            text: text.to_string(),
        });

        if self.fail_post.load(Ordering::SeqCst) {
            return Err(PostError::Status {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                body: "try again later".into(),
            });
        }
        Ok(())
    }
}

/// Completion stub that records prompts and tracks concurrent calls.
struct StubLlm {
    reply: String,
    delay: Duration,
    fail: AtomicBool,
    prompts: Mutex<Vec<CompletionRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubLlm {
    fn replying(reply: &str) -> Arc<Self> {
        Self::slow(reply, Duration::ZERO)
    }

    fn slow(reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            delay,
            fail: AtomicBool::new(false),
            prompts: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn prompts(&self) -> Vec<CompletionRequest> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, GenerationError> {
        self.prompts.lock().unwrap().push(request);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(GenerationError::RequestFailed {
                provider: "stub".into(),
                reason: "backend unavailable".into(),
            });
        }

        Ok(CompletionResponse {
            choices: vec![format!(" {}", self.reply), "ignored".into()],
        })
    }
}

/// Token grant returning scripted results in order, repeating the last.
struct ScriptedGrant(Mutex<Vec<Result<&'static str, &'static str>>>);

impl ScriptedGrant {
    fn new(results: Vec<Result<&'static str, &'static str>>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(results)))
    }
}

#[async_trait]
impl TokenGrant for ScriptedGrant {
    async fn request_token(&self) -> Result<AccessToken, AuthError> {
        let mut results = self.0.lock().unwrap();
        let next = if results.len() > 1 {
            results.remove(0)
        } else {
            results[0]
        };
        next.map(AccessToken::new)
            .map_err(|reason| AuthError::Rejected {
                reason: reason.into(),
            })
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn epoch() -> ProcessEpoch {
    ProcessEpoch::now()
}

/// A creation time safely after any epoch taken by this test.
fn future() -> f64 {
    ProcessEpoch::now().instant().timestamp() as f64 + 60.0
}

fn message(id: &str, body: &str, created_utc: f64) -> InboxMessage {
    InboxMessage {
        id: id.to_string(),
        kind: "t1".to_string(),
        author: "curious_george".to_string(),
        subject: Some("username mention".to_string()),
        body: body.to_string(),
        created_utc,
    }
}

fn settings() -> ReplySettings {
    ReplySettings {
        username: BOT.to_string(),
        persona: BOT.to_string(),
        persona_description: "a philosopher".to_string(),
        generation_timeout: Duration::from_secs(2),
        dry_run: false,
    }
}

async fn token_reader(token: &'static str) -> (Arc<TokenManager>, TokenReader) {
    let manager = Arc::new(TokenManager::new(ScriptedGrant::new(vec![Ok(token)])));
    manager.refresh().await.unwrap();
    let reader = manager.reader();
    (manager, reader)
}

fn poller(
    inbox: &Arc<StubInbox>,
    llm: &Arc<StubLlm>,
    tokens: TokenReader,
    settings: ReplySettings,
    epoch: ProcessEpoch,
) -> Poller {
    Poller::new(
        PollerDeps {
            api: inbox.clone(),
            llm: llm.clone(),
            tokens,
        },
        settings,
        SeenSet::new(),
        epoch,
    )
}

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn new_mention_is_answered_with_mention_stripped() {
    timeout(TEST_TIMEOUT, async {
        let epoch = epoch();
        let inbox = StubInbox::with_feed(vec![message("abc", "u/Bot what is truth?", future())]);
        let llm = StubLlm::replying("Truth is what survives the question.");
        let (_tokens, reader) = token_reader("tok-1").await;
        let mut poller = poller(&inbox, &llm, reader, settings(), epoch);

        let report = poller.tick().await.unwrap();

        assert_eq!(
            report,
            TickReport {
                fetched: 1,
                replied: 1,
                ..TickReport::default()
            }
        );

        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].prompt.contains("Human: what is truth?\n"));
        assert!(!prompts[0].prompt.contains("u/Bot"));
        assert_eq!(prompts[0].stop, vec!["Human", "Human:", "Bot", "Bot:"]);

        assert_eq!(
            inbox.posts(),
            vec![PostedReply {
                token: "tok-1".into(),
                message_id: "abc".into(),
                text: "Truth is what survives the question.".into(),
            }]
        );
        assert!(poller.seen().contains("abc"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn same_message_next_tick_is_not_answered_again() {
    timeout(TEST_TIMEOUT, async {
        let inbox = StubInbox::with_feed(vec![message("abc", "u/Bot what is truth?", future())]);
        let llm = StubLlm::replying("An answer.");
        let (_tokens, reader) = token_reader("tok").await;
        let mut poller = poller(&inbox, &llm, reader, settings(), epoch());

        poller.tick().await.unwrap();
        let second = poller.tick().await.unwrap();

        assert_eq!(second.already_seen, 1);
        assert_eq!(second.replied, 0);
        assert_eq!(llm.calls(), 1);
        assert_eq!(inbox.posts().len(), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn fetch_failure_changes_nothing_and_next_tick_recovers() {
    timeout(TEST_TIMEOUT, async {
        let inbox = StubInbox::with_feed(vec![message("abc", "u/Bot why?", future())]);
        let llm = StubLlm::replying("Because.");
        let (_tokens, reader) = token_reader("tok").await;
        let mut poller = poller(&inbox, &llm, reader, settings(), epoch());

        inbox.fail_fetch.store(true, Ordering::SeqCst);
        let err = poller.tick().await.unwrap_err();
        assert!(matches!(err, FetchError::Request(_)));
        assert!(poller.seen().is_empty());
        assert_eq!(llm.calls(), 0);
        assert!(inbox.posts().is_empty());

        inbox.fail_fetch.store(false, Ordering::SeqCst);
        let report = poller.tick().await.unwrap();
        assert_eq!(report.replied, 1);
        assert!(poller.seen().contains("abc"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn failed_refresh_keeps_prior_token_for_polls() {
    timeout(TEST_TIMEOUT, async {
        let inbox = StubInbox::with_feed(Vec::new());
        let llm = StubLlm::replying("unused");

        // Bad credentials from the start: polls run with the empty token.
        let never = Arc::new(TokenManager::new(ScriptedGrant::new(vec![Err(
            "invalid_grant",
        )])));
        assert!(never.refresh().await.is_err());
        let mut cold = poller(&inbox, &llm, never.reader(), settings(), epoch());
        cold.tick().await.unwrap();

        // A good token followed by a failing refresh: the good one stays.
        let manager = Arc::new(TokenManager::new(ScriptedGrant::new(vec![
            Ok("good"),
            Err("invalid_grant"),
        ])));
        let mut warm = poller(&inbox, &llm, manager.reader(), settings(), epoch());
        manager.refresh().await.unwrap();
        warm.tick().await.unwrap();
        assert!(manager.refresh().await.is_err());
        warm.tick().await.unwrap();

        assert_eq!(inbox.fetch_tokens(), vec!["", "good", "good"]);
    })
    .await
    .expect("test timed out");
}

// ── Properties ──────────────────────────────────────────────────────

#[tokio::test]
async fn backlog_is_never_answered() {
    timeout(TEST_TIMEOUT, async {
        let epoch = epoch();
        let at_start = epoch.instant().timestamp() as f64;
        let inbox = StubInbox::with_feed(vec![
            message("old", "u/Bot ancient question", at_start - 3600.0),
            message("edge", "u/Bot created at start", at_start),
            message("undated", "u/Bot no timestamp", 0.0),
        ]);
        let llm = StubLlm::replying("nope");
        let (_tokens, reader) = token_reader("tok").await;
        let mut poller = poller(&inbox, &llm, reader, settings(), epoch);

        for _ in 0..3 {
            let report = poller.tick().await.unwrap();
            assert_eq!(report.backlog, 3);
        }

        assert_eq!(llm.calls(), 0);
        assert!(inbox.posts().is_empty());
        // Backlog is filtered before dedup, so it is never recorded.
        assert!(poller.seen().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn failed_post_still_marks_seen() {
    timeout(TEST_TIMEOUT, async {
        let inbox = StubInbox::with_feed(vec![message("abc", "u/Bot why?", future())]);
        inbox.fail_post.store(true, Ordering::SeqCst);
        let llm = StubLlm::replying("Because.");
        let (_tokens, reader) = token_reader("tok").await;
        let mut poller = poller(&inbox, &llm, reader, settings(), epoch());

        let first = poller.tick().await.unwrap();
        assert_eq!(first.failed, 1);
        assert!(poller.seen().contains("abc"));

        // At most once: the platform recovering does not bring it back.
        inbox.fail_post.store(false, Ordering::SeqCst);
        let second = poller.tick().await.unwrap();
        assert_eq!(second.already_seen, 1);
        assert_eq!(inbox.posts().len(), 1);
        assert_eq!(llm.calls(), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn generation_failure_skips_post_and_marks_seen() {
    timeout(TEST_TIMEOUT, async {
        let inbox = StubInbox::with_feed(vec![
            message("a", "u/Bot first?", future()),
            message("b", "u/Bot second?", future()),
        ]);
        let llm = StubLlm::replying("Answer.");
        llm.fail.store(true, Ordering::SeqCst);
        let (_tokens, reader) = token_reader("tok").await;
        let mut poller = poller(&inbox, &llm, reader, settings(), epoch());

        let report = poller.tick().await.unwrap();

        assert_eq!(report.failed, 2);
        assert_eq!(llm.calls(), 2);
        assert!(inbox.posts().is_empty());
        assert!(poller.seen().contains("a"));
        assert!(poller.seen().contains("b"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn slow_generation_times_out_and_later_messages_still_run() {
    timeout(TEST_TIMEOUT, async {
        let inbox = StubInbox::with_feed(vec![
            message("slow", "u/Bot first?", future()),
            message("next", "u/Bot second?", future()),
        ]);
        let llm = StubLlm::slow("Answer.", Duration::from_millis(300));
        let (_tokens, reader) = token_reader("tok").await;
        let mut settings = settings();
        settings.generation_timeout = Duration::from_millis(50);
        let mut poller = poller(&inbox, &llm, reader, settings, epoch());

        let report = poller.tick().await.unwrap();

        assert_eq!(report.failed, 2);
        assert_eq!(llm.calls(), 2);
        assert!(inbox.posts().is_empty());
        assert_eq!(poller.seen().len(), 2);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn messages_handled_in_feed_order() {
    timeout(TEST_TIMEOUT, async {
        let inbox = StubInbox::with_feed(vec![
            message("z", "u/Bot one", future()),
            message("a", "u/Bot two", future()),
            message("m", "u/Bot three", future()),
        ]);
        let llm = StubLlm::replying("ok");
        let (_tokens, reader) = token_reader("tok").await;
        let mut poller = poller(&inbox, &llm, reader, settings(), epoch());

        poller.tick().await.unwrap();

        let order: Vec<String> = inbox.posts().into_iter().map(|p| p.message_id).collect();
        assert_eq!(order, vec!["z", "a", "m"]);
        assert_eq!(llm.max_in_flight.load(Ordering::SeqCst), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn bare_mention_is_not_sent_to_generator() {
    timeout(TEST_TIMEOUT, async {
        let inbox = StubInbox::with_feed(vec![message("abc", "u/Bot ", future())]);
        let llm = StubLlm::replying("unused");
        let (_tokens, reader) = token_reader("tok").await;
        let mut poller = poller(&inbox, &llm, reader, settings(), epoch());

        let report = poller.tick().await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(llm.calls(), 0);
        assert!(poller.seen().contains("abc"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn dry_run_generates_but_never_posts() {
    timeout(TEST_TIMEOUT, async {
        let inbox = StubInbox::with_feed(vec![message("abc", "u/Bot why?", future())]);
        let llm = StubLlm::replying("Because.");
        let (_tokens, reader) = token_reader("tok").await;
        let mut settings = settings();
        settings.dry_run = true;
        let mut poller = poller(&inbox, &llm, reader, settings, epoch());

        let report = poller.tick().await.unwrap();

        assert_eq!(report.replied, 1);
        assert_eq!(llm.calls(), 1);
        assert!(inbox.posts().is_empty());
        assert!(poller.seen().contains("abc"));
    })
    .await
    .expect("test timed out");
}

// ── Scheduling ──────────────────────────────────────────────────────

#[tokio::test]
async fn overrunning_ticks_never_overlap() {
    let inbox = StubInbox::with_feed(Vec::new());
    inbox.fresh_per_fetch.store(true, Ordering::SeqCst);
    // Each tick takes ~80ms against a 10ms interval.
    let llm = StubLlm::slow("ok", Duration::from_millis(80));
    let (_tokens, reader) = token_reader("tok").await;
    let poller = poller(&inbox, &llm, reader, settings(), epoch());

    let (handle, shutdown) = spawn_poller(poller, Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(400)).await;
    shutdown.store(true, Ordering::Relaxed);
    handle.abort();

    let fetches = inbox.fetches.load(Ordering::SeqCst);
    assert_eq!(llm.max_in_flight.load(Ordering::SeqCst), 1);
    assert!(fetches >= 2, "poller made too little progress: {fetches}");
    // Missed firings are dropped, so fetches track work done, not elapsed intervals.
    assert!(fetches <= 8, "ticks piled up: {fetches}");
}

#[tokio::test]
async fn shutdown_flag_stops_poller() {
    let inbox = StubInbox::with_feed(Vec::new());
    let llm = StubLlm::replying("unused");
    let (_tokens, reader) = token_reader("tok").await;
    let poller = poller(&inbox, &llm, reader, settings(), epoch());

    let (handle, shutdown) = spawn_poller(poller, Duration::from_millis(10));
    shutdown.store(true, Ordering::Relaxed);

    timeout(TEST_TIMEOUT, handle)
        .await
        .expect("poller did not stop")
        .expect("poller task panicked");
}
