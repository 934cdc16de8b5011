use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use inbox_responder::bot::{
    Poller, PollerDeps, ProcessEpoch, ReplySettings, SeenSet, spawn_poller,
};
use inbox_responder::config::BotConfig;
use inbox_responder::llm::create_provider;
use inbox_responder::platform::{RedditClient, TokenManager, spawn_token_refresher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Backlog cutoff: nothing created before this instant is answered.
    let epoch = ProcessEpoch::now();

    let config = BotConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export REDDIT_CLIENT_ID=... REDDIT_CLIENT_SECRET=... \\");
        eprintln!("         REDDIT_USERNAME=... REDDIT_PASSWORD=... OPENAI_API_KEY=...");
        std::process::exit(1);
    });

    let _log_guard = init_tracing(config.log_dir.as_deref())?;

    eprintln!("📬 Inbox responder v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Account: u/{}", config.credentials.username);
    eprintln!("   Persona: {}", config.generation.persona);
    eprintln!("   Model: {}", config.generation.model);
    eprintln!("   Poll every: {}s", config.poll.poll_interval.as_secs());
    eprintln!(
        "   Token refresh every: {}s",
        config.poll.token_refresh_interval.as_secs()
    );
    match config.poll.seen_capacity {
        Some(n) => eprintln!("   Seen set: bounded ({n} ids)"),
        None => eprintln!("   Seen set: unbounded"),
    }
    if config.poll.dry_run {
        eprintln!("   Dry run: replies are generated but not posted");
    }
    eprintln!();

    let reddit = Arc::new(RedditClient::new(
        config.credentials.clone(),
        config.platform.clone(),
    )?);
    let tokens = Arc::new(TokenManager::new(reddit.clone()));
    let llm = create_provider(&config.generation)?;

    let poller = Poller::new(
        PollerDeps {
            api: reddit,
            llm,
            tokens: tokens.reader(),
        },
        ReplySettings::from_config(&config),
        SeenSet::from_capacity(config.poll.seen_capacity),
        epoch,
    );

    let (refresh_handle, refresh_shutdown) =
        spawn_token_refresher(tokens, config.poll.token_refresh_interval);
    let (poll_handle, poll_shutdown) = spawn_poller(poller, config.poll.poll_interval);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    refresh_shutdown.store(true, Ordering::Relaxed);
    poll_shutdown.store(true, Ordering::Relaxed);
    // In-flight HTTP calls are abandoned.
    refresh_handle.abort();
    poll_handle.abort();

    Ok(())
}

/// Console logging, plus daily-rotated files when `log_dir` is set.
///
/// The returned guard flushes the file writer on drop.
fn init_tracing(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "inbox-responder.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    Ok(guard)
}
