//! mbeumo-bot CLI entry point.
//!
//! Provides `start` (the default), `check`, and `stats` subcommands for running
//! the bot, dry-running the matcher on a piece of text, or printing the
//! persisted counters.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use mbeumo_bot::bot::{render_reply, Bot};
use mbeumo_bot::config::BotConfig;
use mbeumo_bot::credentials::{load_dotenv, RedditCredentials};
use mbeumo_bot::feed::reddit::RedditFeed;
use mbeumo_bot::ledger::ProcessedLedger;
use mbeumo_bot::logging;
use mbeumo_bot::matcher::SpellingMatcher;
use mbeumo_bot::stats::StatsStore;

/// mbeumo-bot: corrects misspellings of Bryan Mbeumo's name on Reddit.
#[derive(Parser)]
#[command(name = "mbeumo-bot", version, about)]
struct Cli {
    /// Subcommand to execute (defaults to `start`).
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the bot until SIGINT/SIGTERM.
    Start,
    /// Print the reply the bot would post for TEXT, if any.
    Check {
        /// Text to scan.
        text: String,
    },
    /// Print the persisted correction stats as JSON.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    load_dotenv(None)?;
    let config = BotConfig::load().context("failed to load configuration")?;

    match cli.command.unwrap_or(Command::Start) {
        Command::Start => handle_start(config).await,
        Command::Check { text } => handle_check(&config, &text),
        Command::Stats => handle_stats(&config),
    }
}

/// Run the bot loop.
async fn handle_start(config: BotConfig) -> anyhow::Result<()> {
    let _logging_guard = match &config.paths.logs_dir {
        Some(dir) => Some(logging::init_production(dir, &config.log.level)?),
        None => {
            logging::init_cli(&config.log.level);
            None
        }
    };
    config.log_notices();

    let credentials =
        RedditCredentials::from_env().context("reddit credentials are incomplete")?;
    let matcher = SpellingMatcher::mbeumo().context("failed to build misspelling matcher")?;

    let store = StatsStore::new(&config.paths.stats_file);
    let stats = store.load();
    let ledger = ProcessedLedger::open(config.ledger_path(), config.bot.ledger_capacity);

    let subreddits = config.subreddit_subscription();
    let user_agent = credentials.user_agent(&config.reddit.user_agent_repo);
    let feed = RedditFeed::new(credentials, subreddits.clone(), &user_agent)
        .context("failed to create Reddit client")?;

    let schedule = config.schedule();
    info!(
        subreddits = %subreddits,
        poll_interval_secs = schedule.poll_interval().as_secs(),
        title_filter = ?config.title_filter(),
        stats = %store.path().display(),
        total_corrections = stats.total_corrections,
        "watching r/{subreddits}"
    );

    let mut bot = Bot::new(feed, matcher, store, stats, ledger)
        .with_schedule(schedule)
        .with_title_filter(config.title_filter());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    bot.run(shutdown_rx).await;
    info!("mbeumo-bot shut down cleanly");
    Ok(())
}

/// Dry-run the matcher on `text`.
fn handle_check(config: &BotConfig, text: &str) -> anyhow::Result<()> {
    logging::init_cli(&config.log.level);
    config.log_notices();
    let matcher = SpellingMatcher::mbeumo().context("failed to build misspelling matcher")?;

    match matcher.find_misspelling(text) {
        Some(found) => {
            println!("found: {found}");
            println!();
            println!("{}", render_reply(matcher.correct_name(), &found));
        }
        None => println!("no misspelling found"),
    }
    Ok(())
}

/// Print persisted stats (fresh defaults if the file is missing or corrupt).
fn handle_stats(config: &BotConfig) -> anyhow::Result<()> {
    logging::init_cli(&config.log.level);
    config.log_notices();
    let stats = StatsStore::new(&config.paths.stats_file).load();
    let json = serde_json::to_string_pretty(&stats).context("failed to serialize stats")?;
    println!("{json}");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
