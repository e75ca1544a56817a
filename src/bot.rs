//! The ingestion loop.
//!
//! Each comment walks the same path: thread-title filter, self-reply check,
//! misspelling match, already-handled check, then reply + mark + stats
//! update. [`Bot::run`] repeats poll cycles until shutdown is signalled,
//! sleeping according to its [`PollSchedule`], and persists stats on the way
//! out.

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::feed::{Comment, CommentFeed, FeedBatch, FeedError};
use crate::ledger::ProcessedLedger;
use crate::matcher::SpellingMatcher;
use crate::schedule::{CycleResult, PollSchedule};
use crate::stats::{CorrectionStats, StatsStore};

/// Pronunciation clip linked from every reply.
pub const PRONUNCIATION_URL: &str =
    "https://youtube.com/shorts/pocySXnRwl8?si=2a0UE1vqdANWHT6Q";

/// Build the reply posted for a misspelling.
pub fn render_reply(correct: &str, found: &str) -> String {
    format!(
        "👋 Just a quick heads‑up — I think you meant **{correct}**, not “{found}”. \
         \n\n---\n\n*^(If you want to know how to pronounce em-ber-mo's name \
         [here is a Youtube link]({PRONUNCIATION_URL}) of him saying it)*"
    )
}

/// What happened to a single comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentOutcome {
    /// The thread title did not contain the configured filter.
    FilteredByTitle,
    /// The bot wrote the comment itself.
    OwnComment,
    /// No misspelling (or the correct spelling was used).
    NoMisspelling,
    /// The comment was answered before.
    AlreadyHandled,
    /// A correction was posted.
    Corrected {
        /// The misspelling as written in the comment.
        misspelling: String,
    },
}

/// Summary of one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The feed had nothing new.
    CaughtUp,
    /// A batch was processed.
    Processed {
        /// Comments examined.
        seen: usize,
        /// Corrections posted.
        corrected: usize,
        /// Comments whose handling failed with a feed error.
        failed: usize,
    },
}

impl From<CycleOutcome> for CycleResult {
    fn from(outcome: CycleOutcome) -> Self {
        match outcome {
            CycleOutcome::CaughtUp => Self::CaughtUp,
            CycleOutcome::Processed { failed: 0, .. } => Self::Busy,
            CycleOutcome::Processed { .. } => Self::Failed,
        }
    }
}

/// The correction bot: a feed plus everything needed to answer it.
pub struct Bot<F> {
    feed: F,
    matcher: SpellingMatcher,
    store: StatsStore,
    stats: CorrectionStats,
    ledger: ProcessedLedger,
    schedule: PollSchedule,
    title_filter: Option<String>,
    identity: Option<String>,
}

impl<F: CommentFeed> Bot<F> {
    /// Assemble a bot. `stats` is usually `store.load()`.
    pub fn new(
        feed: F,
        matcher: SpellingMatcher,
        store: StatsStore,
        stats: CorrectionStats,
        ledger: ProcessedLedger,
    ) -> Self {
        Self {
            feed,
            matcher,
            store,
            stats,
            ledger,
            schedule: PollSchedule::default(),
            title_filter: None,
            identity: None,
        }
    }

    /// Use `schedule` for sleeps between cycles.
    pub fn with_schedule(mut self, schedule: PollSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Only consider threads whose title contains `filter` (case-insensitive).
    ///
    /// The filter is matched as given, surrounding spaces included; a blank
    /// filter disables filtering.
    pub fn with_title_filter(mut self, filter: Option<&str>) -> Self {
        self.title_filter = filter
            .filter(|f| !f.trim().is_empty())
            .map(str::to_lowercase);
        self
    }

    /// Current counters.
    pub fn stats(&self) -> &CorrectionStats {
        &self.stats
    }

    /// Answered-comment ledger.
    pub fn ledger(&self) -> &ProcessedLedger {
        &self.ledger
    }

    /// The underlying feed.
    pub fn feed(&self) -> &F {
        &self.feed
    }

    /// Consume the bot, returning its feed.
    pub fn into_feed(self) -> F {
        self.feed
    }

    /// The bot's own account name, lowercased and cached after first fetch.
    async fn identity(&mut self) -> Result<String, FeedError> {
        if let Some(name) = &self.identity {
            return Ok(name.clone());
        }
        let name = self.feed.current_identity().await?.to_lowercase();
        debug!(identity = %name, "resolved bot identity");
        self.identity = Some(name.clone());
        Ok(name)
    }

    /// Run one comment through filter, self-check, match, dedup, and reply.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError`] if the identity lookup or the reply fails. A
    /// failure to mark the comment on the platform after a successful reply
    /// is logged, not returned.
    pub async fn handle_comment(&mut self, comment: &Comment) -> Result<CommentOutcome, FeedError> {
        if let Some(filter) = &self.title_filter {
            let title = comment
                .submission_title
                .as_deref()
                .unwrap_or_default()
                .to_lowercase();
            if !title.contains(filter.as_str()) {
                return Ok(CommentOutcome::FilteredByTitle);
            }
        }

        if let Some(author) = &comment.author {
            let me = self.identity().await?;
            if author.to_lowercase() == me {
                return Ok(CommentOutcome::OwnComment);
            }
        }

        let Some(misspelling) = self.matcher.find_misspelling(&comment.body) else {
            return Ok(CommentOutcome::NoMisspelling);
        };

        if self.ledger.is_processed(&comment.id) {
            debug!(comment_id = %comment.id, "already answered");
            return Ok(CommentOutcome::AlreadyHandled);
        }

        let reply = render_reply(self.matcher.correct_name(), &misspelling);
        self.feed.reply(comment, &reply).await?;

        // The reply is out; from here on nothing may abort the bookkeeping.
        if let Err(e) = self.feed.mark_processed(comment).await {
            warn!(comment_id = %comment.id, error = %e, "failed to mark comment on platform");
        }
        self.ledger.mark(&comment.id);
        self.ledger.save();

        self.stats.record_correction(&misspelling);
        self.store.save(&self.stats);

        info!(
            misspelling = %misspelling,
            total_corrections = self.stats.total_corrections,
            comment_id = %comment.id,
            "corrected misspelling"
        );

        Ok(CommentOutcome::Corrected { misspelling })
    }

    /// Poll the feed once and handle every comment it returns.
    ///
    /// A comment that fails is logged and counted in
    /// [`CycleOutcome::Processed`]; the rest of the batch is still handled,
    /// since the feed will not deliver it again.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError`] if the batch itself cannot be fetched.
    pub async fn poll_cycle(&mut self) -> Result<CycleOutcome, FeedError> {
        let batch = self.feed.next_batch().await?;
        self.process_batch(batch, None).await
    }

    async fn process_batch(
        &mut self,
        batch: FeedBatch,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<CycleOutcome, FeedError> {
        let comments = match batch {
            FeedBatch::CaughtUp => return Ok(CycleOutcome::CaughtUp),
            FeedBatch::Comments(comments) => comments,
        };

        let mut seen: usize = 0;
        let mut corrected: usize = 0;
        let mut failed: usize = 0;
        for comment in &comments {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                debug!(remaining = comments.len().saturating_sub(seen), "shutdown requested mid-batch");
                break;
            }
            seen = seen.saturating_add(1);
            match self.handle_comment(comment).await {
                Ok(CommentOutcome::Corrected { .. }) => corrected = corrected.saturating_add(1),
                Ok(_) => {}
                Err(e) => {
                    warn!(comment_id = %comment.id, error = %e, "failed to handle comment");
                    failed = failed.saturating_add(1);
                }
            }
        }

        Ok(CycleOutcome::Processed {
            seen,
            corrected,
            failed,
        })
    }

    /// Poll until `shutdown` turns `true`, then persist and return.
    ///
    /// Errors never end the loop: they are logged and followed by the
    /// schedule's error backoff. Shutdown is observed while fetching,
    /// while sleeping, and between comments, but never in the middle of a
    /// reply. Dropping the sender also counts as shutdown.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.schedule.poll_interval().as_secs(),
            total_corrections = self.stats.total_corrections,
            "bot loop started"
        );

        loop {
            let fetched = tokio::select! {
                biased;
                () = wait_for_shutdown(&mut shutdown) => break,
                fetched = self.feed.next_batch() => fetched,
            };

            let result = match fetched {
                Ok(batch) => self.process_batch(batch, Some(&shutdown)).await,
                Err(e) => Err(e),
            };

            let cycle = match result {
                Ok(outcome) => {
                    let cycle = CycleResult::from(outcome);
                    if let CycleOutcome::Processed {
                        seen,
                        corrected,
                        failed,
                    } = outcome
                    {
                        debug!(seen, corrected, failed, "batch processed");
                    }
                    if cycle == CycleResult::Failed {
                        warn!(
                            backoff_secs = self.schedule.error_backoff().as_secs(),
                            "some comments failed, backing off"
                        );
                    }
                    cycle
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        backoff_secs = self.schedule.error_backoff().as_secs(),
                        "poll cycle failed, backing off"
                    );
                    CycleResult::Failed
                }
            };

            if *shutdown.borrow() {
                break;
            }

            let delay = self.schedule.delay_after(cycle);
            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    () = wait_for_shutdown(&mut shutdown) => break,
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }

        info!(
            total_corrections = self.stats.total_corrections,
            "shutting down, saving stats"
        );
        self.persist();
    }

    /// Save stats and the ledger (log-and-continue).
    pub fn persist(&self) {
        self.store.save(&self.stats);
        self.ledger.save();
    }
}

/// Resolve once `rx` holds `true` or its sender is gone.
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
