//! Shared fixtures for the ingestion loop tests.

#![allow(dead_code)]

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;

use mbeumo_bot::bot::Bot;
use mbeumo_bot::feed::{Comment, CommentFeed, FeedBatch, FeedError};
use mbeumo_bot::ledger::ProcessedLedger;
use mbeumo_bot::matcher::SpellingMatcher;
use mbeumo_bot::schedule::PollSchedule;
use mbeumo_bot::stats::{CorrectionStats, StatsStore};

/// Feed that replays scripted batches and records every write.
///
/// Once the script is exhausted every poll reports `CaughtUp`.
pub struct MockFeed {
    pub identity: String,
    pub script: VecDeque<Result<FeedBatch, FeedError>>,
    pub replies: Vec<(String, String)>,
    pub marked: Vec<String>,
    pub polls: Vec<Instant>,
    pub identity_calls: u32,
    pub fail_reply: bool,
    /// Comment ids whose reply is rejected with a rate-limit error.
    pub fail_reply_for: Vec<String>,
    pub fail_mark: bool,
    /// Raised right after the first successful reply.
    pub stop_after_reply: Option<watch::Sender<bool>>,
}

impl MockFeed {
    pub fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_owned(),
            script: VecDeque::new(),
            replies: Vec::new(),
            marked: Vec::new(),
            polls: Vec::new(),
            identity_calls: 0,
            fail_reply: false,
            fail_reply_for: Vec::new(),
            fail_mark: false,
            stop_after_reply: None,
        }
    }

    pub fn with_batch(mut self, comments: Vec<Comment>) -> Self {
        self.script.push_back(Ok(FeedBatch::Comments(comments)));
        self
    }

    pub fn with_caught_up(mut self) -> Self {
        self.script.push_back(Ok(FeedBatch::CaughtUp));
        self
    }

    pub fn with_error(mut self, message: &str) -> Self {
        self.script
            .push_back(Err(FeedError::Api(message.to_owned())));
        self
    }
}

#[async_trait]
impl CommentFeed for MockFeed {
    async fn current_identity(&mut self) -> Result<String, FeedError> {
        self.identity_calls = self.identity_calls.saturating_add(1);
        Ok(self.identity.clone())
    }

    async fn next_batch(&mut self) -> Result<FeedBatch, FeedError> {
        self.polls.push(Instant::now());
        self.script.pop_front().unwrap_or(Ok(FeedBatch::CaughtUp))
    }

    async fn reply(&mut self, comment: &Comment, text: &str) -> Result<(), FeedError> {
        if self.fail_reply || self.fail_reply_for.contains(&comment.id) {
            return Err(FeedError::Api("RATELIMIT".to_owned()));
        }
        self.replies.push((comment.id.clone(), text.to_owned()));
        if let Some(tx) = self.stop_after_reply.take() {
            let _ = tx.send(true);
        }
        Ok(())
    }

    async fn mark_processed(&mut self, comment: &Comment) -> Result<(), FeedError> {
        if self.fail_mark {
            return Err(FeedError::Api("save failed".to_owned()));
        }
        self.marked.push(comment.id.clone());
        Ok(())
    }
}

pub fn comment(id: &str, author: &str, body: &str, title: &str) -> Comment {
    Comment {
        id: id.to_owned(),
        author: Some(author.to_owned()),
        body: body.to_owned(),
        submission_title: Some(title.to_owned()),
        subreddit: "reddevils".to_owned(),
    }
}

/// Bot over `feed` with state files inside `dir`.
pub fn make_bot(feed: MockFeed, dir: &std::path::Path) -> Bot<MockFeed> {
    let store = StatsStore::new(dir.join("stats.json"));
    let ledger = ProcessedLedger::open(dir.join("processed.json"), 100);
    let matcher = SpellingMatcher::mbeumo().expect("builtin matcher");
    Bot::new(feed, matcher, store, CorrectionStats::fresh(), ledger)
        .with_schedule(PollSchedule::new(10, 60))
}
