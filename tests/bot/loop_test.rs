//! Tests for `src/bot.rs`: per-comment states and the poll loop.

use std::time::Duration;

use tokio::sync::watch;

use mbeumo_bot::bot::{render_reply, CommentOutcome, CycleOutcome};
use mbeumo_bot::ledger::ProcessedLedger;
use mbeumo_bot::stats::StatsStore;

use crate::support::{comment, make_bot, MockFeed};

// ---------------------------------------------------------------------------
// handle_comment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn misspelling_gets_reply_mark_and_stats() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut bot = make_bot(MockFeed::new("mbeumobot"), dir.path());
    let c = comment("c1", "fan", "Great goal by Mbuemo!", "Match Thread");

    let outcome = bot.handle_comment(&c).await.expect("handled");

    assert_eq!(
        outcome,
        CommentOutcome::Corrected {
            misspelling: "Mbuemo".to_owned()
        }
    );
    assert_eq!(
        bot.feed().replies,
        vec![("c1".to_owned(), render_reply("Mbeumo", "Mbuemo"))]
    );
    assert_eq!(bot.feed().marked, vec!["c1".to_owned()]);
    assert_eq!(bot.stats().total_corrections, 1);
    assert_eq!(bot.stats().count_for("mbuemo"), 1);
    assert!(bot.ledger().is_processed("c1"));

    // Persisted immediately, not only at shutdown.
    let on_disk = StatsStore::new(dir.path().join("stats.json"))
        .try_load()
        .expect("stats written");
    assert_eq!(on_disk.total_corrections, 1);
    let ledger = ProcessedLedger::open(dir.path().join("processed.json"), 100);
    assert!(ledger.is_processed("c1"));
}

#[tokio::test]
async fn correct_spelling_is_left_alone() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut bot = make_bot(MockFeed::new("mbeumobot"), dir.path());
    let c = comment("c1", "fan", "Great goal by Mbeumo!", "Match Thread");

    let outcome = bot.handle_comment(&c).await.expect("handled");

    assert_eq!(outcome, CommentOutcome::NoMisspelling);
    assert!(bot.feed().replies.is_empty());
    assert_eq!(bot.stats().total_corrections, 0);
}

#[tokio::test]
async fn title_filter_is_case_insensitive_substring() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut bot = make_bot(MockFeed::new("mbeumobot"), dir.path())
        .with_title_filter(Some("Match Thread"));

    let inside = comment("c1", "fan", "mbuemo!", "Post MATCH THREAD: United 2-1");
    let outside = comment("c2", "fan", "mbuemo!", "Transfer news roundup");
    let mut untitled = comment("c3", "fan", "mbuemo!", "");
    untitled.submission_title = None;

    assert!(matches!(
        bot.handle_comment(&inside).await.expect("handled"),
        CommentOutcome::Corrected { .. }
    ));
    assert_eq!(
        bot.handle_comment(&outside).await.expect("handled"),
        CommentOutcome::FilteredByTitle
    );
    assert_eq!(
        bot.handle_comment(&untitled).await.expect("handled"),
        CommentOutcome::FilteredByTitle
    );
    assert_eq!(bot.feed().replies.len(), 1);
}

#[tokio::test]
async fn title_filter_keeps_surrounding_spaces() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut bot =
        make_bot(MockFeed::new("mbeumobot"), dir.path()).with_title_filter(Some(" vs "));

    let fixture = comment("c1", "fan", "mbuemo!", "United VS Brentford");
    let tasting = comment("c2", "fan", "mbuemo!", "Vsop tasting thread");

    assert!(matches!(
        bot.handle_comment(&fixture).await.expect("handled"),
        CommentOutcome::Corrected { .. }
    ));
    assert_eq!(
        bot.handle_comment(&tasting).await.expect("handled"),
        CommentOutcome::FilteredByTitle
    );
}

#[tokio::test]
async fn blank_title_filter_disables_filtering() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut bot =
        make_bot(MockFeed::new("mbeumobot"), dir.path()).with_title_filter(Some("   "));
    let c = comment("c1", "fan", "mbuemo!", "Vsop tasting thread");

    assert!(matches!(
        bot.handle_comment(&c).await.expect("handled"),
        CommentOutcome::Corrected { .. }
    ));
}

#[tokio::test]
async fn own_comments_are_skipped_case_insensitively() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut bot = make_bot(MockFeed::new("MbeumoBot"), dir.path());
    let c = comment("c1", "mbeumobot", "you meant Mbeumo, not mbuemo", "Match Thread");

    let outcome = bot.handle_comment(&c).await.expect("handled");

    assert_eq!(outcome, CommentOutcome::OwnComment);
    assert!(bot.feed().replies.is_empty());
}

#[tokio::test]
async fn identity_is_fetched_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut bot = make_bot(MockFeed::new("mbeumobot"), dir.path());

    for id in ["c1", "c2", "c3"] {
        let c = comment(id, "fan", "nothing to see", "Match Thread");
        bot.handle_comment(&c).await.expect("handled");
    }

    assert_eq!(bot.feed().identity_calls, 1);
}

#[tokio::test]
async fn deleted_author_is_still_checked() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut bot = make_bot(MockFeed::new("mbeumobot"), dir.path());
    let mut c = comment("c1", "", "mboma scores", "Match Thread");
    c.author = None;

    let outcome = bot.handle_comment(&c).await.expect("handled");

    assert_eq!(
        outcome,
        CommentOutcome::Corrected {
            misspelling: "mboma".to_owned()
        }
    );
    assert_eq!(bot.feed().identity_calls, 0);
}

#[tokio::test]
async fn already_answered_comment_is_not_answered_again() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut bot = make_bot(MockFeed::new("mbeumobot"), dir.path());
    let c = comment("c1", "fan", "Mbuemo again", "Match Thread");

    bot.handle_comment(&c).await.expect("first");
    let second = bot.handle_comment(&c).await.expect("second");

    assert_eq!(second, CommentOutcome::AlreadyHandled);
    assert_eq!(bot.feed().replies.len(), 1);
    assert_eq!(bot.stats().total_corrections, 1);
}

#[tokio::test]
async fn ledger_from_previous_run_suppresses_reply() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let mut ledger = ProcessedLedger::open(dir.path().join("processed.json"), 100);
        ledger.mark("c1");
        assert!(ledger.save());
    }

    let mut bot = make_bot(MockFeed::new("mbeumobot"), dir.path());
    let c = comment("c1", "fan", "Mbuemo again", "Match Thread");

    assert_eq!(
        bot.handle_comment(&c).await.expect("handled"),
        CommentOutcome::AlreadyHandled
    );
    assert!(bot.feed().replies.is_empty());
}

#[tokio::test]
async fn failed_reply_changes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut feed = MockFeed::new("mbeumobot");
    feed.fail_reply = true;
    let mut bot = make_bot(feed, dir.path());
    let c = comment("c1", "fan", "Mbuemo", "Match Thread");

    let result = bot.handle_comment(&c).await;

    assert!(result.is_err());
    assert_eq!(bot.stats().total_corrections, 0);
    assert!(!bot.ledger().is_processed("c1"));
    assert!(bot.feed().marked.is_empty());
}

#[tokio::test]
async fn failed_mark_still_records_correction() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut feed = MockFeed::new("mbeumobot");
    feed.fail_mark = true;
    let mut bot = make_bot(feed, dir.path());
    let c = comment("c1", "fan", "Mbuemo", "Match Thread");

    let outcome = bot.handle_comment(&c).await.expect("handled");

    assert!(matches!(outcome, CommentOutcome::Corrected { .. }));
    assert_eq!(bot.stats().total_corrections, 1);
    assert!(bot.ledger().is_processed("c1"));
}

// ---------------------------------------------------------------------------
// poll_cycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn poll_cycle_reports_caught_up() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut bot = make_bot(MockFeed::new("mbeumobot").with_caught_up(), dir.path());

    assert_eq!(
        bot.poll_cycle().await.expect("cycle"),
        CycleOutcome::CaughtUp
    );
}

#[tokio::test]
async fn poll_cycle_processes_batch_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let feed = MockFeed::new("mbeumobot").with_batch(vec![
        comment("c1", "a", "Mbuemo", "t"),
        comment("c2", "b", "fine", "t"),
        comment("c3", "c", "MBOMA", "t"),
    ]);
    let mut bot = make_bot(feed, dir.path());

    let outcome = bot.poll_cycle().await.expect("cycle");

    assert_eq!(
        outcome,
        CycleOutcome::Processed {
            seen: 3,
            corrected: 2,
            failed: 0
        }
    );
    let ids: Vec<&str> = bot.feed().replies.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["c1", "c3"]);
    assert_eq!(bot.stats().count_for("mboma"), 1);
    assert!(bot.stats().is_consistent());
}

#[tokio::test]
async fn poll_cycle_continues_past_failed_comment() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut feed = MockFeed::new("mbeumobot").with_batch(vec![
        comment("c1", "a", "Mbuemo", "t"),
        comment("c2", "b", "mboma", "t"),
        comment("c3", "c", "mbeemo", "t"),
    ]);
    feed.fail_reply_for = vec!["c1".to_owned()];
    let mut bot = make_bot(feed, dir.path());

    let outcome = bot.poll_cycle().await.expect("cycle");

    assert_eq!(
        outcome,
        CycleOutcome::Processed {
            seen: 3,
            corrected: 2,
            failed: 1
        }
    );
    let ids: Vec<&str> = bot.feed().replies.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["c2", "c3"]);
    assert!(!bot.ledger().is_processed("c1"));
}

#[tokio::test]
async fn poll_cycle_propagates_feed_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut bot = make_bot(MockFeed::new("mbeumobot").with_error("503"), dir.path());

    assert!(bot.poll_cycle().await.is_err());
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn run_follows_schedule_and_survives_errors() {
    let dir = tempfile::tempdir().expect("tempdir");
    let feed = MockFeed::new("mbeumobot")
        .with_batch(vec![comment("c1", "fan", "Mbuemo!", "Match Thread")])
        .with_caught_up()
        .with_error("connection reset");
    let mut bot = make_bot(feed, dir.path());
    let (tx, rx) = watch::channel(false);

    let start = tokio::time::Instant::now();
    let stopper = async {
        tokio::time::sleep(Duration::from_secs(75)).await;
        tx.send(true).expect("bot still listening");
    };
    tokio::join!(bot.run(rx), stopper);

    // busy -> immediate re-poll, caught up -> 10s, error -> 60s backoff.
    let offsets: Vec<u64> = bot
        .feed()
        .polls
        .iter()
        .map(|t| t.duration_since(start).as_secs())
        .collect();
    assert_eq!(offsets, vec![0, 0, 10, 70]);

    let on_disk = StatsStore::new(dir.path().join("stats.json"))
        .try_load()
        .expect("stats persisted");
    assert_eq!(on_disk.total_corrections, 1);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_reply_does_not_drop_rest_of_batch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut feed = MockFeed::new("mbeumobot").with_batch(vec![
        comment("c1", "fan", "Mbuemo", "Match Thread"),
        comment("c2", "fan", "mboma", "Match Thread"),
        comment("c3", "fan", "mbeemo", "Match Thread"),
    ]);
    feed.fail_reply_for = vec!["c1".to_owned()];
    let mut bot = make_bot(feed, dir.path());
    let (tx, rx) = watch::channel(false);

    let start = tokio::time::Instant::now();
    let stopper = async {
        tokio::time::sleep(Duration::from_secs(300)).await;
        tx.send(true).expect("bot still listening");
    };
    tokio::join!(bot.run(rx), stopper);

    let ids: Vec<&str> = bot.feed().replies.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["c2", "c3"]);
    assert_eq!(bot.stats().total_corrections, 2);

    // A partly failed batch still backs off before the next poll.
    let second_poll = bot.feed().polls.get(1).expect("polled again");
    assert_eq!(second_poll.duration_since(start).as_secs(), 60);
}

#[tokio::test(start_paused = true)]
async fn shutdown_before_start_still_persists() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut bot = make_bot(MockFeed::new("mbeumobot"), dir.path());
    let (tx, rx) = watch::channel(false);
    tx.send(true).expect("receiver alive");

    bot.run(rx).await;

    assert!(bot.feed().polls.is_empty());
    let on_disk = StatsStore::new(dir.path().join("stats.json"))
        .try_load()
        .expect("stats written on shutdown");
    assert_eq!(on_disk.total_corrections, 0);
    assert!(dir.path().join("processed.json").exists());
}

#[tokio::test(start_paused = true)]
async fn dropped_sender_counts_as_shutdown() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut bot = make_bot(MockFeed::new("mbeumobot"), dir.path());
    let (tx, rx) = watch::channel(false);
    drop(tx);

    bot.run(rx).await;

    assert!(bot.feed().polls.is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_mid_batch_stops_after_current_comment() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (tx, rx) = watch::channel(false);
    let mut feed = MockFeed::new("mbeumobot").with_batch(vec![
        comment("c1", "fan", "Mbuemo", "t"),
        comment("c2", "fan", "Mbuemo", "t"),
    ]);
    feed.stop_after_reply = Some(tx);
    let mut bot = make_bot(feed, dir.path());

    bot.run(rx).await;

    // c1 finished its bookkeeping; c2 was never started.
    assert_eq!(bot.feed().replies.len(), 1);
    assert_eq!(bot.stats().total_corrections, 1);
    let on_disk = StatsStore::new(dir.path().join("stats.json"))
        .try_load()
        .expect("stats persisted");
    assert_eq!(on_disk.total_corrections, 1);
    assert_eq!(bot.feed().polls.len(), 1);
}
