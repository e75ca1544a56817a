//! mbeumo-bot: a Reddit bot that corrects misspellings of "Mbeumo".
//!
//! Polls a comment stream, detects known misspellings with whole-word
//! regexes, replies with the correct spelling, and keeps running counters
//! in a JSON file.
//!
//! See `DESIGN.md` for the architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod credentials;
pub mod logging;

pub mod feed;
pub mod ledger;
pub mod matcher;
pub mod schedule;
pub mod stats;

pub mod bot;
