//! Comment feed abstraction.
//!
//! Defines the [`CommentFeed`] trait the ingestion loop talks to, and the
//! shared types it exchanges. One implementation is provided:
//! [`reddit::RedditFeed`] over the Reddit OAuth API.

use async_trait::async_trait;
use regex::Regex;

pub mod reddit;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// A comment as delivered by the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    /// Platform id without type prefix (e.g. `"k1x2y3"`).
    pub id: String,
    /// Author name; `None` for deleted accounts.
    pub author: Option<String>,
    /// Comment text.
    pub body: String,
    /// Title of the thread the comment belongs to.
    pub submission_title: Option<String>,
    /// Community the comment was posted in.
    pub subreddit: String,
}

/// Result of one poll of the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedBatch {
    /// New comments, oldest first.
    Comments(Vec<Comment>),
    /// Nothing new; poll again later.
    CaughtUp,
}

impl FeedBatch {
    /// Wrap a list, mapping an empty list to [`FeedBatch::CaughtUp`].
    pub fn from_comments(comments: Vec<Comment>) -> Self {
        if comments.is_empty() {
            Self::CaughtUp
        } else {
            Self::Comments(comments)
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by feed implementations.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// HTTP transport failure.
    #[error("feed request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Response did not match the expected schema.
    #[error("feed response parse error: {0}")]
    Parse(String),
    /// Upstream responded with an error status.
    #[error("feed returned non-success status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        body: String,
    },
    /// Upstream accepted the request but reported an error.
    #[error("feed API error: {0}")]
    Api(String),
    /// Authentication failed.
    #[error("feed authentication failed: {0}")]
    Auth(String),
}

impl FeedError {
    /// Replace every occurrence of a known secret in the error text.
    #[must_use]
    pub fn redact(self, known_secrets: &[String]) -> Self {
        match self {
            Self::Parse(msg) => Self::Parse(redact_known_secrets(&msg, known_secrets)),
            Self::HttpStatus { status, body } => Self::HttpStatus {
                status,
                body: redact_known_secrets(&body, known_secrets),
            },
            Self::Api(msg) => Self::Api(redact_known_secrets(&msg, known_secrets)),
            Self::Auth(msg) => Self::Auth(redact_known_secrets(&msg, known_secrets)),
            Self::Request(e) => Self::Request(e),
        }
    }

    /// Whether the upstream rejected the credentials or token (HTTP 401).
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::HttpStatus { status: 401, .. })
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Check HTTP response status and return body text or a structured error.
///
/// # Errors
///
/// Returns `FeedError::Request` on transport failure, `FeedError::HttpStatus` on non-2xx.
pub async fn check_http_response(response: reqwest::Response) -> Result<String, FeedError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(FeedError::HttpStatus {
            status: status.as_u16(),
            body: sanitize_http_error_body(&body),
        });
    }
    Ok(body)
}

/// Collapse whitespace, strip bearer tokens, and truncate an error body.
pub fn sanitize_http_error_body(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut sanitized = collapsed;
    for pattern in [
        r"(?i)bearer\s+[A-Za-z0-9_\-\.]{10,}",
        r#""access_token"\s*:\s*"[^"]+""#,
    ] {
        if let Ok(regex) = Regex::new(pattern) {
            sanitized = regex.replace_all(&sanitized, REDACTION_MARKER).into_owned();
        }
    }

    const MAX_ERROR_BODY_CHARS: usize = 256;
    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = sanitized
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    sanitized
}

/// Marker substituted for redacted content.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Replace exact occurrences of `known_secrets` in `text`.
pub fn redact_known_secrets(text: &str, known_secrets: &[String]) -> String {
    let mut redacted = text.to_owned();
    for secret in known_secrets {
        if !secret.is_empty() {
            redacted = redacted.replace(secret.as_str(), REDACTION_MARKER);
        }
    }
    redacted
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Read and write access to a comment stream.
#[async_trait]
pub trait CommentFeed: Send {
    /// Name of the account the bot posts as.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError`] on API, network, or auth failure.
    async fn current_identity(&mut self) -> Result<String, FeedError>;

    /// Fetch the next batch of unseen comments.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError`] on API, network, or auth failure.
    async fn next_batch(&mut self) -> Result<FeedBatch, FeedError>;

    /// Post `text` as a reply to `comment`.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError`] if the reply is rejected or cannot be sent.
    async fn reply(&mut self, comment: &Comment, text: &str) -> Result<(), FeedError>;

    /// Flag `comment` as handled on the platform side.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError`] if the request fails.
    async fn mark_processed(&mut self, comment: &Comment) -> Result<(), FeedError>;
}
