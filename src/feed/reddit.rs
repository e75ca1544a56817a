//! Reddit OAuth API feed.
//!
//! Authenticates with the password grant, polls the combined
//! `/r/{subs}/comments` listing, and replies/saves through the OAuth API.
//! Stream semantics follow the usual Reddit bot conventions: the first fetch
//! only seeds the seen set (comments that existed before start-up are never
//! answered), and a fetch with nothing unseen reports [`FeedBatch::CaughtUp`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{check_http_response, Comment, CommentFeed, FeedBatch, FeedError};
use crate::credentials::RedditCredentials;
use crate::ledger::BoundedIdSet;

/// Token endpoint (password grant).
const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Base URL for authenticated API calls.
const OAUTH_API_BASE: &str = "https://oauth.reddit.com";

/// Comments requested per listing fetch (API maximum).
const LISTING_LIMIT: &str = "100";

/// Seen-id memory for stream dedup.
const SEEN_CAPACITY: usize = 301;

/// Refresh the token this long before it expires.
const TOKEN_REFRESH_MARGIN_SECS: u64 = 60;

/// Per-request HTTP timeout.
const HTTP_TIMEOUT_SECS: u64 = 30;

/// Author name Reddit reports for deleted accounts.
const DELETED_AUTHOR: &str = "[deleted]";

// ---------------------------------------------------------------------------
// Reddit API types (minimal subset)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    kind: String,
    data: CommentData,
}

#[derive(Debug, Deserialize)]
struct CommentData {
    id: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    body: String,
    #[serde(default)]
    link_title: Option<String>,
    #[serde(default)]
    subreddit: String,
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiJsonResponse {
    json: Option<ApiJsonBody>,
}

#[derive(Debug, Deserialize)]
struct ApiJsonBody {
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Stream state
// ---------------------------------------------------------------------------

/// Dedup state for a polled listing.
#[derive(Debug, Clone)]
pub struct StreamState {
    seen: BoundedIdSet,
    skip_existing: bool,
    primed: bool,
}

impl StreamState {
    /// New state. With `skip_existing`, the first batch is swallowed.
    pub fn new(skip_existing: bool) -> Self {
        Self {
            seen: BoundedIdSet::new(SEEN_CAPACITY),
            skip_existing,
            primed: false,
        }
    }

    /// Filter a freshly fetched listing (oldest first) down to unseen comments.
    pub fn absorb(&mut self, comments: Vec<Comment>) -> FeedBatch {
        let fresh: Vec<Comment> = comments
            .into_iter()
            .filter(|c| self.seen.insert(&c.id))
            .collect();

        if !self.primed {
            self.primed = true;
            if self.skip_existing {
                debug!(skipped = fresh.len(), "skipping comments that predate start-up");
                return FeedBatch::CaughtUp;
            }
        }

        FeedBatch::from_comments(fresh)
    }
}

/// Parse a `/comments` listing into comments, oldest first.
///
/// Non-comment children are ignored; `[deleted]` authors become `None`.
///
/// # Errors
///
/// Returns [`FeedError::Parse`] if the body is not a listing.
pub fn parse_comment_listing(body: &str) -> Result<Vec<Comment>, FeedError> {
    let listing: Listing = serde_json::from_str(body)?;
    let mut comments: Vec<Comment> = listing
        .data
        .children
        .into_iter()
        .filter(|thing| thing.kind == "t1")
        .map(|thing| {
            let data = thing.data;
            Comment {
                id: data.id,
                author: data.author.filter(|a| a != DELETED_AUTHOR && !a.is_empty()),
                body: data.body,
                submission_title: data.link_title,
                subreddit: data.subreddit,
            }
        })
        .collect();
    // Listings are newest first.
    comments.reverse();
    Ok(comments)
}

/// Check an `api_type=json` response for reported errors.
///
/// # Errors
///
/// Returns [`FeedError::Api`] when `json.errors` is non-empty, or
/// [`FeedError::Parse`] if the body is not JSON.
pub fn check_api_json(body: &str) -> Result<(), FeedError> {
    let parsed: ApiJsonResponse = serde_json::from_str(body)?;
    match parsed.json {
        Some(inner) if !inner.errors.is_empty() => Err(FeedError::Api(
            serde_json::Value::Array(inner.errors).to_string(),
        )),
        _ => Ok(()),
    }
}

/// Fullname of a comment id (`t1_<id>`).
pub fn comment_fullname(id: &str) -> String {
    if id.starts_with("t1_") {
        id.to_owned()
    } else {
        format!("t1_{id}")
    }
}

// ---------------------------------------------------------------------------
// Feed implementation
// ---------------------------------------------------------------------------

struct AccessToken {
    value: String,
    refresh_at: Instant,
}

/// Comment feed backed by the Reddit OAuth API.
pub struct RedditFeed {
    client: reqwest::Client,
    credentials: RedditCredentials,
    subreddits: String,
    known_secrets: Vec<String>,
    token: Option<AccessToken>,
    stream: StreamState,
}

impl std::fmt::Debug for RedditFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditFeed")
            .field("subreddits", &self.subreddits)
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl RedditFeed {
    /// Create a feed for the `+`-joined `subreddits` subscription.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Request`] if the HTTP client cannot be built.
    pub fn new(
        credentials: RedditCredentials,
        subreddits: String,
        user_agent: &str,
    ) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        let known_secrets = credentials.known_secrets();
        Ok(Self {
            client,
            known_secrets,
            credentials,
            subreddits,
            token: None,
            stream: StreamState::new(true),
        })
    }

    /// The combined subscription this feed polls.
    pub fn subreddits(&self) -> &str {
        &self.subreddits
    }

    /// Return a valid bearer token, fetching a new one when needed.
    async fn bearer(&mut self) -> Result<String, FeedError> {
        if let Some(token) = &self.token {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let params = [
            ("grant_type", "password"),
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.as_str()),
        ];
        let resp = self
            .client
            .post(TOKEN_URL)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&params)
            .send()
            .await?;
        let body = check_http_response(resp)
            .await
            .map_err(|e| e.redact(&self.known_secrets))?;
        let parsed: TokenResponse = serde_json::from_str(&body)?;

        if let Some(error) = parsed.error {
            return Err(FeedError::Auth(error).redact(&self.known_secrets));
        }
        let value = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FeedError::Auth("token response had no access_token".to_owned()))?;

        let lifetime = parsed
            .expires_in
            .unwrap_or(3600)
            .saturating_sub(TOKEN_REFRESH_MARGIN_SECS);
        let now = Instant::now();
        let refresh_at = now
            .checked_add(Duration::from_secs(lifetime))
            .unwrap_or(now);

        info!(expires_in_secs = lifetime, "obtained Reddit access token");
        self.token = Some(AccessToken {
            value: value.clone(),
            refresh_at,
        });
        Ok(value)
    }

    async fn get(&mut self, path: &str, query: &[(&str, &str)]) -> Result<String, FeedError> {
        let token = self.bearer().await?;
        let resp = self
            .client
            .get(format!("{OAUTH_API_BASE}{path}"))
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;
        self.finish(resp).await
    }

    async fn post_form(&mut self, path: &str, form: &[(&str, &str)]) -> Result<String, FeedError> {
        let token = self.bearer().await?;
        let resp = self
            .client
            .post(format!("{OAUTH_API_BASE}{path}"))
            .bearer_auth(token)
            .form(form)
            .send()
            .await?;
        self.finish(resp).await
    }

    /// Read an API response, redacting secrets from errors and dropping a
    /// token the API rejected so the next request authenticates again.
    async fn finish(&mut self, resp: reqwest::Response) -> Result<String, FeedError> {
        let result = check_http_response(resp)
            .await
            .map_err(|e| e.redact(&self.known_secrets));
        if let Err(e) = &result {
            self.forget_rejected_token(e);
        }
        result
    }

    fn forget_rejected_token(&mut self, error: &FeedError) {
        if error.is_unauthorized() && self.token.take().is_some() {
            warn!("access token rejected, re-authenticating on next request");
        }
    }
}

#[async_trait]
impl CommentFeed for RedditFeed {
    async fn current_identity(&mut self) -> Result<String, FeedError> {
        let body = self.get("/api/v1/me", &[("raw_json", "1")]).await?;
        let me: MeResponse = serde_json::from_str(&body)?;
        Ok(me.name)
    }

    async fn next_batch(&mut self) -> Result<FeedBatch, FeedError> {
        let path = format!("/r/{}/comments", self.subreddits);
        let body = self
            .get(&path, &[("limit", LISTING_LIMIT), ("raw_json", "1")])
            .await?;
        let comments = parse_comment_listing(&body)?;
        Ok(self.stream.absorb(comments))
    }

    async fn reply(&mut self, comment: &Comment, text: &str) -> Result<(), FeedError> {
        let thing_id = comment_fullname(&comment.id);
        let body = self
            .post_form(
                "/api/comment",
                &[("api_type", "json"), ("thing_id", thing_id.as_str()), ("text", text)],
            )
            .await?;
        check_api_json(&body)
    }

    async fn mark_processed(&mut self, comment: &Comment) -> Result<(), FeedError> {
        let id = comment_fullname(&comment.id);
        self.post_form("/api/save", &[("id", id.as_str())]).await?;
        Ok(())
    }
}
