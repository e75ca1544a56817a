//! Reddit credential loading from the environment and an optional `.env`.

use std::path::Path;

use anyhow::Context;
use tracing::debug;

/// Environment variable holding the OAuth app id.
pub const CLIENT_ID_VAR: &str = "REDDIT_CLIENT_ID";
/// Environment variable holding the OAuth app secret.
pub const CLIENT_SECRET_VAR: &str = "REDDIT_CLIENT_SECRET";
/// Environment variable holding the bot account name.
pub const USERNAME_VAR: &str = "REDDIT_USERNAME";
/// Environment variable holding the bot account password.
pub const PASSWORD_VAR: &str = "REDDIT_PASSWORD";
/// Environment variable naming the human operator, used in the user agent.
pub const AUTHOR_USERNAME_VAR: &str = "REDDIT_AUTHOR_USERNAME";

/// Credentials for the Reddit password grant.
#[derive(Clone, PartialEq, Eq)]
pub struct RedditCredentials {
    /// OAuth app id.
    pub client_id: String,
    /// OAuth app secret.
    pub client_secret: String,
    /// Bot account name.
    pub username: String,
    /// Bot account password.
    pub password: String,
    /// Operator account name, shown in the user agent.
    pub author_username: String,
}

impl std::fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("author_username", &self.author_username)
            .finish()
    }
}

impl RedditCredentials {
    /// Read credentials from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first missing or blank variable.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Read credentials through a custom resolver (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error naming the first missing or blank variable.
    pub fn from_env_with(env: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let require = |key: &str| -> anyhow::Result<String> {
            env(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow::anyhow!("missing required credential: {key}"))
        };

        Ok(Self {
            client_id: require(CLIENT_ID_VAR)?,
            client_secret: require(CLIENT_SECRET_VAR)?,
            username: require(USERNAME_VAR)?,
            password: require(PASSWORD_VAR)?,
            author_username: require(AUTHOR_USERNAME_VAR)?,
        })
    }

    /// User agent string identifying the bot and its operator.
    pub fn user_agent(&self, repo_url: &str) -> String {
        format!(
            "mbeumobot (by u/{}) - {repo_url}",
            self.author_username
        )
    }

    /// All secret values, for log redaction.
    pub fn known_secrets(&self) -> Vec<String> {
        [&self.client_secret, &self.password]
            .into_iter()
            .filter(|value| !value.trim().is_empty())
            .cloned()
            .collect()
    }
}

/// Load variables from a `.env` file into the process environment.
///
/// A missing file is not an error; variables already set are not
/// overridden. Returns whether a file was loaded.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be parsed.
pub fn load_dotenv(path: Option<&Path>) -> anyhow::Result<bool> {
    let result = match path {
        Some(p) => dotenvy::from_path(p).map(|()| p.to_path_buf()),
        None => dotenvy::dotenv(),
    };

    match result {
        Ok(loaded) => {
            debug!(path = %loaded.display(), "loaded .env file");
            Ok(true)
        }
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(e).context("failed to parse .env file"),
    }
}
