//! Configuration loading.
//!
//! Loads `./mbeumo-bot.toml` (or `$MBEUMO_BOT_CONFIG`), then applies
//! environment overrides. A missing file yields defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::ledger::DEFAULT_LEDGER_CAPACITY;
use crate::schedule::{
    effective_poll_interval, PollSchedule, DEFAULT_ERROR_BACKOFF_SECS,
    DEFAULT_POLL_INTERVAL_SECS, MIN_POLL_INTERVAL_SECS,
};

/// Environment variable pointing at the config file.
pub const CONFIG_PATH_VAR: &str = "MBEUMO_BOT_CONFIG";

// ── Top-level config ────────────────────────────────────────────

/// Top-level bot configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Events from loading, held until logging is up (see [`Self::log_notices`]).
    #[serde(skip)]
    pub notices: Vec<ConfigNotice>,
    /// Polling and filtering.
    pub bot: PollingConfig,
    /// Filesystem paths for persistent state.
    pub paths: PathsConfig,
    /// Reddit client settings.
    pub reddit: RedditConfig,
    /// Logging settings.
    pub log: LogConfig,
}

impl BotConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using a custom env resolver (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path = config_path_with(&env);
        let mut config = Self::load_from_file(&path)?;
        config.apply_overrides(&env);
        config.normalize();
        Ok(config)
    }

    /// Load from a TOML file only; a missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let mut config = Self::from_toml(&contents)
                    .with_context(|| format!("failed to parse config at {}", path.display()))?;
                config.notices.push(ConfigNotice::LoadedFile(path.to_path_buf()));
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let mut config = Self::default();
                config.notices.push(ConfigNotice::NoFile(path.to_path_buf()));
                Ok(config)
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config at {}: {e}",
                path.display()
            )),
        }
    }

    /// Parse a TOML string into config (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: BotConfig = toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function for testability (avoids `set_var` in tests).
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("POLL_INTERVAL_SECONDS") {
            match v.trim().parse() {
                Ok(n) => self.bot.poll_interval_secs = n,
                Err(_) => self.notices.push(ConfigNotice::InvalidOverride {
                    var: "POLL_INTERVAL_SECONDS",
                    value: v,
                }),
            }
        }
        if let Some(v) = env("SUBREDDITS") {
            self.bot.subreddits = v.split(',').map(str::to_owned).collect();
        }
        if let Some(v) = env("LIMIT_TO_SUBMISSION_TITLED") {
            self.bot.limit_to_submission_titled = Some(v);
        }

        if let Some(v) = env("STATS_PATH") {
            self.paths.stats_file = PathBuf::from(v);
        }
        if let Some(v) = env("LEDGER_PATH") {
            self.paths.ledger_file = Some(PathBuf::from(v));
        }
        if let Some(v) = env("LOGS_DIR") {
            self.paths.logs_dir = Some(PathBuf::from(v));
        }
    }

    /// Clamp values into their allowed ranges.
    ///
    /// Poll intervals below the floor are raised to it and noted.
    pub fn normalize(&mut self) {
        let requested = self.bot.poll_interval_secs;
        let effective = effective_poll_interval(requested);
        if effective != requested {
            self.notices.push(ConfigNotice::PollIntervalRaised {
                requested,
                effective,
            });
            self.bot.poll_interval_secs = effective;
        }

        self.bot.subreddits = self
            .bot
            .subreddits
            .iter()
            .map(|s| s.trim().trim_start_matches("r/").to_owned())
            .filter(|s| !s.is_empty())
            .collect();
        if self.bot.subreddits.is_empty() {
            self.bot.subreddits = default_subreddits();
        }

        if self
            .bot
            .limit_to_submission_titled
            .as_deref()
            .is_some_and(|t| t.trim().is_empty())
        {
            self.bot.limit_to_submission_titled = None;
        }
    }

    /// Combined subscription, e.g. `reddevils+soccer`.
    pub fn subreddit_subscription(&self) -> String {
        self.bot.subreddits.join("+")
    }

    /// Active thread-title filter, if any.
    pub fn title_filter(&self) -> Option<&str> {
        self.bot
            .limit_to_submission_titled
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }

    /// Poll timing derived from this config.
    pub fn schedule(&self) -> PollSchedule {
        PollSchedule::new(self.bot.poll_interval_secs, self.bot.error_backoff_secs)
    }

    /// Ledger path, defaulting to `processed.json` beside the stats file.
    pub fn ledger_path(&self) -> PathBuf {
        match &self.paths.ledger_file {
            Some(p) => p.clone(),
            None => self.paths.stats_file.with_file_name("processed.json"),
        }
    }

    /// Emit the notices gathered while loading. Call once a subscriber is
    /// installed; events raised before that are discarded.
    pub fn log_notices(&self) {
        for notice in &self.notices {
            notice.log();
        }
    }
}

/// Something worth reporting that happened while loading configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigNotice {
    /// Settings were read from this file.
    LoadedFile(PathBuf),
    /// No file at this path; defaults apply.
    NoFile(PathBuf),
    /// An env override could not be parsed and was ignored.
    InvalidOverride {
        /// Variable name.
        var: &'static str,
        /// Rejected value.
        value: String,
    },
    /// The poll interval was below the floor and was raised.
    PollIntervalRaised {
        /// Configured seconds.
        requested: u64,
        /// Seconds actually used.
        effective: u64,
    },
}

impl ConfigNotice {
    /// Log at the level the notice deserves.
    pub fn log(&self) {
        match self {
            Self::LoadedFile(path) => {
                tracing::info!(path = %path.display(), "loaded config from file");
            }
            Self::NoFile(path) => {
                tracing::info!(path = %path.display(), "no config file found, using defaults");
            }
            Self::InvalidOverride { var, value } => {
                tracing::warn!(var = %var, value = %value, "ignoring invalid env override");
            }
            Self::PollIntervalRaised {
                requested,
                effective,
            } => tracing::warn!(
                requested,
                effective,
                "poll interval too low; raising to {MIN_POLL_INTERVAL_SECS}s to respect API"
            ),
        }
    }
}

/// Resolve the config file path through `env`.
pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
    match env(CONFIG_PATH_VAR) {
        Some(p) if !p.trim().is_empty() => PathBuf::from(p),
        _ => PathBuf::from("mbeumo-bot.toml"),
    }
}

// ── Sections ────────────────────────────────────────────────────

/// Polling and comment filtering.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Seconds to wait once the feed has caught up (floor 10).
    pub poll_interval_secs: u64,
    /// Seconds to wait after a failed poll cycle.
    pub error_backoff_secs: u64,
    /// Communities to watch.
    pub subreddits: Vec<String>,
    /// Only consider comments in threads whose title contains this text.
    pub limit_to_submission_titled: Option<String>,
    /// Number of answered comment ids remembered.
    pub ledger_capacity: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            error_backoff_secs: DEFAULT_ERROR_BACKOFF_SECS,
            subreddits: default_subreddits(),
            limit_to_submission_titled: None,
            ledger_capacity: DEFAULT_LEDGER_CAPACITY,
        }
    }
}

/// Filesystem paths.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Stats JSON file.
    pub stats_file: PathBuf,
    /// Answered-comment ledger; defaults beside the stats file.
    pub ledger_file: Option<PathBuf>,
    /// Directory for rotated JSON logs; console only when unset.
    pub logs_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            stats_file: PathBuf::from("/data/stats.json"),
            ledger_file: None,
            logs_dir: None,
        }
    }
}

/// Reddit client settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    /// Project URL included in the user agent.
    pub user_agent_repo: String,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            user_agent_repo: "https://github.com/ccameronmills/mbeumo-bot".to_owned(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

fn default_subreddits() -> Vec<String> {
    vec!["reddevils".to_owned()]
}

// ── Tests ───────────────────────────────────────────────────────
