//! Correction counters and their JSON persistence.
//!
//! Stats are loaded once at startup, mutated on every correction, and saved
//! after each mutation and again on shutdown. Persistence is fail-open:
//! an unreadable or corrupt file yields fresh counters, and a failed write is
//! logged without interrupting the bot.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Running correction counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionStats {
    /// When counting started.
    #[serde(default = "Utc::now")]
    pub start_time: DateTime<Utc>,
    /// Total replies posted.
    #[serde(default)]
    pub total_corrections: u64,
    /// Per-misspelling counts keyed by lowercased surface form.
    #[serde(default)]
    pub misspellings: BTreeMap<String, u64>,
}

impl Default for CorrectionStats {
    fn default() -> Self {
        Self::fresh()
    }
}

impl CorrectionStats {
    /// Zeroed counters starting now.
    pub fn fresh() -> Self {
        Self {
            start_time: Utc::now(),
            total_corrections: 0,
            misspellings: BTreeMap::new(),
        }
    }

    /// Count one correction of `misspelling`.
    ///
    /// The key is lowercased so "Mbuemo" and "MBUEMO" share a counter.
    pub fn record_correction(&mut self, misspelling: &str) {
        let count = self
            .misspellings
            .entry(misspelling.to_lowercase())
            .or_insert(0);
        *count = count.saturating_add(1);
        self.total_corrections = self.total_corrections.saturating_add(1);
    }

    /// Count for a single misspelling (case-insensitive).
    pub fn count_for(&self, misspelling: &str) -> u64 {
        self.misspellings
            .get(&misspelling.to_lowercase())
            .copied()
            .unwrap_or(0)
    }

    /// Whether the total equals the sum of per-misspelling counts.
    pub fn is_consistent(&self) -> bool {
        let sum = self
            .misspellings
            .values()
            .fold(0u64, |acc, n| acc.saturating_add(*n));
        sum == self.total_corrections
    }
}

/// Errors reading or writing the stats file.
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    /// The file could not be read or written.
    #[error("stats file {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The file contents were not valid stats JSON.
    #[error("stats file {path} is malformed: {source}")]
    Malformed {
        /// File involved.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// The in-memory stats could not be encoded.
    #[error("failed to serialize stats for {path}: {source}")]
    Serialize {
        /// File that was being written.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl StatsError {
    /// True when the file simply does not exist yet.
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// File-backed store for [`CorrectionStats`].
#[derive(Debug, Clone)]
pub struct StatsStore {
    path: PathBuf,
}

impl StatsStore {
    /// Bind a store to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read stats, reporting every failure.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError`] if the file is missing, unreadable, or malformed.
    pub fn try_load(&self) -> Result<CorrectionStats, StatsError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|source| StatsError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| StatsError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    /// Read stats, falling back to fresh counters on any error.
    ///
    /// Corrupt stats must never keep the bot from running, so every failure
    /// collapses to [`CorrectionStats::fresh`].
    pub fn load(&self) -> CorrectionStats {
        match self.try_load() {
            Ok(stats) => {
                debug!(
                    path = %self.path.display(),
                    total_corrections = stats.total_corrections,
                    "loaded stats"
                );
                stats
            }
            Err(e) if e.is_missing() => {
                debug!(path = %self.path.display(), "no stats file yet, starting fresh");
                CorrectionStats::fresh()
            }
            Err(e) => {
                warn!(error = %e, "failed to load stats, starting fresh");
                CorrectionStats::fresh()
            }
        }
    }

    /// Write stats atomically (temp file, then rename).
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::Serialize`] if encoding fails, or
    /// [`StatsError::Io`] if the directory, temp file, or rename fails.
    pub fn try_save(&self, stats: &CorrectionStats) -> Result<(), StatsError> {
        let io_err = |source| StatsError::Io {
            path: self.path.clone(),
            source,
        };

        let json = serde_json::to_string_pretty(stats).map_err(|source| StatsError::Serialize {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json.as_bytes()).map_err(io_err)?;
        std::fs::rename(&tmp_path, &self.path).map_err(io_err)?;

        debug!(path = %self.path.display(), "stats saved");
        Ok(())
    }

    /// Write stats, logging instead of failing.
    ///
    /// Returns whether the write succeeded.
    pub fn save(&self, stats: &CorrectionStats) -> bool {
        match self.try_save(stats) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to save stats");
                false
            }
        }
    }
}
