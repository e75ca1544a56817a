//! Ledger of comments the bot has already answered.
//!
//! This is the authoritative "already answered" check; the platform-side
//! mark is advisory. The ledger is bounded: once full, the oldest ids are
//! evicted first.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, warn};

/// Default number of ids retained.
pub const DEFAULT_LEDGER_CAPACITY: usize = 1000;

/// Bounded insertion-ordered set of ids.
#[derive(Debug, Clone)]
pub struct BoundedIdSet {
    capacity: usize,
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl BoundedIdSet {
    /// Create an empty set holding at most `capacity` ids (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
        }
    }

    /// Whether `id` is present.
    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    /// Insert `id`, evicting the oldest entry when full.
    ///
    /// Returns `false` if the id was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.members.contains(id) {
            return false;
        }
        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        self.order.push_back(id.to_owned());
        self.members.insert(id.to_owned());
        true
    }

    /// Number of ids held.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

/// File-backed record of handled comment ids.
#[derive(Debug)]
pub struct ProcessedLedger {
    path: PathBuf,
    ids: BoundedIdSet,
}

impl ProcessedLedger {
    /// Open the ledger at `path`, starting empty if the file is missing or
    /// unreadable.
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let path = path.into();
        let mut ids = BoundedIdSet::new(capacity);

        match read_ids(&path) {
            Ok(loaded) => {
                for id in &loaded {
                    ids.insert(id);
                }
                debug!(path = %path.display(), count = ids.len(), "loaded processed ledger");
            }
            Err(e) if path.exists() => {
                warn!(error = %e, "failed to load processed ledger, starting empty");
            }
            Err(_) => {
                debug!(path = %path.display(), "no processed ledger yet");
            }
        }

        Self { path, ids }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the comment was already answered.
    pub fn is_processed(&self, comment_id: &str) -> bool {
        self.ids.contains(comment_id)
    }

    /// Record a comment as answered.
    pub fn mark(&mut self, comment_id: &str) {
        self.ids.insert(comment_id);
    }

    /// Number of ids held.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether no ids are held.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Persist the ledger, logging on failure.
    pub fn save(&self) -> bool {
        match self.try_save() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to save processed ledger");
                false
            }
        }
    }

    /// Persist the ledger (temp file, then rename).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any file operation fails.
    pub fn try_save(&self) -> anyhow::Result<()> {
        let ids: Vec<&str> = self.ids.iter().collect();
        let json = serde_json::to_string(&ids).context("failed to serialize ledger")?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json.as_bytes())
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed to rename into {}", self.path.display()))?;
        Ok(())
    }
}

fn read_ids(path: &Path) -> anyhow::Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
}
