//! Configuration types for an inbox.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{InboxError, Result};

/// Polling interval used when none (or zero) is configured.
pub const DEFAULT_INTERVAL_MS: u64 = 1000;

/// Configuration for a watched inbox directory.
///
/// This is the data half of an inbox's configuration: everything that can be
/// written down in a service configuration file. Behaviour that can only be
/// expressed in code (task factory, custom filters, hooks, gate) is supplied
/// through [`crate::InboxBuilder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxConfig {
    /// Path to the watched directory.
    pub path: PathBuf,

    /// Polling interval in milliseconds. `None` or `0` means the default.
    #[serde(default)]
    pub interval_ms: Option<u64>,

    /// Which kind of direct children are inbox items.
    #[serde(default)]
    pub item_kind: ItemKind,

    /// Order in which items discovered in one round are dispatched.
    #[serde(default)]
    pub ordering: OrderingKind,

    /// File name patterns that are never inbox items.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Worker pool used when no pool is supplied in code.
    #[serde(default)]
    pub worker: WorkerPoolConfig,
}

impl InboxConfig {
    /// Create a new inbox config with default values.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            interval_ms: None,
            item_kind: ItemKind::default(),
            ordering: OrderingKind::default(),
            exclude_patterns: Vec::new(),
            worker: WorkerPoolConfig::default(),
        }
    }

    /// Set the polling interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = Some(u64::try_from(interval.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Set the item kind.
    pub fn with_item_kind(mut self, kind: ItemKind) -> Self {
        self.item_kind = kind;
        self
    }

    /// Set the ordering.
    pub fn with_ordering(mut self, ordering: OrderingKind) -> Self {
        self.ordering = ordering;
        self
    }

    /// Add an exclude pattern.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }

    /// Set the worker pool configuration.
    pub fn with_worker(mut self, worker: WorkerPoolConfig) -> Self {
        self.worker = worker;
        self
    }

    /// Effective polling interval.
    pub fn interval(&self) -> Duration {
        match self.interval_ms {
            None | Some(0) => Duration::from_millis(DEFAULT_INTERVAL_MS),
            Some(ms) => Duration::from_millis(ms),
        }
    }

    /// Parse a config from a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|e| InboxError::io(path, e))?;
        Self::from_yaml_str(&yaml)
    }

    /// Check the config for values that can never work.
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(InboxError::Config("inbox path is empty".to_string()));
        }
        if let Some(pattern) = self.exclude_patterns.iter().find(|p| p.trim().is_empty()) {
            return Err(InboxError::InvalidPattern(pattern.clone()));
        }
        self.worker.validate()
    }
}

/// Which direct children of the watched directory count as inbox items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Files and directories.
    #[default]
    Any,

    /// Regular files only.
    Files,

    /// Directories only.
    Directories,
}

/// Built-in ordering policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingKind {
    /// Lexicographic by final path segment.
    #[default]
    FileName,

    /// Oldest first by creation time.
    CreationTime,
}

/// Configuration for the inbox's own worker threads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Prefix for worker thread names; threads are named `<prefix>-<n>`.
    pub name_prefix: String,

    /// Number of worker threads.
    pub threads: usize,

    /// Maximum number of queued tasks (None = unbounded).
    pub max_queue_size: Option<usize>,
}

impl WorkerPoolConfig {
    /// Set the thread count.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Bound the task queue.
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = Some(size);
        self
    }

    /// Set the thread name prefix.
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Reject settings no pool can run with.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(InboxError::Config(
                "worker pool needs at least one thread".to_string(),
            ));
        }
        if self.max_queue_size == Some(0) {
            return Err(InboxError::Config(
                "worker queue size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            name_prefix: "inbox-worker".to_string(),
            threads: 1,
            max_queue_size: None,
        }
    }
}
