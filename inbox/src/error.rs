//! Error types for the inbox.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for inbox operations.
pub type Result<T> = std::result::Result<T, InboxError>;

/// Errors that can occur while configuring or running an inbox.
#[derive(Error, Debug)]
pub enum InboxError {
    /// Watched directory not found.
    #[error("directory not found: {0}")]
    DirectoryNotFound(String),

    /// Watched path exists but is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// IO error while reading a specific path.
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory walk error.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// The lifecycle gate was dropped without being opened.
    #[error("lifecycle gate closed before it was opened")]
    GateClosed,

    /// Worker queue is at capacity.
    #[error("worker queue is full")]
    QueueFull,

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// Worker pool no longer accepts tasks.
    #[error("worker pool has shut down")]
    PoolShutdown,

    /// Invalid exclude pattern.
    #[error("invalid exclude pattern: {0}")]
    InvalidPattern(String),

    /// No task factory was supplied.
    #[error("no task factory configured")]
    MissingTaskFactory,

    /// A background task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// YAML error.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl InboxError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
