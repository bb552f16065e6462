//! Directory listing for the watched directory.
//!
//! The same listing serves two purposes: the one-time snapshot taken at
//! startup, which is ordered and dispatched, and the per-round listing the
//! poll loop diffs against its last-known state.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{InboxError, Result};
use crate::filter::MembershipFilter;
use crate::ordering::OrderingPolicy;

/// Lists the direct children of a watched directory that pass a filter.
#[derive(Clone)]
pub struct Scanner {
    root: PathBuf,
    filter: Arc<dyn MembershipFilter>,
    ordering: Arc<dyn OrderingPolicy>,
}

impl Scanner {
    /// Create a scanner for `root`.
    pub fn new(
        root: impl Into<PathBuf>,
        filter: Arc<dyn MembershipFilter>,
        ordering: Arc<dyn OrderingPolicy>,
    ) -> Self {
        Self {
            root: root.into(),
            filter,
            ordering,
        }
    }

    /// The watched directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The membership filter applied to every listing.
    pub fn filter(&self) -> &dyn MembershipFilter {
        self.filter.as_ref()
    }

    /// The ordering policy used for snapshots and poll rounds.
    pub fn ordering(&self) -> &dyn OrderingPolicy {
        self.ordering.as_ref()
    }

    /// Check that the watched directory exists and is a directory.
    pub fn check_root(&self) -> Result<()> {
        let metadata = match std::fs::metadata(&self.root) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(InboxError::DirectoryNotFound(
                    self.root.display().to_string(),
                ));
            }
            Err(e) => return Err(InboxError::io(&self.root, e)),
        };

        if !metadata.is_dir() {
            return Err(InboxError::NotADirectory(self.root.display().to_string()));
        }
        Ok(())
    }

    /// Current set of inbox items, unordered.
    ///
    /// Any error while reading the directory is returned; a partial listing
    /// is never produced.
    pub fn list(&self) -> Result<HashSet<PathBuf>> {
        let mut items = HashSet::new();

        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let path = entry?.into_path();
            if self.filter.accepts(&path) {
                items.insert(path);
            }
        }

        Ok(items)
    }

    /// Take the startup snapshot: every current item, in dispatch order.
    pub fn scan(&self) -> Result<Snapshot> {
        self.check_root()?;

        let mut items: Vec<PathBuf> = self.list()?.into_iter().collect();
        self.ordering.sort(&mut items);

        debug!(
            "Snapshot of {} found {} item(s)",
            self.root.display(),
            items.len()
        );
        Ok(Snapshot { items })
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner").field("root", &self.root).finish()
    }
}

/// Ordered items present at startup. Consumed once.
#[derive(Debug)]
pub struct Snapshot {
    items: Vec<PathBuf>,
}

impl Snapshot {
    /// Number of items in the snapshot.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The snapshot as an unordered set, used as the poll loop's baseline.
    pub fn baseline(&self) -> HashSet<PathBuf> {
        self.items.iter().cloned().collect()
    }
}

impl IntoIterator for Snapshot {
    type Item = PathBuf;
    type IntoIter = std::vec::IntoIter<PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
