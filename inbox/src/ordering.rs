//! Ordering policies for items discovered in the same round.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::config::OrderingKind;

/// Total order over inbox items, used to decide dispatch order.
pub trait OrderingPolicy: Send + Sync {
    /// Compare two paths.
    fn compare(&self, a: &Path, b: &Path) -> Ordering;

    /// Sort a batch of paths in place.
    fn sort(&self, paths: &mut [PathBuf]) {
        paths.sort_by(|a, b| self.compare(a, b));
    }
}

impl<F> OrderingPolicy for F
where
    F: Fn(&Path, &Path) -> Ordering + Send + Sync,
{
    fn compare(&self, a: &Path, b: &Path) -> Ordering {
        self(a, b)
    }
}

/// Lexicographic by final path segment. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByFileName;

impl OrderingPolicy for ByFileName {
    fn compare(&self, a: &Path, b: &Path) -> Ordering {
        a.file_name().cmp(&b.file_name()).then_with(|| a.cmp(b))
    }
}

/// Oldest first, by creation time.
///
/// Platforms without birth times fall back to the modification time; paths
/// whose metadata cannot be read sort first. Ties are broken by file name.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByCreationTime;

impl ByCreationTime {
    fn timestamp(path: &Path) -> Option<SystemTime> {
        let metadata = path.metadata().ok()?;
        metadata.created().or_else(|_| metadata.modified()).ok()
    }
}

impl OrderingPolicy for ByCreationTime {
    fn compare(&self, a: &Path, b: &Path) -> Ordering {
        Self::timestamp(a)
            .cmp(&Self::timestamp(b))
            .then_with(|| ByFileName.compare(a, b))
    }

    fn sort(&self, paths: &mut [PathBuf]) {
        paths.sort_by_cached_key(|p| {
            (
                Self::timestamp(p),
                p.file_name().map(std::ffi::OsStr::to_os_string),
            )
        });
    }
}

/// Shared ordering policy for a built-in kind.
pub fn from_kind(kind: OrderingKind) -> Arc<dyn OrderingPolicy> {
    match kind {
        OrderingKind::FileName => Arc::new(ByFileName),
        OrderingKind::CreationTime => Arc::new(ByCreationTime),
    }
}
