//! Membership filters deciding which paths are inbox items.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use wildmatch::WildMatch;

use crate::config::{InboxConfig, ItemKind};
use crate::error::{InboxError, Result};

/// Predicate deciding whether a path belongs to an inbox.
///
/// Implemented for any `Fn(&Path) -> bool`, so a closure can be passed
/// wherever a filter is expected.
pub trait MembershipFilter: Send + Sync {
    /// Whether `path` is an inbox item.
    fn accepts(&self, path: &Path) -> bool;
}

impl<F> MembershipFilter for F
where
    F: Fn(&Path) -> bool + Send + Sync,
{
    fn accepts(&self, path: &Path) -> bool {
        self(path)
    }
}

/// Accepts paths whose parent is exactly the given directory.
#[derive(Debug, Clone)]
pub struct ChildOf {
    parent: PathBuf,
}

impl ChildOf {
    pub fn new(parent: impl Into<PathBuf>) -> Self {
        Self {
            parent: parent.into(),
        }
    }
}

impl MembershipFilter for ChildOf {
    fn accepts(&self, path: &Path) -> bool {
        path.parent() == Some(self.parent.as_path())
    }
}

/// Accepts paths of a given [`ItemKind`].
#[derive(Debug, Clone, Copy)]
pub struct KindFilter(pub ItemKind);

impl MembershipFilter for KindFilter {
    fn accepts(&self, path: &Path) -> bool {
        match self.0 {
            ItemKind::Any => true,
            ItemKind::Files => path.is_file(),
            ItemKind::Directories => path.is_dir(),
        }
    }
}

/// Rejects paths whose file name matches any of a set of wildcard patterns.
#[derive(Debug, Clone, Default)]
pub struct ExcludePatterns {
    patterns: Vec<WildMatch>,
}

impl ExcludePatterns {
    /// Compile the given patterns. Blank patterns are an error.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                let p = p.as_ref();
                if p.trim().is_empty() {
                    Err(InboxError::InvalidPattern(p.to_string()))
                } else {
                    Ok(WildMatch::new(p))
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl MembershipFilter for ExcludePatterns {
    fn accepts(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let name = name.to_string_lossy();
        !self.patterns.iter().any(|p| p.matches(&name))
    }
}

/// Accepts a path only if every inner filter accepts it.
#[derive(Clone, Default)]
pub struct AllOf {
    filters: Vec<Arc<dyn MembershipFilter>>,
}

impl AllOf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter to the conjunction.
    pub fn and(mut self, filter: impl MembershipFilter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Add an already shared filter to the conjunction.
    pub fn and_shared(mut self, filter: Arc<dyn MembershipFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Build the filter described by a config: items of the configured kind,
    /// not excluded by pattern. The inbox adds the "direct child" check when
    /// it is built.
    pub fn from_config(config: &InboxConfig) -> Result<Self> {
        let mut filter = Self::new();
        if config.item_kind != ItemKind::Any {
            filter = filter.and(KindFilter(config.item_kind));
        }
        let excludes = ExcludePatterns::new(config.exclude_patterns.as_slice())?;
        if !excludes.is_empty() {
            filter = filter.and(excludes);
        }
        Ok(filter)
    }
}

impl MembershipFilter for AllOf {
    fn accepts(&self, path: &Path) -> bool {
        self.filters.iter().all(|f| f.accepts(path))
    }
}

impl fmt::Debug for AllOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllOf")
            .field("filters", &self.filters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_child_of() {
        let filter = ChildOf::new("/inbox");

        assert!(filter.accepts(Path::new("/inbox/a.txt")));
        assert!(!filter.accepts(Path::new("/inbox/sub/a.txt")));
        assert!(!filter.accepts(Path::new("/elsewhere/a.txt")));
        assert!(!filter.accepts(Path::new("/inbox")));
    }

    #[test]
    fn test_kind_filter() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.txt");
        let dir = temp_dir.path().join("deposit");
        fs::write(&file, "x").unwrap();
        fs::create_dir(&dir).unwrap();

        assert!(KindFilter(ItemKind::Files).accepts(&file));
        assert!(!KindFilter(ItemKind::Files).accepts(&dir));
        assert!(KindFilter(ItemKind::Directories).accepts(&dir));
        assert!(!KindFilter(ItemKind::Directories).accepts(&file));
        assert!(KindFilter(ItemKind::Any).accepts(&file));
    }

    #[test]
    fn test_exclude_patterns() {
        let filter = ExcludePatterns::new(&[".*", "*.part"]).unwrap();

        assert!(filter.accepts(Path::new("/inbox/bag.zip")));
        assert!(!filter.accepts(Path::new("/inbox/.DS_Store")));
        assert!(!filter.accepts(Path::new("/inbox/upload.part")));
        assert!(ExcludePatterns::new(&[""]).is_err());
    }

    #[test]
    fn test_all_of_from_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = InboxConfig::new(temp_dir.path())
            .with_item_kind(ItemKind::Files)
            .exclude("*.tmp");
        fs::write(temp_dir.path().join("keep.txt"), "x").unwrap();
        fs::write(temp_dir.path().join("skip.tmp"), "x").unwrap();
        fs::create_dir(temp_dir.path().join("dir")).unwrap();

        let filter = AllOf::from_config(&config).unwrap();

        assert!(filter.accepts(&temp_dir.path().join("keep.txt")));
        assert!(!filter.accepts(&temp_dir.path().join("skip.tmp")));
        assert!(!filter.accepts(&temp_dir.path().join("dir")));
        assert_eq!(format!("{filter:?}"), "AllOf { filters: 2 }");
    }

    #[test]
    fn test_closure_filter() {
        let filter = AllOf::new()
            .and(ChildOf::new("/inbox"))
            .and(|p: &Path| p.extension().is_some_and(|e| e == "zip"));

        assert!(filter.accepts(Path::new("/inbox/bag.zip")));
        assert!(!filter.accepts(Path::new("/inbox/bag.tar")));
    }
}
