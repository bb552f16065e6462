//! Round-to-round diffing of the watched directory.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::ordering::OrderingPolicy;

/// Items discovered within one round, before ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingBatch {
    items: Vec<PathBuf>,
}

impl PendingBatch {
    /// Create a batch from discovered items.
    pub fn new(items: Vec<PathBuf>) -> Self {
        Self { items }
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get the number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Consume the batch, yielding its items in dispatch order.
    pub fn into_ordered(mut self, ordering: &dyn OrderingPolicy) -> Vec<PathBuf> {
        ordering.sort(&mut self.items);
        self.items
    }
}

impl FromIterator<PathBuf> for PendingBatch {
    fn from_iter<I: IntoIterator<Item = PathBuf>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Last-known listing of the watched directory.
///
/// Owned by the poll loop alone. Only ever replaced by a complete, successful
/// listing; a failed listing leaves it untouched.
#[derive(Debug, Clone, Default)]
pub struct PollState {
    known: HashSet<PathBuf>,
}

impl PollState {
    /// Start from the listing taken by the startup snapshot.
    pub fn new(baseline: HashSet<PathBuf>) -> Self {
        Self { known: baseline }
    }

    /// Items recorded at the end of the previous round.
    pub fn known(&self) -> &HashSet<PathBuf> {
        &self.known
    }

    /// Record `current` as the new last-known listing and return what was not
    /// present in the previous one.
    ///
    /// Items that disappeared are dropped from the listing without being
    /// reported. A name that disappears in one round and reappears in a later
    /// one is reported again; a delete and re-create between two rounds is
    /// indistinguishable from no change and is not.
    pub fn advance(&mut self, current: HashSet<PathBuf>) -> PendingBatch {
        let batch = current
            .iter()
            .filter(|path| !self.known.contains(*path))
            .cloned()
            .collect();
        self.known = current;
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ordering::ByFileName;
    use pretty_assertions::assert_eq;

    fn set(paths: &[&str]) -> HashSet<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_baseline_items_are_not_new() {
        let mut state = PollState::new(set(&["/inbox/x.txt"]));

        let batch = state.advance(set(&["/inbox/x.txt"]));

        assert!(batch.is_empty());
    }

    #[test]
    fn test_new_items_are_reported_once() {
        let mut state = PollState::default();

        let batch = state.advance(set(&["/inbox/b.txt", "/inbox/a.txt"]));
        assert_eq!(
            batch.into_ordered(&ByFileName),
            vec![PathBuf::from("/inbox/a.txt"), PathBuf::from("/inbox/b.txt")]
        );

        let batch = state.advance(set(&["/inbox/b.txt", "/inbox/a.txt"]));
        assert!(batch.is_empty());
    }

    #[test]
    fn test_removals_are_not_reported() {
        let mut state = PollState::new(set(&["/inbox/a.txt", "/inbox/b.txt"]));

        let batch = state.advance(set(&["/inbox/a.txt"]));

        assert!(batch.is_empty());
        assert_eq!(state.known(), &set(&["/inbox/a.txt"]));
    }

    #[test]
    fn test_reappearing_item_is_new_again() {
        let mut state = PollState::new(set(&["/inbox/a.txt"]));

        state.advance(set(&[]));
        let batch = state.advance(set(&["/inbox/a.txt"]));

        assert_eq!(batch.len(), 1);
    }
}
