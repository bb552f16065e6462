//! Turning discovered paths into tasks and handing them to a worker pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::pool::WorkerPool;

/// A unit of work produced for one inbox item.
pub type InboxTask = Box<dyn FnOnce() + Send + 'static>;

/// Builds the task that processes one inbox item.
///
/// Implemented for any `Fn(&Path) -> anyhow::Result<InboxTask>`. Called on the
/// poll loop, so an implementation must return promptly; the actual work
/// belongs in the returned task.
pub trait TaskFactory: Send + Sync {
    /// Create the task for the item at `path`.
    fn create_task(&self, path: &Path) -> anyhow::Result<InboxTask>;
}

impl<F> TaskFactory for F
where
    F: Fn(&Path) -> anyhow::Result<InboxTask> + Send + Sync,
{
    fn create_task(&self, path: &Path) -> anyhow::Result<InboxTask> {
        self(path)
    }
}

/// Outcome of dispatching one ordered batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Items handed to the worker pool.
    pub submitted: usize,

    /// Items skipped because no task could be created or submitted.
    pub failed: usize,
}

/// Hands ordered batches of items to the worker pool, one task per item.
#[derive(Clone)]
pub struct Dispatcher {
    factory: Arc<dyn TaskFactory>,
    pool: Arc<dyn WorkerPool>,
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new(factory: Arc<dyn TaskFactory>, pool: Arc<dyn WorkerPool>) -> Self {
        Self { factory, pool }
    }

    /// Submit every item of `ordered`, in iteration order.
    ///
    /// A failure for one item is logged and skipped; it never prevents the
    /// remaining items from being submitted.
    pub fn submit<I>(&self, ordered: I) -> DispatchReport
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut report = DispatchReport::default();

        for path in ordered {
            let task = match self.factory.create_task(&path) {
                Ok(task) => task,
                Err(e) => {
                    warn!("Could not create task for {}: {e:#}", path.display());
                    report.failed += 1;
                    continue;
                }
            };

            match self.pool.submit(task) {
                Ok(()) => {
                    debug!("Submitted task for {}", path.display());
                    report.submitted += 1;
                }
                Err(e) => {
                    warn!("Could not submit task for {}: {e}", path.display());
                    report.failed += 1;
                }
            }
        }

        report
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}
