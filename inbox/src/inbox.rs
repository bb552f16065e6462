//! The managed inbox: lifecycle, startup snapshot and poll loop.

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use crate::config::{DEFAULT_INTERVAL_MS, InboxConfig, WorkerPoolConfig};
use crate::dispatch::{Dispatcher, TaskFactory};
use crate::error::{InboxError, Result};
use crate::filter::{AllOf, ChildOf, MembershipFilter};
use crate::gate::LifecycleGate;
use crate::ordering::{self, ByFileName, OrderingPolicy};
use crate::poll::PollState;
use crate::pool::{ThreadPool, WorkerPool};
use crate::scanner::Scanner;

/// Callback invoked at the start of every polling round.
pub type PollHook = Arc<dyn Fn() + Send + Sync>;

/// Lifecycle of an inbox.
///
/// `Created → [AwaitingGate →] Scanning → Polling → Stopped`. A failed start
/// ends in `Stopped` as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxState {
    /// Configured, not yet started.
    Created,

    /// Waiting for the lifecycle gate to open.
    AwaitingGate,

    /// Taking and dispatching the startup snapshot.
    Scanning,

    /// Poll loop running.
    Polling,

    /// No further rounds will run.
    Stopped,
}

/// Builder for an [`Inbox`].
pub struct InboxBuilder {
    path: PathBuf,
    filter: Option<Arc<dyn MembershipFilter>>,
    ordering: Arc<dyn OrderingPolicy>,
    interval: Duration,
    pool: Option<Arc<dyn WorkerPool>>,
    worker: WorkerPoolConfig,
    on_poll: Option<PollHook>,
    gate: Option<LifecycleGate>,
    task_factory: Option<Arc<dyn TaskFactory>>,
}

impl InboxBuilder {
    /// Start building an inbox for `path` with every option at its default.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            filter: None,
            ordering: Arc::new(ByFileName),
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            pool: None,
            worker: WorkerPoolConfig::default(),
            on_poll: None,
            gate: None,
            task_factory: None,
        }
    }

    /// Start from a data configuration.
    pub fn from_config(config: &InboxConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = Self::new(&config.path);
        builder.filter = Some(Arc::new(AllOf::from_config(config)?));
        builder.ordering = ordering::from_kind(config.ordering);
        builder.interval = config.interval();
        builder.worker = config.worker.clone();
        Ok(builder)
    }

    /// Set the task factory. Required.
    pub fn task_factory(mut self, factory: impl TaskFactory + 'static) -> Self {
        self.task_factory = Some(Arc::new(factory));
        self
    }

    /// Restrict which direct children are inbox items.
    ///
    /// The filter is always combined with "direct child of the watched
    /// directory"; it can narrow the inbox but never widen it.
    pub fn filter(mut self, filter: impl MembershipFilter + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Set the dispatch order for items found in the same round.
    pub fn ordering(mut self, ordering: impl OrderingPolicy + 'static) -> Self {
        self.ordering = Arc::new(ordering);
        self
    }

    /// Set the polling interval. Zero means the default.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = if interval.is_zero() {
            Duration::from_millis(DEFAULT_INTERVAL_MS)
        } else {
            interval
        };
        self
    }

    /// Use an existing worker pool instead of the inbox's own threads.
    pub fn worker_pool(mut self, pool: impl WorkerPool + 'static) -> Self {
        self.pool = Some(Arc::new(pool));
        self
    }

    /// Configure the inbox's own worker threads.
    pub fn worker_config(mut self, worker: WorkerPoolConfig) -> Self {
        self.worker = worker;
        self
    }

    /// Register a callback run at the start of every polling round.
    ///
    /// Runs on the poll loop and must not block. A panicking hook is logged
    /// and the round goes on.
    pub fn on_poll(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_poll = Some(Arc::new(hook));
        self
    }

    /// Hold back the start until `gate` opens.
    pub fn gate(mut self, gate: LifecycleGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Freeze the configuration into an inbox.
    ///
    /// Spawns the inbox's own worker threads when no pool was supplied.
    pub fn build(self) -> Result<Inbox> {
        let factory = self.task_factory.ok_or(InboxError::MissingTaskFactory)?;

        let child_of = ChildOf::new(&self.path);
        let filter: Arc<dyn MembershipFilter> = match self.filter {
            Some(filter) => Arc::new(AllOf::new().and(child_of).and_shared(filter)),
            None => Arc::new(child_of),
        };

        let pool: Arc<dyn WorkerPool> = match self.pool {
            Some(pool) => pool,
            None => Arc::new(ThreadPool::new(&self.worker)?),
        };

        let on_poll: PollHook = match self.on_poll {
            Some(hook) => hook,
            None => Arc::new(|| {}),
        };
        let (state, _) = watch::channel(InboxState::Created);

        Ok(Inbox {
            scanner: Scanner::new(&self.path, filter, self.ordering),
            dispatcher: Dispatcher::new(factory, pool),
            interval: self.interval,
            on_poll,
            gate: self.gate,
            state,
        })
    }
}

/// A configured, not yet started inbox.
///
/// Watches one directory and dispatches every item that appears in it, once,
/// to a worker pool. Items already present at start are dispatched first, in
/// order; items appearing later are picked up by a poll loop that re-lists the
/// directory every interval.
pub struct Inbox {
    scanner: Scanner,
    dispatcher: Dispatcher,
    interval: Duration,
    on_poll: PollHook,
    gate: Option<LifecycleGate>,
    state: watch::Sender<InboxState>,
}

impl Inbox {
    /// Start building an inbox for `path`.
    pub fn builder(path: impl Into<PathBuf>) -> InboxBuilder {
        InboxBuilder::new(path)
    }

    /// The watched directory.
    pub fn path(&self) -> &Path {
        self.scanner.root()
    }

    /// The polling interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Follow the inbox's state from now on.
    pub fn subscribe(&self) -> watch::Receiver<InboxState> {
        self.state.subscribe()
    }

    /// Start the inbox.
    ///
    /// Waits for the gate (if any), dispatches the items already in the
    /// directory and then spawns the poll loop on the current tokio runtime.
    /// Consuming `self` makes the startup snapshot a one-time step.
    pub async fn start(mut self) -> Result<InboxHandle> {
        if let Some(gate) = self.gate.take() {
            self.transition(InboxState::AwaitingGate);
            info!(
                "Waiting for gate to open before starting inbox at '{}'",
                self.path().display()
            );
            if let Err(e) = gate.wait().await {
                return Err(self.fail(e));
            }
        }

        info!("Starting inbox at '{}'", self.path().display());
        self.transition(InboxState::Scanning);

        let scanner = self.scanner.clone();
        let snapshot = match tokio::task::spawn_blocking(move || scanner.scan()).await {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => return Err(self.fail(e)),
            Err(e) => return Err(self.fail(e.into())),
        };

        let baseline = snapshot.baseline();
        debug!("{} initial inbox item(s) detected", snapshot.len());
        let report = self.dispatcher.submit(snapshot);
        debug!(
            "Initial items processed: {} submitted, {} failed",
            report.submitted, report.failed
        );

        let cancel = CancellationToken::new();
        let poll_loop = PollLoop {
            scanner: self.scanner.clone(),
            dispatcher: self.dispatcher.clone(),
            state: PollState::new(baseline),
            interval: self.interval,
            on_poll: self.on_poll.clone(),
            cancel: cancel.clone(),
        };

        self.transition(InboxState::Polling);
        let task = tokio::spawn(poll_loop.run());

        Ok(InboxHandle {
            path: self.path().to_path_buf(),
            cancel: cancel.clone(),
            _guard: cancel.drop_guard(),
            task: Mutex::new(Some(task)),
            state: self.state,
        })
    }

    fn transition(&self, to: InboxState) {
        let from = self.state.send_replace(to);
        debug!("Inbox at '{}': {from:?} -> {to:?}", self.path().display());
    }

    fn fail(&self, e: InboxError) -> InboxError {
        error!("Could not start inbox at '{}': {e}", self.path().display());
        self.transition(InboxState::Stopped);
        e
    }
}

impl std::fmt::Debug for Inbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inbox")
            .field("path", &self.path())
            .field("interval", &self.interval)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

/// Handle to a running inbox.
///
/// Dropping the handle stops the poll loop as [`InboxHandle::stop`] does, but
/// without waiting for a round in progress.
pub struct InboxHandle {
    path: PathBuf,
    cancel: CancellationToken,
    _guard: DropGuard,
    task: Mutex<Option<JoinHandle<()>>>,
    state: watch::Sender<InboxState>,
}

impl InboxHandle {
    /// The watched directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current state.
    pub fn state(&self) -> InboxState {
        *self.state.borrow()
    }

    /// Check if the poll loop is running.
    pub fn is_running(&self) -> bool {
        self.state() == InboxState::Polling
    }

    /// Follow the inbox's state from now on.
    pub fn subscribe(&self) -> watch::Receiver<InboxState> {
        self.state.subscribe()
    }

    /// Stop polling.
    ///
    /// Waits for a round in progress to finish; once this returns no further
    /// round runs. Tasks already handed to the worker pool are left alone.
    /// Calling it again is a no-op.
    pub async fn stop(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(task) = task else {
            return;
        };

        info!("Stopping inbox at '{}'", self.path.display());
        self.cancel.cancel();
        if let Err(e) = task.await {
            error!("Poll loop for '{}' failed: {e}", self.path.display());
        }
        self.state.send_replace(InboxState::Stopped);
    }
}

impl std::fmt::Debug for InboxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboxHandle")
            .field("path", &self.path)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// State owned by the poll loop task. Rounds run one at a time.
struct PollLoop {
    scanner: Scanner,
    dispatcher: Dispatcher,
    state: PollState,
    interval: Duration,
    on_poll: PollHook,
    cancel: CancellationToken,
}

impl PollLoop {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut round: u64 = 0;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            round += 1;
            self.run_round(round).await;
        }

        debug!(
            "Poll loop for '{}' stopped after {round} round(s)",
            self.scanner.root().display()
        );
    }

    async fn run_round(&mut self, round: u64) {
        debug!(
            "Start polling round {round} for inbox at: {}",
            self.scanner.root().display()
        );
        if std::panic::catch_unwind(AssertUnwindSafe(|| (self.on_poll)())).is_err() {
            error!("Round-start hook panicked in polling round {round}");
        }

        let scanner = self.scanner.clone();
        let listing = match tokio::task::spawn_blocking(move || scanner.list()).await {
            Ok(Ok(listing)) => listing,
            Ok(Err(e)) => {
                warn!("Polling round {round} could not list inbox, retrying next round: {e}");
                return;
            }
            Err(e) => {
                warn!("Polling round {round} failed, retrying next round: {e}");
                return;
            }
        };

        let batch = self.state.advance(listing);
        if batch.is_empty() {
            return;
        }

        debug!("Processing {} created files and directories", batch.len());
        let ordered = batch.into_ordered(self.scanner.ordering());
        for item in &ordered {
            debug!("New inbox item detected at: {}", item.display());
        }
        self.dispatcher.submit(ordered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::InboxTask;
    use crate::gate::lifecycle_gate;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn noop_factory(_path: &Path) -> anyhow::Result<InboxTask> {
        Ok(Box::new(|| {}))
    }

    #[test]
    fn test_build_requires_task_factory() {
        let result = Inbox::builder("/tmp/inbox").build();
        assert!(matches!(result, Err(InboxError::MissingTaskFactory)));
    }

    #[test]
    fn test_zero_interval_uses_default() {
        let inbox = Inbox::builder("/tmp/inbox")
            .task_factory(noop_factory)
            .interval(Duration::ZERO)
            .build()
            .unwrap();

        assert_eq!(inbox.interval(), Duration::from_millis(DEFAULT_INTERVAL_MS));
    }

    #[test]
    fn test_from_config() {
        let config = InboxConfig::new("/tmp/inbox").with_interval(Duration::from_millis(20));

        let inbox = InboxBuilder::from_config(&config)
            .unwrap()
            .task_factory(noop_factory)
            .build()
            .unwrap();

        assert_eq!(inbox.path(), Path::new("/tmp/inbox"));
        assert_eq!(inbox.interval(), Duration::from_millis(20));
    }

    #[test]
    fn test_build_rejects_unusable_worker_config() {
        let result = Inbox::builder("/tmp/inbox")
            .task_factory(noop_factory)
            .worker_config(WorkerPoolConfig::default().with_max_queue_size(0))
            .build();
        assert!(matches!(result, Err(InboxError::Config(_))));

        let result = Inbox::builder("/tmp/inbox")
            .task_factory(noop_factory)
            .worker_config(WorkerPoolConfig::default().with_threads(0))
            .build();
        assert!(matches!(result, Err(InboxError::Config(_))));
    }

    #[test]
    fn test_from_config_filter_keeps_direct_children_only() {
        let config = InboxConfig::new("/tmp/inbox").exclude("*.part");

        let inbox = InboxBuilder::from_config(&config)
            .unwrap()
            .task_factory(noop_factory)
            .build()
            .unwrap();
        let filter = inbox.scanner.filter();

        assert!(filter.accepts(Path::new("/tmp/inbox/bag.zip")));
        assert!(!filter.accepts(Path::new("/tmp/inbox/bag.part")));
        assert!(!filter.accepts(Path::new("/tmp/inbox/sub/bag.zip")));
        assert!(!filter.accepts(Path::new("/elsewhere/bag.zip")));
    }

    #[tokio::test]
    async fn test_panicking_hook_keeps_polling() {
        let temp_dir = TempDir::new().unwrap();
        let rounds = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = rounds.clone();
        let handle = Inbox::builder(temp_dir.path())
            .task_factory(noop_factory)
            .interval(Duration::from_millis(10))
            .on_poll(move || {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                panic!("hook failure");
            })
            .build()
            .unwrap()
            .start()
            .await
            .unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while rounds.load(std::sync::atomic::Ordering::SeqCst) < 3 {
            assert!(tokio::time::Instant::now() < deadline, "poll loop died");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(handle.is_running());

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_start_fails_for_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let inbox = Inbox::builder(temp_dir.path().join("missing"))
            .task_factory(noop_factory)
            .build()
            .unwrap();
        let state = inbox.subscribe();

        let result = inbox.start().await;

        assert!(matches!(result, Err(InboxError::DirectoryNotFound(_))));
        assert_eq!(*state.borrow(), InboxState::Stopped);
    }

    #[tokio::test]
    async fn test_closed_gate_fails_start() {
        let temp_dir = TempDir::new().unwrap();
        let (opener, gate) = lifecycle_gate();
        let inbox = Inbox::builder(temp_dir.path())
            .task_factory(noop_factory)
            .gate(gate)
            .build()
            .unwrap();
        drop(opener);

        let result = inbox.start().await;

        assert!(matches!(result, Err(InboxError::GateClosed)));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let handle = Inbox::builder(temp_dir.path())
            .task_factory(noop_factory)
            .interval(Duration::from_millis(10))
            .build()
            .unwrap()
            .start()
            .await
            .unwrap();
        assert!(handle.is_running());

        handle.stop().await;
        handle.stop().await;

        assert_eq!(handle.state(), InboxState::Stopped);
    }
}
