//! Worker pools that execute inbox tasks.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use async_channel::{Receiver, Sender, TrySendError};
use tracing::{debug, error};

use crate::config::WorkerPoolConfig;
use crate::dispatch::InboxTask;
use crate::error::{InboxError, Result};

/// Executes submitted tasks asynchronously.
///
/// `submit` is called from the poll loop and must not block: a pool that
/// cannot accept a task returns an error instead of waiting for room.
pub trait WorkerPool: Send + Sync {
    /// Hand a task off for execution.
    fn submit(&self, task: InboxTask) -> Result<()>;
}

impl<P: WorkerPool + ?Sized> WorkerPool for Arc<P> {
    fn submit(&self, task: InboxTask) -> Result<()> {
        (**self).submit(task)
    }
}

/// Runs tasks on the blocking thread pool of a tokio runtime.
impl WorkerPool for tokio::runtime::Handle {
    fn submit(&self, task: InboxTask) -> Result<()> {
        self.spawn_blocking(task);
        Ok(())
    }
}

/// A fixed set of named worker threads fed from a shared queue.
///
/// Dropping the pool (or calling [`ThreadPool::shutdown`]) stops accepting
/// tasks; tasks already queued still run.
pub struct ThreadPool {
    sender: Sender<InboxTask>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    /// Spawn the worker threads described by `config`.
    ///
    /// Fails with [`InboxError::Config`] when `config` asks for no threads or
    /// a zero-capacity queue.
    pub fn new(config: &WorkerPoolConfig) -> Result<Self> {
        config.validate()?;

        let (sender, receiver) = match config.max_queue_size {
            Some(size) => async_channel::bounded(size),
            None => async_channel::unbounded(),
        };

        let mut workers = Vec::with_capacity(config.threads);
        for n in 0..config.threads {
            let receiver = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("{}-{n}", config.name_prefix))
                .spawn(move || run_worker(receiver))
                .map_err(InboxError::WorkerSpawn)?;
            workers.push(handle);
        }

        debug!(
            "Started {} worker thread(s) named {}-*",
            config.threads, config.name_prefix
        );
        Ok(Self {
            sender,
            workers: Mutex::new(workers),
        })
    }

    /// A pool with one dedicated worker and an unbounded queue.
    pub fn single() -> Result<Self> {
        Self::new(&WorkerPoolConfig::default())
    }

    /// Number of tasks waiting for a worker.
    pub fn queued(&self) -> usize {
        self.sender.len()
    }

    /// Stop accepting new tasks. Queued tasks still run.
    pub fn shutdown(&self) {
        self.sender.close();
    }

    /// Stop accepting new tasks and wait until every queued task has run.
    pub fn join(&self) {
        self.shutdown();
        let workers = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for worker in workers {
            if worker.join().is_err() {
                error!("Inbox worker thread terminated abnormally");
            }
        }
    }
}

impl WorkerPool for ThreadPool {
    fn submit(&self, task: InboxTask) -> Result<()> {
        self.sender.try_send(task).map_err(|e| match e {
            TrySendError::Full(_) => InboxError::QueueFull,
            TrySendError::Closed(_) => InboxError::PoolShutdown,
        })
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("queued", &self.queued())
            .finish()
    }
}

fn run_worker(receiver: Receiver<InboxTask>) {
    while let Ok(task) = receiver.recv_blocking() {
        if std::panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!("Inbox task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_single_worker_runs_tasks_in_order() {
        let pool = ThreadPool::single().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let seen = seen.clone();
            pool.submit(Box::new(move || seen.lock().unwrap().push(i)))
                .unwrap();
        }
        pool.join();

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_bounded_queue_rejects_when_full() {
        let config = WorkerPoolConfig::default().with_max_queue_size(1);
        let pool = ThreadPool::new(&config).unwrap();
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        pool.submit(Box::new(move || {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        }))
        .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        pool.submit(Box::new(|| {})).unwrap();
        let result = pool.submit(Box::new(|| {}));
        assert!(matches!(result, Err(InboxError::QueueFull)));

        release_tx.send(()).unwrap();
        pool.join();
    }

    #[test]
    fn test_unusable_configs_are_rejected() {
        let no_threads = WorkerPoolConfig::default().with_threads(0);
        assert!(matches!(
            ThreadPool::new(&no_threads),
            Err(InboxError::Config(_))
        ));

        let no_room = WorkerPoolConfig::default().with_max_queue_size(0);
        assert!(matches!(
            ThreadPool::new(&no_room),
            Err(InboxError::Config(_))
        ));
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let pool = ThreadPool::single().unwrap();
        pool.shutdown();

        let result = pool.submit(Box::new(|| {}));

        assert!(matches!(result, Err(InboxError::PoolShutdown)));
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        let pool = ThreadPool::single().unwrap();
        let count = Arc::new(AtomicUsize::new(0));

        pool.submit(Box::new(|| panic!("task failure"))).unwrap();
        let c = count.clone();
        pool.submit(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
        pool.join();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_runtime_handle_as_pool() {
        let handle = tokio::runtime::Handle::current();
        let (tx, rx) = tokio::sync::oneshot::channel();

        handle
            .submit(Box::new(move || {
                let _ = tx.send(42);
            }))
            .unwrap();

        assert_eq!(rx.await.unwrap(), 42);
    }
}
