//! # Inbox
//!
//! A managed inbox watches one directory and hands every item that appears
//! in it (a file or a directory that is a direct child) to a worker pool,
//! exactly once per run.
//!
//! ## Features
//!
//! - **Startup Snapshot**: Items already present are dispatched first, in order
//! - **Polling**: The directory is re-listed every interval and diffed
//! - **Filtering**: Only accepted direct children are inbox items
//! - **Ordering**: Items found in the same round are dispatched in a fixed order
//! - **Lifecycle Gate**: Start can be held back until another component is ready
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Inbox                                  │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Scanner ──► PollState ──► PendingBatch ──► Dispatcher          │
//! │     │                          │                │               │
//! │     ▼                          ▼                ▼               │
//! │  MembershipFilter        OrderingPolicy    TaskFactory ──► Pool │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::time::Duration;
//!
//! use svckit_inbox::{Inbox, InboxTask};
//!
//! # async fn run() -> svckit_inbox::Result<()> {
//! let handle = Inbox::builder("/var/opt/inbox")
//!     .interval(Duration::from_millis(500))
//!     .task_factory(|path: &Path| -> anyhow::Result<InboxTask> {
//!         let path = path.to_path_buf();
//!         Ok(Box::new(move || println!("processing {}", path.display())))
//!     })
//!     .build()?
//!     .start()
//!     .await?;
//!
//! handle.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod gate;
pub mod inbox;
pub mod ordering;
pub mod poll;
pub mod pool;
pub mod scanner;

pub use config::{InboxConfig, ItemKind, OrderingKind, WorkerPoolConfig};
pub use dispatch::{DispatchReport, Dispatcher, InboxTask, TaskFactory};
pub use error::{InboxError, Result};
pub use filter::{AllOf, ChildOf, ExcludePatterns, KindFilter, MembershipFilter};
pub use gate::{GateOpener, LifecycleGate, lifecycle_gate};
pub use inbox::{Inbox, InboxBuilder, InboxHandle, InboxState, PollHook};
pub use ordering::{ByCreationTime, ByFileName, OrderingPolicy};
pub use poll::{PendingBatch, PollState};
pub use pool::{ThreadPool, WorkerPool};
pub use scanner::{Scanner, Snapshot};
