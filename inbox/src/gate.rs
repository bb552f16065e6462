//! One-shot barrier that can hold back an inbox's start.

use tokio::sync::oneshot;

use crate::error::{InboxError, Result};

/// Create a closed gate together with the handle that opens it.
pub fn lifecycle_gate() -> (GateOpener, LifecycleGate) {
    let (tx, rx) = oneshot::channel();
    (GateOpener { tx }, LifecycleGate { rx })
}

/// Opens a [`LifecycleGate`]. Dropping it unopened closes the gate for good.
#[derive(Debug)]
pub struct GateOpener {
    tx: oneshot::Sender<()>,
}

impl GateOpener {
    /// Release the waiting inbox.
    pub fn open(self) {
        // The gate may already be gone if the inbox was dropped before start.
        let _ = self.tx.send(());
    }
}

/// The waiting side of the barrier, owned by the inbox.
#[derive(Debug)]
pub struct LifecycleGate {
    rx: oneshot::Receiver<()>,
}

impl LifecycleGate {
    /// Wait until the gate opens.
    ///
    /// Fails with [`InboxError::GateClosed`] if the opener is dropped first.
    pub async fn wait(self) -> Result<()> {
        self.rx.await.map_err(|_| InboxError::GateClosed)
    }
}
