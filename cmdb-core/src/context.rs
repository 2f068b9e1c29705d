//! Cancellable execution context handed to every storage call.
//!
//! Steps never poll the context themselves. Storage backends call
//! [`UpgradeContext::ensure_active`] on entry, so a cancelled run fails at its
//! next storage call and unwinds through ordinary error propagation.

use crate::error::StorageError;
use crate::identity::{new_run_id, RunId};
use std::sync::Arc;
use tokio::sync::watch;

/// Per-run context: run identifier plus cancellation signal.
#[derive(Debug, Clone)]
pub struct UpgradeContext {
    run_id: RunId,
    cancelled: watch::Receiver<bool>,
}

/// Sender half used to cancel an [`UpgradeContext`] and all its clones.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // send_replace never fails, even with no receivers left
        self.tx.send_replace(true);
    }
}

impl UpgradeContext {
    /// A context that can be cancelled through the returned handle.
    pub fn cancellable() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                run_id: new_run_id(),
                cancelled: rx,
            },
            CancelHandle { tx: Arc::new(tx) },
        )
    }

    /// A context that is never cancelled.
    pub fn background() -> Self {
        Self::cancellable().0
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Fail with [`StorageError::Cancelled`] once the run has been cancelled.
    pub fn ensure_active(&self) -> Result<(), StorageError> {
        if self.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        Ok(())
    }
}
