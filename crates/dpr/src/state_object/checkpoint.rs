//! Two-phase checkpoint results.
//!
//! A checkpoint is *finalized* when the store's checkpoint routine returns
//! and *durable* when the store fires the [`PersistNotifier`] it was handed.
//! The two phases reach the caller separately: the finalized identity through
//! [`CheckpointHandle::id`], durability through
//! [`CheckpointHandle::wait_durable`].

use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{info, warn};

use super::callbacks::DprWorkerCallbacks;
use crate::core::{CheckpointId, CheckpointToken, DprError, DprResult, Version};

/// Consume-once signal a store fires when a checkpoint is recoverable.
///
/// Firing delivers `on_version_end` then `on_version_persistent` to the
/// worker's callbacks and resolves the matching [`CheckpointHandle`]. The
/// notifier is `Send`, so stores that persist asynchronously may move it to
/// another thread and fire it there.
pub struct PersistNotifier {
    version: Version,
    callbacks: Arc<dyn DprWorkerCallbacks>,
    durable: Option<oneshot::Sender<()>>,
}

impl PersistNotifier {
    pub(crate) fn new(
        version: Version,
        callbacks: Arc<dyn DprWorkerCallbacks>,
    ) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let notifier = Self {
            version,
            callbacks,
            durable: Some(tx),
        };
        (notifier, rx)
    }

    /// Version being checkpointed
    pub fn version(&self) -> Version {
        self.version
    }

    /// Report the checkpoint as durable
    pub fn notify(mut self) {
        self.callbacks.on_version_end(self.version);
        self.callbacks.on_version_persistent(self.version);
        if let Some(tx) = self.durable.take() {
            // The handle may already be gone; callbacks are what the
            // coordinator consumes.
            let _ = tx.send(());
        }
        info!(version = %self.version, "checkpoint durable");
    }
}

impl fmt::Debug for PersistNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistNotifier")
            .field("version", &self.version)
            .field("fired", &self.durable.is_none())
            .finish_non_exhaustive()
    }
}

impl Drop for PersistNotifier {
    fn drop(&mut self) {
        if self.durable.is_some() {
            warn!(version = %self.version, "persist notifier dropped without reporting durability");
        }
    }
}

/// A finalized checkpoint whose durability may still be pending
#[derive(Debug)]
pub struct CheckpointHandle {
    id: CheckpointId,
    durable: oneshot::Receiver<()>,
    observed: bool,
}

impl CheckpointHandle {
    pub(crate) fn new(id: CheckpointId, durable: oneshot::Receiver<()>) -> Self {
        Self {
            id,
            durable,
            observed: false,
        }
    }

    /// Identity of the finalized checkpoint
    pub fn id(&self) -> CheckpointId {
        self.id
    }

    /// Version the checkpoint captures
    pub fn version(&self) -> Version {
        self.id.version
    }

    /// Store token of the checkpoint
    pub fn token(&self) -> CheckpointToken {
        self.id.token
    }

    /// Non-blocking durability check
    pub fn is_durable(&mut self) -> bool {
        if !self.observed && self.durable.try_recv().is_ok() {
            self.observed = true;
        }
        self.observed
    }

    /// Wait until the store reports the checkpoint durable
    pub async fn wait_durable(self) -> DprResult<CheckpointId> {
        if self.observed {
            return Ok(self.id);
        }
        let id = self.id;
        self.durable
            .await
            .map(|()| id)
            .map_err(|_| DprError::DurabilityAbandoned { version: id.version })
    }

    /// Blocking variant of [`wait_durable`](Self::wait_durable).
    ///
    /// Must not be called from within an async runtime.
    pub fn blocking_wait_durable(self) -> DprResult<CheckpointId> {
        if self.observed {
            return Ok(self.id);
        }
        let id = self.id;
        self.durable
            .blocking_recv()
            .map(|()| id)
            .map_err(|_| DprError::DurabilityAbandoned { version: id.version })
    }
}
