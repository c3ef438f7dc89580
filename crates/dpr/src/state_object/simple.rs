//! State object for stores that checkpoint and restore synchronously.
//!
//! [`SimpleStateObject`] wraps a non-versioned [`CheckpointStore`] and takes
//! care of versioning: batches run under the object's [`VersionScheme`], and
//! checkpoints/restores run as exclusive version transitions.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use tracing::{error, info};

use super::StateObject;
use super::callbacks::DprWorkerCallbacks;
use super::checkpoint::{CheckpointHandle, PersistNotifier};
use crate::core::{
    CheckpointId, CheckpointToken, DprConfig, DprError, DprResult, StoreOperation, Version,
    VersionSchemeConfig, VersionTransition, Worker,
};
use crate::version_scheme::{VersionGuard, VersionScheme};

/// A store with blocking checkpoint and restore routines and no notion of
/// versions.
///
/// Neither routine is ever interleaved with batches, with each other, or
/// with another call of itself.
pub trait CheckpointStore: Send + Sync {
    /// Store-specific failure
    type Error: StdError + Send + Sync + 'static;

    /// Finalize a checkpoint of the state as of `version`.
    ///
    /// May return as soon as the checkpoint content is fixed. `on_persist`
    /// must be fired exactly once, during this call or later from any
    /// thread, when the checkpoint is recoverable.
    fn perform_checkpoint(
        &self,
        version: Version,
        on_persist: PersistNotifier,
    ) -> Result<CheckpointToken, Self::Error>;

    /// Rewind all future reads and writes to the checkpoint of `version`.
    ///
    /// Returns only once the restored state is in effect.
    fn restore_checkpoint(&self, version: Version) -> Result<(), Self::Error>;
}

/// Reference [`StateObject`] over a synchronous [`CheckpointStore`]
pub struct SimpleStateObject<S> {
    store: S,
    scheme: VersionScheme,
    callbacks: Arc<dyn DprWorkerCallbacks>,
    worker: Option<Worker>,
}

impl<S: CheckpointStore> SimpleStateObject<S> {
    /// State object at [`Version::ZERO`] with default scheme settings
    pub fn new(store: S, callbacks: impl DprWorkerCallbacks + 'static) -> Self {
        Self {
            store,
            scheme: VersionScheme::new(),
            callbacks: Arc::new(callbacks),
            worker: None,
        }
    }

    /// State object configured for one worker
    pub fn from_config(
        config: &DprConfig,
        store: S,
        callbacks: impl DprWorkerCallbacks + 'static,
    ) -> DprResult<Self> {
        Self::builder(store)
            .worker(config.worker)
            .scheme_config(config.scheme.clone())
            .callbacks(callbacks)
            .build()
    }

    /// Start building a state object
    pub fn builder(store: S) -> SimpleStateObjectBuilder<S> {
        SimpleStateObjectBuilder {
            store,
            callbacks: None,
            scheme: VersionSchemeConfig::default(),
            initial_version: Version::ZERO,
            worker: None,
        }
    }

    /// Underlying store, for batch code running under [`protect`](Self::protect)
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Scheme batches must enter before touching the store
    pub fn version_scheme(&self) -> &VersionScheme {
        &self.scheme
    }

    /// Worker identity, when configured
    pub fn worker(&self) -> Option<Worker> {
        self.worker
    }

    /// Bind a batch to the current version
    pub fn protect(&self) -> VersionGuard<'_> {
        self.scheme.protect()
    }

    /// Run `batch` against the store within a single version
    pub fn execute<R>(&self, batch: impl FnOnce(Version, &S) -> R) -> R {
        let guard = self.scheme.protect();
        batch(guard.version(), &self.store)
    }

    fn checkpoint_transition(
        &self,
        transition: VersionTransition,
    ) -> DprResult<CheckpointHandle> {
        let version = transition.from;
        let (notifier, durable) = PersistNotifier::new(version, Arc::clone(&self.callbacks));
        let token = self
            .store
            .perform_checkpoint(version, notifier)
            .map_err(|e| {
                error!(worker = ?self.worker, %version, error = %e, "checkpoint failed");
                DprError::store(StoreOperation::Checkpoint, version, e)
            })?;
        info!(worker = ?self.worker, %version, token = token.get(), "checkpoint finalized");
        Ok(CheckpointHandle::new(CheckpointId { version, token }, durable))
    }

    fn restore_transition(
        &self,
        version: Version,
        transition: VersionTransition,
    ) -> DprResult<VersionTransition> {
        self.store.restore_checkpoint(version).map_err(|e| {
            error!(worker = ?self.worker, %version, error = %e, "restore failed");
            DprError::store(StoreOperation::Restore, version, e)
        })?;
        self.callbacks.on_rollback_complete();
        info!(worker = ?self.worker, restored = %version, resumed = %transition.to, "rollback complete");
        Ok(transition)
    }
}

impl<S: CheckpointStore> StateObject for SimpleStateObject<S> {
    fn version(&self) -> Version {
        self.scheme.current_version()
    }

    fn begin_checkpoint(&self, target: Option<Version>) -> DprResult<CheckpointHandle> {
        self.scheme
            .advance_version(target, |transition| self.checkpoint_transition(transition))
    }

    fn begin_restore(&self, version: Version) -> DprResult<VersionTransition> {
        self.scheme
            .advance_version(None, |transition| self.restore_transition(version, transition))
    }
}

impl<S> fmt::Debug for SimpleStateObject<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleStateObject")
            .field("worker", &self.worker)
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SimpleStateObject`]
#[must_use]
pub struct SimpleStateObjectBuilder<S> {
    store: S,
    callbacks: Option<Arc<dyn DprWorkerCallbacks>>,
    scheme: VersionSchemeConfig,
    initial_version: Version,
    worker: Option<Worker>,
}

impl<S: CheckpointStore> SimpleStateObjectBuilder<S> {
    /// Register the lifecycle callback sink
    pub fn callbacks(mut self, callbacks: impl DprWorkerCallbacks + 'static) -> Self {
        self.callbacks = Some(Arc::new(callbacks));
        self
    }

    /// Version scheme settings
    pub fn scheme_config(mut self, config: VersionSchemeConfig) -> Self {
        self.scheme = config;
        self
    }

    /// Version to resume at, e.g. the last recovered version after a restart
    pub fn initial_version(mut self, version: Version) -> Self {
        self.initial_version = version;
        self
    }

    /// Worker identity used in logs
    pub fn worker(mut self, worker: Worker) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Finish building.
    ///
    /// Fails with [`DprError::CallbacksNotRegistered`] if no callback sink
    /// was supplied, or with [`DprError::InvalidConfig`] for a bad scheme
    /// configuration.
    pub fn build(self) -> DprResult<SimpleStateObject<S>> {
        let callbacks = self.callbacks.ok_or(DprError::CallbacksNotRegistered)?;
        self.scheme.validate()?;
        Ok(SimpleStateObject {
            store: self.store,
            scheme: VersionScheme::with_version(self.initial_version, self.scheme),
            callbacks,
            worker: self.worker,
        })
    }
}
