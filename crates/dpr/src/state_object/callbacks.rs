//! Lifecycle sink notified by state objects

use std::sync::Arc;

use crate::core::Version;

/// Receives the version lifecycle of one worker.
///
/// These are the only signals the DPR finder gets from a worker's local
/// lifecycle. For every checkpoint `on_version_end(v)` arrives strictly before
/// `on_version_persistent(v)`; a restore delivers only
/// `on_rollback_complete`.
pub trait DprWorkerCallbacks: Send + Sync {
    /// `version` will receive no more operations
    fn on_version_end(&self, version: Version);

    /// `version` is durable and can be recovered to
    fn on_version_persistent(&self, version: Version);

    /// A restore finished; the worker runs from the restored state
    fn on_rollback_complete(&self);
}

impl<C: DprWorkerCallbacks + ?Sized> DprWorkerCallbacks for Arc<C> {
    fn on_version_end(&self, version: Version) {
        (**self).on_version_end(version);
    }

    fn on_version_persistent(&self, version: Version) {
        (**self).on_version_persistent(version);
    }

    fn on_rollback_complete(&self) {
        (**self).on_rollback_complete();
    }
}
