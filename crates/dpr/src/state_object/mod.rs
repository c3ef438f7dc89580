//! State objects: the worker-side face of a versioned state store

pub mod callbacks;
pub mod checkpoint;
pub mod simple;

pub use callbacks::DprWorkerCallbacks;
pub use checkpoint::{CheckpointHandle, PersistNotifier};
pub use simple::{CheckpointStore, SimpleStateObject, SimpleStateObjectBuilder};

use crate::core::{DprResult, Version, VersionTransition};

/// A versioned piece of worker state that DPR can checkpoint and roll back.
///
/// The lifecycle callback sink is supplied when the object is constructed,
/// so every implementation has one before it can be checkpointed.
/// Checkpoint and restore share one exclusion rule: a request made while
/// another is running either waits or fails with
/// [`DprError::Contended`](crate::DprError::Contended), as configured.
pub trait StateObject: Send + Sync {
    /// Current committed version
    fn version(&self) -> Version;

    /// Checkpoint the current version and move to `target` (or the next
    /// version).
    ///
    /// Returns once the checkpoint is finalized; durability is reported
    /// through the handle and the callbacks.
    fn begin_checkpoint(&self, target: Option<Version>) -> DprResult<CheckpointHandle>;

    /// Roll back to the durable checkpoint of `version`.
    ///
    /// Returns the transition the scheme recorded; the worker resumes at
    /// its `to` version.
    fn begin_restore(&self, version: Version) -> DprResult<VersionTransition>;
}
