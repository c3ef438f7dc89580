//! # libdpr
//!
//! Worker-side core of Determinate Progress Reporting (DPR): how a single
//! worker tracks its local versions, checkpoints and rolls back without
//! blocking ordinary batches, and how it learns which version is safe to
//! expose.
//!
//! - [`VersionScheme`]: epoch latch between concurrent batches and the rare
//!   checkpoint/restore transition.
//! - [`SimpleStateObject`]: runs a synchronous [`CheckpointStore`]'s
//!   checkpoint and restore routines as version transitions and reports the
//!   lifecycle to [`DprWorkerCallbacks`].
//! - [`DprStateSnapshot`]: safe-version queries over a cluster snapshot, with
//!   the [`GlobalMinDprStateSnapshot`] baseline.
//!
//! ## Quick Start
//!
//! ```rust
//! use libdpr::testing::{MemoryStore, RecordingCallbacks};
//! use libdpr::{SimpleStateObject, StateObject, Version};
//! use std::sync::Arc;
//!
//! # fn main() -> libdpr::DprResult<()> {
//! let callbacks = Arc::new(RecordingCallbacks::new());
//! let object = SimpleStateObject::new(MemoryStore::new(), Arc::clone(&callbacks));
//!
//! object.execute(|version, store| {
//!     assert_eq!(version, Version::ZERO);
//!     store.put("balance", 100);
//! });
//!
//! let handle = object.begin_checkpoint(None)?;
//! assert_eq!(handle.version(), Version::ZERO);
//! assert_eq!(object.version(), Version::new(1));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod core;
pub mod observability;
pub mod snapshot;
pub mod state_object;
pub mod version_scheme;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use crate::core::{
    CheckpointId, CheckpointToken, ContentionPolicy, DprConfig, DprError, DprResult, ErrorClass,
    StoreOperation, Version, VersionSchemeConfig, VersionTransition, Worker, WorkerVersion,
};
pub use observability::{LifecycleEvent, LoggingCallbacks};
pub use snapshot::{DprStateSnapshot, GlobalMinDprStateSnapshot};
pub use state_object::{
    CheckpointHandle, CheckpointStore, DprWorkerCallbacks, PersistNotifier, SimpleStateObject,
    SimpleStateObjectBuilder, StateObject,
};
pub use version_scheme::{SchemeStats, VersionGuard, VersionScheme};

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        DprError, DprResult, DprStateSnapshot, DprWorkerCallbacks, StateObject, Version,
        VersionScheme, Worker,
    };
}
