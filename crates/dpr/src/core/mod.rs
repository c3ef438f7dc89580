//! Core types shared across the crate

pub mod config;
pub mod error;
pub mod types;

pub use config::{ContentionPolicy, DprConfig, VersionSchemeConfig};
pub use error::{DprError, DprResult, ErrorClass, StoreError, StoreOperation};
pub use types::{CheckpointId, CheckpointToken, Version, VersionTransition, Worker, WorkerVersion};
