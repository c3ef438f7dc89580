//! Identifiers shared by every DPR component

use std::fmt;

use serde::{Deserialize, Serialize};

/// A logical cut of a worker's state.
///
/// Versions only move forward during normal operation. A restore may move a
/// worker back to an earlier durable version; the version scheme still counts
/// that as a transition.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// The version every fresh version scheme starts at
    pub const ZERO: Self = Self(0);

    /// Wrap a raw version number
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw version number
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The version directly after this one
    ///
    /// Saturates at `u64::MAX`; a worker will not see 2^64 checkpoints.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Opaque identity of a worker in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Worker(u64);

impl Worker {
    /// Wrap a raw worker id
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw worker id
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// A version of one particular worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerVersion {
    /// Owning worker
    pub worker: Worker,
    /// Version of that worker
    pub version: Version,
}

impl WorkerVersion {
    /// Pair a worker with one of its versions
    #[must_use]
    pub const fn new(worker: Worker, version: Version) -> Self {
        Self { worker, version }
    }
}

impl fmt::Display for WorkerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.worker, self.version)
    }
}

/// Durability token handed out by a store when it finalizes a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointToken(u64);

impl CheckpointToken {
    /// Wrap a store-specific token
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw token value
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Identity of a finalized checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointId {
    /// Version whose state the checkpoint captures
    pub version: Version,
    /// Store token for locating the checkpoint
    pub token: CheckpointToken,
}

/// The version change performed by one `advance_version` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionTransition {
    /// Version in effect before the transition
    pub from: Version,
    /// Version in effect once the transition commits
    pub to: Version,
}

impl VersionTransition {
    /// Compute the transition out of `current`.
    ///
    /// A `target` is honored only when it is strictly greater than `current`;
    /// otherwise the scheme moves to `current + 1`.
    #[must_use]
    pub fn plan(current: Version, target: Option<Version>) -> Self {
        let to = match target {
            Some(target) if target > current => target,
            _ => current.next(),
        };
        Self { from: current, to }
    }
}

impl fmt::Display for VersionTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}
