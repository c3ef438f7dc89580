//! Safe-version snapshots.
//!
//! A snapshot is an immutable, point-in-time view of the cluster that the
//! DPR finder hands to workers. Its only query is which version a worker may
//! expose to clients and recover to.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::{Version, Worker, WorkerVersion};

/// Answers "which version is safe for this worker"
pub trait DprStateSnapshot: Send + Sync {
    /// Safe version for `worker`
    fn safe_version(&self, worker: Worker) -> Version;
}

impl<T: DprStateSnapshot + ?Sized> DprStateSnapshot for Arc<T> {
    fn safe_version(&self, worker: Worker) -> Version {
        (**self).safe_version(worker)
    }
}

/// Treats the whole cluster as one consistency domain.
///
/// Holds the minimum durable version across every worker at snapshot time
/// and answers it for every worker. Correct under any dependency structure,
/// at the cost of holding back workers that never depended on the slowest
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlobalMinDprStateSnapshot {
    global_safe_version: Version,
}

impl GlobalMinDprStateSnapshot {
    /// Snapshot with a precomputed global minimum
    #[must_use]
    pub const fn new(global_safe_version: Version) -> Self {
        Self {
            global_safe_version,
        }
    }

    /// Snapshot over the latest durable version reported by each worker.
    ///
    /// A worker that reports several times counts with its highest version;
    /// durability never regresses. Returns `None` when there are no reports;
    /// there is no safe version for an empty cluster.
    pub fn from_reports(reports: impl IntoIterator<Item = WorkerVersion>) -> Option<Self> {
        let mut latest: BTreeMap<Worker, Version> = BTreeMap::new();
        for report in reports {
            let version = latest.entry(report.worker).or_insert(report.version);
            *version = (*version).max(report.version);
        }
        latest.into_values().min().map(Self::new)
    }

    /// The global minimum this snapshot was built with
    #[must_use]
    pub const fn global_safe_version(&self) -> Version {
        self.global_safe_version
    }
}

impl DprStateSnapshot for GlobalMinDprStateSnapshot {
    fn safe_version(&self, _worker: Worker) -> Version {
        self.global_safe_version
    }
}
