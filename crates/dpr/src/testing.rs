//! Test doubles for state object users.
//!
//! [`RecordingCallbacks`] captures lifecycle notifications in delivery order;
//! [`MemoryStore`] is a map-backed [`CheckpointStore`] with controllable
//! durability and failure injection.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::core::{CheckpointToken, Version};
use crate::observability::LifecycleEvent;
use crate::state_object::{CheckpointStore, DprWorkerCallbacks, PersistNotifier};

/// Callback sink that records every notification
#[derive(Debug, Default)]
pub struct RecordingCallbacks {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingCallbacks {
    /// Empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications received so far, in delivery order
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().clone()
    }

    /// Forget recorded notifications
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn push(&self, event: LifecycleEvent) {
        self.events.lock().push(event);
    }
}

impl DprWorkerCallbacks for RecordingCallbacks {
    fn on_version_end(&self, version: Version) {
        self.push(LifecycleEvent::VersionEnd(version));
    }

    fn on_version_persistent(&self, version: Version) {
        self.push(LifecycleEvent::VersionPersistent(version));
    }

    fn on_rollback_complete(&self) {
        self.push(LifecycleEvent::RollbackComplete);
    }
}

/// When [`MemoryStore`] reports a checkpoint durable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Durability {
    /// Fire the notifier before `perform_checkpoint` returns
    #[default]
    Immediate,
    /// Hold the notifier until [`MemoryStore::persist_pending`]
    Deferred,
}

/// Failure injected by [`MemoryStore`]
#[derive(Debug, thiserror::Error)]
pub enum MemoryStoreError {
    /// Failure requested through `fail_next_*`
    #[error("injected {0} failure")]
    Injected(&'static str),

    /// No checkpoint exists for the requested version
    #[error("no checkpoint for {0}")]
    MissingCheckpoint(Version),
}

/// In-memory key/value store with whole-state checkpoints
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<BTreeMap<String, i64>>,
    checkpoints: Mutex<HashMap<Version, BTreeMap<String, i64>>>,
    pending: Mutex<Vec<PersistNotifier>>,
    durability: Durability,
    next_token: AtomicU64,
    fail_checkpoint: AtomicBool,
    fail_restore: AtomicBool,
    checkpoint_calls: AtomicU64,
    restore_calls: AtomicU64,
}

impl MemoryStore {
    /// Store that reports durability immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with the given durability behavior
    pub fn with_durability(durability: Durability) -> Self {
        Self {
            durability,
            ..Self::default()
        }
    }

    /// Write a key
    pub fn put(&self, key: impl Into<String>, value: i64) {
        self.data.lock().insert(key.into(), value);
    }

    /// Read a key
    pub fn get(&self, key: &str) -> Option<i64> {
        self.data.lock().get(key).copied()
    }

    /// Add `delta` to a key, starting from zero
    pub fn add(&self, key: &str, delta: i64) -> i64 {
        let mut data = self.data.lock();
        let value = data.entry(key.to_string()).or_insert(0);
        *value += delta;
        *value
    }

    /// Make the next `perform_checkpoint` fail
    pub fn fail_next_checkpoint(&self) {
        self.fail_checkpoint.store(true, Ordering::SeqCst);
    }

    /// Make the next `restore_checkpoint` fail
    pub fn fail_next_restore(&self) {
        self.fail_restore.store(true, Ordering::SeqCst);
    }

    /// Fire every deferred persist notifier, oldest first
    pub fn persist_pending(&self) -> usize {
        let pending: Vec<_> = self.pending.lock().drain(..).collect();
        let count = pending.len();
        for notifier in pending {
            notifier.notify();
        }
        count
    }

    /// Drop every deferred notifier without firing it
    pub fn abandon_pending(&self) -> usize {
        let pending: Vec<_> = self.pending.lock().drain(..).collect();
        pending.len()
    }

    /// Versions with a finalized checkpoint
    pub fn checkpointed_versions(&self) -> Vec<Version> {
        let mut versions: Vec<_> = self.checkpoints.lock().keys().copied().collect();
        versions.sort_unstable();
        versions
    }

    /// Number of `perform_checkpoint` calls, failed ones included
    pub fn checkpoint_calls(&self) -> u64 {
        self.checkpoint_calls.load(Ordering::SeqCst)
    }

    /// Number of `restore_checkpoint` calls, failed ones included
    pub fn restore_calls(&self) -> u64 {
        self.restore_calls.load(Ordering::SeqCst)
    }
}

impl CheckpointStore for MemoryStore {
    type Error = MemoryStoreError;

    fn perform_checkpoint(
        &self,
        version: Version,
        on_persist: PersistNotifier,
    ) -> Result<CheckpointToken, Self::Error> {
        self.checkpoint_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_checkpoint.swap(false, Ordering::SeqCst) {
            return Err(MemoryStoreError::Injected("checkpoint"));
        }

        let image = self.data.lock().clone();
        self.checkpoints.lock().insert(version, image);
        let token = CheckpointToken::new(self.next_token.fetch_add(1, Ordering::SeqCst));

        match self.durability {
            Durability::Immediate => on_persist.notify(),
            Durability::Deferred => self.pending.lock().push(on_persist),
        }
        Ok(token)
    }

    fn restore_checkpoint(&self, version: Version) -> Result<(), Self::Error> {
        self.restore_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_restore.swap(false, Ordering::SeqCst) {
            return Err(MemoryStoreError::Injected("restore"));
        }

        let image = self
            .checkpoints
            .lock()
            .get(&version)
            .cloned()
            .ok_or(MemoryStoreError::MissingCheckpoint(version))?;
        *self.data.lock() = image;
        Ok(())
    }
}
