//! End-to-end behavior of `SimpleStateObject` over an in-memory store

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use libdpr::testing::{Durability, MemoryStore, MemoryStoreError, RecordingCallbacks};
use libdpr::{
    CheckpointStore, CheckpointToken, ContentionPolicy, DprConfig, DprError, ErrorClass,
    LifecycleEvent, LoggingCallbacks, PersistNotifier, SimpleStateObject, StateObject,
    StoreOperation, Version, VersionSchemeConfig, Worker,
};
use pretty_assertions::assert_eq;
use rstest::{fixture, rstest};

type Object = SimpleStateObject<MemoryStore>;

struct Harness {
    object: Object,
    callbacks: Arc<RecordingCallbacks>,
}

#[fixture]
fn harness() -> Harness {
    harness_with(Durability::Immediate)
}

fn harness_with(durability: Durability) -> Harness {
    let _log = dpr_log::init_test();
    let callbacks = Arc::new(RecordingCallbacks::new());
    let object = SimpleStateObject::new(
        MemoryStore::with_durability(durability),
        Arc::clone(&callbacks),
    );
    Harness { object, callbacks }
}

// A worker at version 0 commits a batch then checkpoints.
#[rstest]
fn checkpoint_captures_batches_of_previous_version(harness: Harness) {
    let Harness { object, callbacks } = harness;

    let bound = object.execute(|version, store| {
        store.put("x", 1);
        version
    });
    assert_eq!(bound, Version::ZERO);

    let handle = object.begin_checkpoint(None).unwrap();
    assert_eq!(handle.version(), Version::ZERO);
    assert_eq!(object.version(), Version::new(1));
    assert_eq!(object.store().checkpointed_versions(), vec![Version::ZERO]);

    // Batches after the checkpoint run in the new version.
    let bound = object.execute(|version, store| {
        store.put("x", 2);
        version
    });
    assert_eq!(bound, Version::new(1));
    assert_eq!(
        callbacks.events(),
        vec![
            LifecycleEvent::VersionEnd(Version::ZERO),
            LifecycleEvent::VersionPersistent(Version::ZERO),
        ]
    );
}

// Restore to version 0 after version 1 was written.
#[rstest]
fn restore_rewinds_state_and_reports_rollback(harness: Harness) {
    let Harness { object, callbacks } = harness;

    object.execute(|_, store| store.put("x", 1));
    object.begin_checkpoint(None).unwrap();
    object.execute(|_, store| store.put("x", 2));
    callbacks.clear();

    let transition = object.begin_restore(Version::ZERO).unwrap();
    assert_eq!(transition.from, Version::new(1));
    assert_eq!(transition.to, Version::new(2));
    assert_eq!(object.version(), Version::new(2));
    assert_eq!(object.store().get("x"), Some(1));
    assert_eq!(callbacks.events(), vec![LifecycleEvent::RollbackComplete]);
    assert_eq!(object.version_scheme().stats().transitions, 2);
}

// End precedes persistent, both before begin_checkpoint returns.
#[rstest]
fn immediate_durability_notifies_before_return(harness: Harness) {
    let Harness { object, callbacks } = harness;

    let mut handle = object.begin_checkpoint(Some(Version::new(4))).unwrap();
    assert_eq!(
        callbacks.events(),
        vec![
            LifecycleEvent::VersionEnd(Version::ZERO),
            LifecycleEvent::VersionPersistent(Version::ZERO),
        ]
    );
    assert!(handle.is_durable());
    assert_eq!(object.version(), Version::new(4));
}

#[rstest]
fn stale_target_falls_back_to_increment(harness: Harness) {
    let Harness { object, .. } = harness;

    object.begin_checkpoint(Some(Version::new(5))).unwrap();
    let handle = object.begin_checkpoint(Some(Version::new(2))).unwrap();
    assert_eq!(handle.version(), Version::new(5));
    assert_eq!(object.version(), Version::new(6));
}

#[rstest]
fn failed_checkpoint_keeps_version_and_is_retryable(harness: Harness) {
    let Harness { object, callbacks } = harness;
    object.store().fail_next_checkpoint();

    let err = object.begin_checkpoint(None).unwrap_err();
    assert!(matches!(
        err,
        DprError::Store {
            operation: StoreOperation::Checkpoint,
            version,
            ..
        } if version == Version::ZERO
    ));
    assert!(err.is_retryable());
    assert_eq!(object.version(), Version::ZERO);
    assert!(callbacks.events().is_empty());

    let handle = object.begin_checkpoint(None).unwrap();
    assert_eq!(handle.version(), Version::ZERO);
    assert_eq!(object.version(), Version::new(1));
    assert_eq!(object.store().checkpoint_calls(), 2);
}

#[rstest]
fn failed_restore_keeps_version(harness: Harness) {
    let Harness { object, callbacks } = harness;
    object.begin_checkpoint(None).unwrap();
    callbacks.clear();

    let err = object.begin_restore(Version::new(7)).unwrap_err();
    assert!(matches!(
        err,
        DprError::Store {
            operation: StoreOperation::Restore,
            ..
        }
    ));
    let source = std::error::Error::source(&err).unwrap();
    assert!(source.downcast_ref::<MemoryStoreError>().is_some());
    assert_eq!(object.version(), Version::new(1));
    assert!(callbacks.events().is_empty());

    object.store().fail_next_restore();
    assert!(object.begin_restore(Version::ZERO).is_err());
    assert_eq!(object.version(), Version::new(1));
    assert_eq!(object.store().restore_calls(), 2);
}

#[tokio::test]
async fn deferred_durability_resolves_handle() {
    let Harness { object, callbacks } = harness_with(Durability::Deferred);
    let object = Arc::new(object);

    let mut handle = object.begin_checkpoint(None).unwrap();
    assert!(!handle.is_durable());
    assert!(callbacks.events().is_empty());

    let persister = {
        let object = Arc::clone(&object);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            object.store().persist_pending()
        })
    };

    let id = handle.wait_durable().await.unwrap();
    assert_eq!(id.version, Version::ZERO);
    assert_eq!(persister.await.unwrap(), 1);
    assert_eq!(
        callbacks.events(),
        vec![
            LifecycleEvent::VersionEnd(Version::ZERO),
            LifecycleEvent::VersionPersistent(Version::ZERO),
        ]
    );
}

#[tokio::test]
async fn abandoned_notifier_fails_wait() {
    let Harness { object, callbacks } = harness_with(Durability::Deferred);

    let handle = object.begin_checkpoint(None).unwrap();
    assert_eq!(object.store().abandon_pending(), 1);

    let err = handle.wait_durable().await.unwrap_err();
    assert!(matches!(err, DprError::DurabilityAbandoned { version } if version == Version::ZERO));
    assert_eq!(err.classify(), ErrorClass::Durability);
    assert!(!err.is_retryable());
    assert!(callbacks.events().is_empty());
}

#[test]
fn notifier_fired_from_another_thread() {
    let Harness { object, callbacks } = harness_with(Durability::Deferred);
    let object = Arc::new(object);

    let handle = object.begin_checkpoint(None).unwrap();
    let persister = {
        let object = Arc::clone(&object);
        thread::spawn(move || object.store().persist_pending())
    };

    assert_eq!(handle.blocking_wait_durable().unwrap().version, Version::ZERO);
    assert_eq!(persister.join().unwrap(), 1);
    assert_eq!(callbacks.events().len(), 2);
}

// Checkpoints finalized back to back report durability in version order.
#[test]
fn deferred_checkpoints_persist_in_order() {
    let Harness { object, callbacks } = harness_with(Durability::Deferred);

    object.begin_checkpoint(None).unwrap();
    object.begin_checkpoint(None).unwrap();
    assert_eq!(object.store().persist_pending(), 2);

    assert_eq!(
        callbacks.events(),
        vec![
            LifecycleEvent::VersionEnd(Version::ZERO),
            LifecycleEvent::VersionPersistent(Version::ZERO),
            LifecycleEvent::VersionEnd(Version::new(1)),
            LifecycleEvent::VersionPersistent(Version::new(1)),
        ]
    );
}

#[test]
fn builder_requires_callbacks() {
    let err = SimpleStateObject::builder(MemoryStore::new())
        .build()
        .unwrap_err();
    assert!(matches!(err, DprError::CallbacksNotRegistered));
    assert!(err.is_usage_error());
}

#[test]
fn builder_resumes_at_initial_version() {
    let object = SimpleStateObject::builder(MemoryStore::new())
        .callbacks(RecordingCallbacks::new())
        .initial_version(Version::new(40))
        .worker(Worker::new(3))
        .build()
        .unwrap();

    assert_eq!(object.version(), Version::new(40));
    assert_eq!(object.worker(), Some(Worker::new(3)));
    let handle = object.begin_checkpoint(None).unwrap();
    assert_eq!(handle.version(), Version::new(40));
}

#[test]
fn from_config_applies_scheme_settings() {
    let config = DprConfig::from_json_str(
        r#"{"worker": 7, "scheme": {"contention": "fail", "drain_timeout": "250ms"}}"#,
    )
    .unwrap();
    let callbacks = LoggingCallbacks::new(RecordingCallbacks::new()).with_label("worker-7");

    let object = SimpleStateObject::from_config(&config, MemoryStore::new(), callbacks).unwrap();
    assert_eq!(object.worker(), Some(Worker::new(7)));
    let scheme = object.version_scheme().config();
    assert_eq!(scheme.contention, ContentionPolicy::Fail);
    assert_eq!(scheme.drain_timeout, Some(Duration::from_millis(250)));
}

#[test]
fn builder_rejects_invalid_scheme_config() {
    let err = SimpleStateObject::builder(MemoryStore::new())
        .callbacks(RecordingCallbacks::new())
        .scheme_config(VersionSchemeConfig::default().with_drain_timeout(Duration::ZERO))
        .build()
        .unwrap_err();
    assert!(matches!(err, DprError::InvalidConfig { .. }));
}

/// Store that counts batches touching it and flags any overlap with its
/// checkpoint routine.
#[derive(Default)]
struct ProbeStore {
    active: AtomicU64,
    overlaps: AtomicU64,
}

impl ProbeStore {
    fn batch(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
        thread::yield_now();
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CheckpointStore for ProbeStore {
    type Error = MemoryStoreError;

    fn perform_checkpoint(
        &self,
        version: Version,
        on_persist: PersistNotifier,
    ) -> Result<CheckpointToken, Self::Error> {
        if self.active.load(Ordering::SeqCst) != 0 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        thread::yield_now();
        if self.active.load(Ordering::SeqCst) != 0 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        on_persist.notify();
        Ok(CheckpointToken::new(version.get()))
    }

    fn restore_checkpoint(&self, _version: Version) -> Result<(), Self::Error> {
        if self.active.load(Ordering::SeqCst) != 0 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[test]
fn checkpoints_never_overlap_batches() {
    const THREADS: usize = 4;
    let callbacks = Arc::new(RecordingCallbacks::new());
    let object = Arc::new(SimpleStateObject::new(
        ProbeStore::default(),
        Arc::clone(&callbacks),
    ));
    let barrier = Arc::new(Barrier::new(THREADS + 1));

    let batches: Vec<_> = (0..THREADS)
        .map(|_| {
            let object = Arc::clone(&object);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..500 {
                    object.execute(|_, store| store.batch());
                }
            })
        })
        .collect();

    barrier.wait();
    for round in 0..20 {
        if round % 5 == 4 {
            object.begin_restore(Version::ZERO).unwrap();
        } else {
            object.begin_checkpoint(None).unwrap();
        }
    }
    for batch in batches {
        batch.join().unwrap();
    }

    assert_eq!(object.store().overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(object.version(), Version::new(20));
    let rollbacks = callbacks
        .events()
        .into_iter()
        .filter(|e| *e == LifecycleEvent::RollbackComplete)
        .count();
    assert_eq!(rollbacks, 4);
}
