//! Epoch latch that separates batches from version transitions.
//!
//! Many batches hold the current version at once through
//! [`VersionScheme::enter`]/[`VersionScheme::leave`]; a single
//! [`VersionScheme::advance_version`] closes the gate to new entrants, waits
//! for the open batches to drain, runs its transition action with exclusive
//! access and then commits the new version.
//!
//! The steady-state `enter`/`leave` path is one CAS on a packed state word.
//! Threads only touch the mutex/condvar pair when a transition is in
//! progress.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::core::{
    ContentionPolicy, DprError, DprResult, Version, VersionSchemeConfig, VersionTransition,
};

/// Set while an advance owns the transition slot.
const CLOSED: u64 = 1 << 63;
/// Low bits: operations bound to the current version.
const COUNT_MASK: u64 = CLOSED - 1;

/// Point-in-time view of a scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemeStats {
    /// Version bound to new operations
    pub version: Version,
    /// Operations currently between `enter` and `leave`
    pub in_flight: u64,
    /// Whether an advance holds the transition slot
    pub advancing: bool,
    /// Committed transitions since creation
    pub transitions: u64,
}

/// Reader/writer latch over versions.
///
/// Readers are batches bound to a version; the writer is the rare checkpoint
/// or restore transition.
#[derive(Debug)]
pub struct VersionScheme {
    state: AtomicU64,
    version: AtomicU64,
    transitions: AtomicU64,
    lock: Mutex<()>,
    cond: Condvar,
    config: VersionSchemeConfig,
}

impl Default for VersionScheme {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionScheme {
    /// Scheme at [`Version::ZERO`] with the default (blocking) configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_version(Version::ZERO, VersionSchemeConfig::default())
    }

    /// Scheme with a custom configuration
    pub fn with_config(config: VersionSchemeConfig) -> DprResult<Self> {
        config.validate()?;
        Ok(Self::with_version(Version::ZERO, config))
    }

    /// Scheme resuming at `version`, e.g. after a process restart
    #[must_use]
    pub fn with_version(version: Version, config: VersionSchemeConfig) -> Self {
        Self {
            state: AtomicU64::new(0),
            version: AtomicU64::new(version.get()),
            transitions: AtomicU64::new(0),
            lock: Mutex::new(()),
            cond: Condvar::new(),
            config,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &VersionSchemeConfig {
        &self.config
    }

    /// Version bound to operations entering now
    pub fn current_version(&self) -> Version {
        Version::new(self.version.load(Ordering::Acquire))
    }

    /// Bind the caller to the current version.
    ///
    /// Must be paired with exactly one [`leave`](Self::leave). Waits only
    /// while an advance is draining or running its action, and then binds to
    /// the version that advance committed.
    pub fn enter(&self) -> Version {
        let mut state = self.state.load(Ordering::Acquire);
        loop {
            if state & CLOSED != 0 {
                debug!("operation waiting for version transition");
                self.wait_open();
                state = self.state.load(Ordering::Acquire);
                continue;
            }
            match self.state.compare_exchange_weak(
                state,
                state + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                // The version cannot move while our count is held.
                Ok(_) => return self.current_version(),
                Err(actual) => state = actual,
            }
        }
    }

    /// Release one binding obtained by [`enter`](Self::enter)
    pub fn leave(&self) -> DprResult<()> {
        let mut state = self.state.load(Ordering::Acquire);
        loop {
            if state & COUNT_MASK == 0 {
                return Err(DprError::UnbalancedLeave);
            }
            match self.state.compare_exchange_weak(
                state,
                state - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => state = actual,
            }
        }

        // Last operation out while an advance is draining: wake it.
        if state == CLOSED | 1 {
            let _guard = self.lock.lock();
            self.cond.notify_all();
        }
        Ok(())
    }

    /// [`enter`](Self::enter) with a guard that leaves on drop
    pub fn protect(&self) -> VersionGuard<'_> {
        let version = self.enter();
        VersionGuard {
            scheme: self,
            version,
        }
    }

    /// Run `action` as the exclusive transition to the next version.
    ///
    /// The new version is `target` when it is greater than the current
    /// version, otherwise current + 1. The action runs after every operation
    /// bound to the old version has left and before any new operation is
    /// admitted. The new version is committed only if the action returns
    /// `Ok`; on `Err` (or panic) the scheme stays at the old version and the
    /// transition slot is released.
    pub fn advance_version<F, T, E>(&self, target: Option<Version>, action: F) -> Result<T, E>
    where
        F: FnOnce(VersionTransition) -> Result<T, E>,
        E: From<DprError>,
    {
        let slot = self.acquire_slot()?;
        let transition = VersionTransition::plan(self.current_version(), target);

        let span = tracing::debug_span!(
            "dpr.advance_version",
            from = %transition.from,
            to = %transition.to
        );
        let _entered = span.enter();

        self.drain(transition.from)?;
        debug!("quiesced, running transition action");

        match action(transition) {
            Ok(value) => {
                self.version.store(transition.to.get(), Ordering::Release);
                self.transitions.fetch_add(1, Ordering::Relaxed);
                info!(%transition, "version transition committed");
                drop(slot);
                Ok(value)
            }
            Err(err) => {
                warn!(%transition, "transition action failed; version unchanged");
                drop(slot);
                Err(err)
            }
        }
    }

    /// [`advance_version`](Self::advance_version) for infallible actions
    pub fn advance<F>(&self, target: Option<Version>, action: F) -> DprResult<VersionTransition>
    where
        F: FnOnce(VersionTransition),
    {
        self.advance_version(target, |transition| {
            action(transition);
            Ok::<_, DprError>(transition)
        })
    }

    /// Snapshot of counters
    pub fn stats(&self) -> SchemeStats {
        let state = self.state.load(Ordering::Acquire);
        SchemeStats {
            version: self.current_version(),
            in_flight: state & COUNT_MASK,
            advancing: state & CLOSED != 0,
            transitions: self.transitions.load(Ordering::Relaxed),
        }
    }

    fn acquire_slot(&self) -> DprResult<SlotGuard<'_>> {
        loop {
            let previous = self.state.fetch_or(CLOSED, Ordering::AcqRel);
            if previous & CLOSED == 0 {
                return Ok(SlotGuard { scheme: self });
            }
            match self.config.contention {
                ContentionPolicy::Fail => {
                    let current = self.current_version();
                    warn!(%current, "version advance rejected: transition in progress");
                    return Err(DprError::Contended { current });
                }
                ContentionPolicy::Block => {
                    debug!("version advance waiting for transition slot");
                    self.wait_open();
                }
            }
        }
    }

    fn wait_open(&self) {
        let mut guard = self.lock.lock();
        while self.state.load(Ordering::Acquire) & CLOSED != 0 {
            self.cond.wait(&mut guard);
        }
    }

    fn drain(&self, version: Version) -> DprResult<()> {
        if self.state.load(Ordering::Acquire) & COUNT_MASK == 0 {
            return Ok(());
        }

        let started = Instant::now();
        let mut guard = self.lock.lock();
        loop {
            let in_flight = self.state.load(Ordering::Acquire) & COUNT_MASK;
            if in_flight == 0 {
                return Ok(());
            }
            debug!(in_flight, "waiting for operations to leave");
            let Some(timeout) = self.config.drain_timeout else {
                self.cond.wait(&mut guard);
                continue;
            };
            if self.cond.wait_until(&mut guard, started + timeout).timed_out() {
                let in_flight = self.state.load(Ordering::Acquire) & COUNT_MASK;
                if in_flight == 0 {
                    return Ok(());
                }
                warn!(in_flight, ?timeout, "drain timed out");
                return Err(DprError::DrainTimeout {
                    version,
                    in_flight,
                    timeout,
                });
            }
        }
    }
}

/// Owns the transition slot; reopens the gate on drop, including unwinds.
struct SlotGuard<'a> {
    scheme: &'a VersionScheme,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let _guard = self.scheme.lock.lock();
        self.scheme.state.fetch_and(!CLOSED, Ordering::AcqRel);
        self.scheme.cond.notify_all();
    }
}

/// A protected operation bound to one version
#[derive(Debug)]
#[must_use = "the binding is released as soon as the guard is dropped"]
pub struct VersionGuard<'a> {
    scheme: &'a VersionScheme,
    version: Version,
}

impl VersionGuard<'_> {
    /// Version this operation executes in
    pub fn version(&self) -> Version {
        self.version
    }
}

impl Drop for VersionGuard<'_> {
    fn drop(&mut self) {
        // Every guard holds exactly one count, so leave cannot underflow.
        let _ = self.scheme.leave();
    }
}
