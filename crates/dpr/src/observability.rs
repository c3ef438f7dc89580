//! Structured logging of worker lifecycle events

use std::fmt;

use crate::core::Version;
use crate::state_object::DprWorkerCallbacks;

/// A lifecycle notification as delivered to a callback sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// `on_version_end`
    VersionEnd(Version),
    /// `on_version_persistent`
    VersionPersistent(Version),
    /// `on_rollback_complete`
    RollbackComplete,
}

impl LifecycleEvent {
    /// Stable event name for log fields
    pub const fn name(&self) -> &'static str {
        match self {
            Self::VersionEnd(_) => "version_end",
            Self::VersionPersistent(_) => "version_persistent",
            Self::RollbackComplete => "rollback_complete",
        }
    }

    /// Version the event refers to, if any
    pub const fn version(&self) -> Option<Version> {
        match self {
            Self::VersionEnd(v) | Self::VersionPersistent(v) => Some(*v),
            Self::RollbackComplete => None,
        }
    }

    /// Event payload as JSON
    pub fn data(&self) -> serde_json::Value {
        match self.version() {
            Some(version) => serde_json::json!({ "event": self.name(), "version": version }),
            None => serde_json::json!({ "event": self.name() }),
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version() {
            Some(version) => write!(f, "{}({version})", self.name()),
            None => f.write_str(self.name()),
        }
    }
}

/// Decorates a callback sink with a `tracing` event per notification
#[derive(Debug, Clone)]
pub struct LoggingCallbacks<C> {
    inner: C,
    label: &'static str,
}

impl<C: DprWorkerCallbacks> LoggingCallbacks<C> {
    /// Wrap `inner`
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            label: "dpr",
        }
    }

    /// Tag log lines with `label` instead of the default `"dpr"`
    #[must_use]
    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    /// Wrapped sink
    pub fn inner(&self) -> &C {
        &self.inner
    }

    fn record(&self, event: LifecycleEvent) {
        tracing::info!(
            label = self.label,
            event = event.name(),
            version = event.version().map(Version::get),
            "worker lifecycle"
        );
    }
}

impl<C: DprWorkerCallbacks> DprWorkerCallbacks for LoggingCallbacks<C> {
    fn on_version_end(&self, version: Version) {
        self.record(LifecycleEvent::VersionEnd(version));
        self.inner.on_version_end(version);
    }

    fn on_version_persistent(&self, version: Version) {
        self.record(LifecycleEvent::VersionPersistent(version));
        self.inner.on_version_persistent(version);
    }

    fn on_rollback_complete(&self) {
        self.record(LifecycleEvent::RollbackComplete);
        self.inner.on_rollback_complete();
    }
}
