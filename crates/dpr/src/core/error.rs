//! Error types for DPR worker operations

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use super::types::Version;

/// Result type for DPR operations
pub type DprResult<T> = Result<T, DprError>;

/// Boxed error reported by a checkpoint store
pub type StoreError = Box<dyn StdError + Send + Sync + 'static>;

/// Which store routine failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    /// `perform_checkpoint`
    Checkpoint,
    /// `restore_checkpoint`
    Restore,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Checkpoint => write!(f, "checkpoint"),
            Self::Restore => write!(f, "restore"),
        }
    }
}

/// Errors raised by the version scheme and state objects
#[derive(Debug, thiserror::Error)]
pub enum DprError {
    /// `leave()` was called without a matching `enter()`
    #[error("leave() called with no protected operation in flight")]
    UnbalancedLeave,

    /// A state object was built without a callback sink
    #[error("worker callbacks must be registered before checkpoint or restore")]
    CallbacksNotRegistered,

    /// Another version advance holds the transition slot
    #[error("a version advance is already in progress at {current}; retry later")]
    Contended {
        /// Version in effect when the advance was rejected
        current: Version,
    },

    /// In-flight operations did not drain before the configured deadline
    #[error("{in_flight} operation(s) still bound to {version} after {timeout:?}")]
    DrainTimeout {
        /// Version that failed to quiesce
        version: Version,
        /// Operations still open when the deadline passed
        in_flight: u64,
        /// Configured drain timeout
        timeout: Duration,
    },

    /// The underlying store failed a checkpoint or restore
    #[error("store {operation} of {version} failed: {source}")]
    Store {
        /// Routine that failed
        operation: StoreOperation,
        /// Version being checkpointed or restored
        version: Version,
        /// Store-reported cause
        #[source]
        source: StoreError,
    },

    /// The store released a checkpoint's persist notifier without firing it.
    ///
    /// Not retryable: a later checkpoint captures a later version and never
    /// makes this one durable.
    #[error("checkpoint of {version} was finalized but never reported durable")]
    DurabilityAbandoned {
        /// Version whose durability was never signalled
        version: Version,
    },

    /// Invalid configuration
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Configuration error details
        message: String,
    },
}

/// Coarse classification used by coordinators to pick a reaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Programming defect in the caller; never retry
    Usage,
    /// Transient condition; retry later
    Transient,
    /// The store failed; the worker is unchanged and may retry
    Store,
    /// A finalized checkpoint will never become durable
    Durability,
    /// Configuration errors
    Configuration,
}

impl DprError {
    /// Wrap a store failure
    pub fn store(
        operation: StoreOperation,
        version: Version,
        source: impl Into<StoreError>,
    ) -> Self {
        Self::Store {
            operation,
            version,
            source: source.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn classify(&self) -> ErrorClass {
        match self {
            Self::UnbalancedLeave | Self::CallbacksNotRegistered => ErrorClass::Usage,
            Self::Contended { .. } | Self::DrainTimeout { .. } => ErrorClass::Transient,
            Self::Store { .. } => ErrorClass::Store,
            Self::DurabilityAbandoned { .. } => ErrorClass::Durability,
            Self::InvalidConfig { .. } => ErrorClass::Configuration,
        }
    }

    /// Whether the same request may succeed if issued again
    pub fn is_retryable(&self) -> bool {
        matches!(self.classify(), ErrorClass::Transient | ErrorClass::Store)
    }

    /// Whether this error signals a programming defect
    pub fn is_usage_error(&self) -> bool {
        self.classify() == ErrorClass::Usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[derive(Debug, thiserror::Error)]
    #[error("disk on fire")]
    struct DiskError;

    #[rstest]
    #[case(DprError::UnbalancedLeave, ErrorClass::Usage, false)]
    #[case(DprError::CallbacksNotRegistered, ErrorClass::Usage, false)]
    #[case(DprError::Contended { current: Version::new(1) }, ErrorClass::Transient, true)]
    #[case(
        DprError::DrainTimeout { version: Version::new(1), in_flight: 2, timeout: Duration::from_millis(5) },
        ErrorClass::Transient,
        true
    )]
    #[case(DprError::store(StoreOperation::Checkpoint, Version::new(3), DiskError), ErrorClass::Store, true)]
    #[case(DprError::DurabilityAbandoned { version: Version::new(3) }, ErrorClass::Durability, false)]
    #[case(DprError::invalid_config("bad"), ErrorClass::Configuration, false)]
    fn classification(#[case] err: DprError, #[case] class: ErrorClass, #[case] retryable: bool) {
        assert_eq!(err.classify(), class);
        assert_eq!(err.is_retryable(), retryable);
    }

    #[test]
    fn store_error_keeps_source() {
        let err = DprError::store(StoreOperation::Restore, Version::new(4), DiskError);
        assert_eq!(err.to_string(), "store restore of v4 failed: disk on fire");
        assert!(err.source().is_some());
    }

    #[test]
    fn usage_errors_are_flagged() {
        assert!(DprError::UnbalancedLeave.is_usage_error());
        assert!(!DprError::Contended { current: Version::ZERO }.is_usage_error());
    }
}
