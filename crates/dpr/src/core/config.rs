//! Worker and version scheme configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{DprError, DprResult};
use super::types::Worker;

/// What a second `advance_version` does while another one is running
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentionPolicy {
    /// Wait for the running advance to finish, then proceed
    #[default]
    Block,
    /// Return [`DprError::Contended`] immediately
    Fail,
}

/// Version scheme configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionSchemeConfig {
    /// Behavior of contended advances
    pub contention: ContentionPolicy,

    /// Upper bound on waiting for in-flight operations to drain.
    /// `None` waits indefinitely.
    #[serde(with = "humantime_serde")]
    pub drain_timeout: Option<Duration>,
}

impl VersionSchemeConfig {
    /// Set the contention policy
    #[must_use]
    pub const fn with_contention(mut self, contention: ContentionPolicy) -> Self {
        self.contention = contention;
        self
    }

    /// Bound the drain wait
    #[must_use]
    pub const fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = Some(timeout);
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> DprResult<()> {
        if self.drain_timeout.is_some_and(|t| t.is_zero()) {
            return Err(DprError::invalid_config(
                "drain_timeout must be positive when set",
            ));
        }
        Ok(())
    }

    /// Overlay `other` onto this configuration.
    ///
    /// A drain timeout set on either side is kept; when both are set the
    /// shorter one wins.
    pub fn merge(&mut self, other: Self) {
        self.contention = other.contention;
        self.drain_timeout = match (self.drain_timeout, other.drain_timeout) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }
}

/// Configuration of one DPR worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DprConfig {
    /// Identity of this worker
    pub worker: Worker,

    /// Version scheme settings
    #[serde(default)]
    pub scheme: VersionSchemeConfig,
}

impl DprConfig {
    /// Configuration with default scheme settings
    #[must_use]
    pub fn new(worker: Worker) -> Self {
        Self {
            worker,
            scheme: VersionSchemeConfig::default(),
        }
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> DprResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DprError::invalid_config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> DprResult<()> {
        self.scheme.validate()
    }
}
