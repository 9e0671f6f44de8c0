//! Controller configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::rank::{FailurePolicy, DEFAULT_COUNT_PATH};
use super::readiness::{PoolReadinessMonitor, DEFAULT_POLL_INTERVAL};
use crate::error::ControlError;

/// Default controller kind registered by the factory
pub const DEFAULT_CONTROLLER_KIND: &str = "frame_processor";

/// Configuration for a frame handler controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Controller name, published as the read-only `module` parameter
    pub name: String,

    /// Factory key selecting the controller implementation
    pub kind: String,

    /// Name of the raw peer adapter the controller connects to
    pub peer_adapter: String,

    /// Readiness poll interval in milliseconds
    pub poll_interval_ms: u64,

    /// Give up waiting for the peer after this many seconds (unbounded if unset)
    pub readiness_timeout_secs: Option<u64>,

    /// Behaviour when one worker rejects its rank
    pub failure_policy: FailurePolicy,

    /// Path of the pool size on the peer
    pub count_path: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            name: "fp".to_string(),
            kind: DEFAULT_CONTROLLER_KIND.to_string(),
            peer_adapter: "od_fps".to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            readiness_timeout_secs: None,
            failure_policy: FailurePolicy::AbortOnFirst,
            count_path: DEFAULT_COUNT_PATH.to_string(),
        }
    }
}

impl ControllerConfig {
    /// Create a new config builder
    pub fn builder() -> ControllerConfigBuilder {
        ControllerConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.name.trim().is_empty() {
            return Err(ControlError::config("name", "Controller name cannot be empty"));
        }

        if self.kind.trim().is_empty() {
            return Err(ControlError::config("kind", "Controller kind cannot be empty"));
        }

        if self.poll_interval_ms == 0 {
            return Err(ControlError::config(
                "poll_interval_ms",
                "Poll interval must be greater than 0",
            ));
        }

        if self.readiness_timeout_secs == Some(0) {
            return Err(ControlError::config(
                "readiness_timeout_secs",
                "Timeout must be greater than 0 (omit it to wait indefinitely)",
            ));
        }

        if self.count_path.trim_matches('/').is_empty() {
            return Err(ControlError::config("count_path", "Count path cannot be empty"));
        }

        Ok(())
    }

    /// Readiness poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Readiness wait bound, if any
    pub fn readiness_timeout(&self) -> Option<Duration> {
        self.readiness_timeout_secs.map(Duration::from_secs)
    }

    /// Readiness monitor described by this config
    pub fn monitor(&self) -> PoolReadinessMonitor {
        PoolReadinessMonitor::new(self.poll_interval()).with_max_wait(self.readiness_timeout())
    }
}

/// Builder for ControllerConfig
#[derive(Debug, Default)]
pub struct ControllerConfigBuilder {
    name: Option<String>,
    kind: Option<String>,
    peer_adapter: Option<String>,
    poll_interval_ms: Option<u64>,
    readiness_timeout_secs: Option<u64>,
    failure_policy: Option<FailurePolicy>,
    count_path: Option<String>,
}

impl ControllerConfigBuilder {
    /// Set controller name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set controller kind
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Set the raw peer adapter name
    pub fn peer_adapter(mut self, name: impl Into<String>) -> Self {
        self.peer_adapter = Some(name.into());
        self
    }

    /// Set readiness poll interval
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = Some(ms);
        self
    }

    /// Bound the readiness wait
    pub fn readiness_timeout_secs(mut self, secs: u64) -> Self {
        self.readiness_timeout_secs = Some(secs);
        self
    }

    /// Set worker failure policy
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = Some(policy);
        self
    }

    /// Set pool size path
    pub fn count_path(mut self, path: impl Into<String>) -> Self {
        self.count_path = Some(path.into());
        self
    }

    /// Build the config
    pub fn build(self) -> Result<ControllerConfig, ControlError> {
        let defaults = ControllerConfig::default();
        let config = ControllerConfig {
            name: self.name.unwrap_or(defaults.name),
            kind: self.kind.unwrap_or(defaults.kind),
            peer_adapter: self.peer_adapter.unwrap_or(defaults.peer_adapter),
            poll_interval_ms: self.poll_interval_ms.unwrap_or(defaults.poll_interval_ms),
            readiness_timeout_secs: self.readiness_timeout_secs,
            failure_policy: self.failure_policy.unwrap_or(defaults.failure_policy),
            count_path: self.count_path.unwrap_or(defaults.count_path),
        };

        config.validate()?;
        Ok(config)
    }
}
