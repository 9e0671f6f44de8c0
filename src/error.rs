//! Unified error handling for the framectl crate
//!
//! Every fallible operation in the control core returns [`ControlResult`].
//! The variants map onto the failure classes the adapter layer needs to
//! tell apart: tree-level faults that surface as HTTP 400, peer faults that
//! trigger fallback, and lifecycle faults of the controller itself.

use thiserror::Error;

/// Result type for control operations
pub type ControlResult<T> = Result<T, ControlError>;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Errors raised by a parameter tree (bad path, bad value)
    Parameter,
    /// A peer controller could not be reached or answered badly
    Peer,
    /// Controller lifecycle errors (double initialize, cancellation)
    Lifecycle,
    /// Configuration and validation errors
    Config,
}

impl ErrorCategory {
    /// Short label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parameter => "parameter",
            Self::Peer => "peer",
            Self::Lifecycle => "lifecycle",
            Self::Config => "config",
        }
    }
}

/// Errors raised by the control core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// The addressed path does not exist in the tree
    #[error("Invalid path: {0}")]
    PathNotFound(String),

    /// The value cannot be stored at the addressed path
    #[error("Invalid value for '{path}': {reason}")]
    InvalidValue { path: String, reason: String },

    /// A peer controller read or write failed
    #[error("Peer unavailable: {0}")]
    PeerUnavailable(String),

    /// The pool size could not be read from the peer's response
    #[error("Pool size missing: {0}")]
    PoolSizeMissing(String),

    /// `initialize` was called on a controller that already left the
    /// uninitialized state
    #[error("Controller '{0}' is already initialized")]
    AlreadyInitialized(String),

    /// A background wait was cancelled by shutdown
    #[error("Operation cancelled")]
    Cancelled,

    /// The peer never reported readiness within the configured bound
    #[error("Peer not ready after {waited_ms}ms")]
    ReadinessTimeout { waited_ms: u64 },

    /// No controller factory registered under the requested kind
    #[error("Unknown controller kind '{kind}'. Registered kinds: {}", registered.join(", "))]
    UnknownControllerKind {
        kind: String,
        registered: Vec<String>,
    },

    /// Configuration error
    #[error("Configuration error in '{field}': {reason}")]
    Config { field: String, reason: String },
}

impl ControlError {
    /// Create an invalid value error
    pub fn invalid_value(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// HTTP-equivalent status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::PathNotFound(_) | Self::InvalidValue { .. } => 400,
            Self::PeerUnavailable(_) | Self::PoolSizeMissing(_) => 503,
            Self::AlreadyInitialized(_) => 409,
            Self::Cancelled | Self::ReadinessTimeout { .. } => 503,
            Self::UnknownControllerKind { .. } | Self::Config { .. } => 500,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::PathNotFound(_) | Self::InvalidValue { .. } => ErrorCategory::Parameter,
            Self::PeerUnavailable(_) | Self::PoolSizeMissing(_) => ErrorCategory::Peer,
            Self::AlreadyInitialized(_) | Self::Cancelled | Self::ReadinessTimeout { .. } => {
                ErrorCategory::Lifecycle
            }
            Self::UnknownControllerKind { .. } | Self::Config { .. } => ErrorCategory::Config,
        }
    }

    /// Check if the error is recoverable (a later attempt may succeed)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PeerUnavailable(_) | Self::ReadinessTimeout { .. }
        )
    }
}

impl From<serde_json::Error> for ControlError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidValue {
            path: String::new(),
            reason: err.to_string(),
        }
    }
}
