//! Primary/secondary fallback routing
//!
//! Reads and writes go to the primary controller first and only reach the
//! secondary when the primary fails. The result records which backend
//! served the request; on total failure both errors are kept.

use std::fmt;

use serde_json::Value;

use super::peer::{ParameterController, SharedController};
use crate::error::ControlError;
use crate::metrics;

/// Which backend served a routed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Primary,
    Secondary,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

/// A successful routed result and the backend that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Routed<T> {
    pub value: T,
    pub source: Backend,
}

/// Both backends failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackError {
    pub primary: ControlError,
    pub secondary: ControlError,
}

impl FallbackError {
    /// The error of the last attempted backend
    pub fn last(&self) -> &ControlError {
        &self.secondary
    }
}

impl fmt::Display for FallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "primary failed ({}), secondary failed ({})",
            self.primary, self.secondary
        )
    }
}

impl std::error::Error for FallbackError {}

/// Routes requests across a primary and a secondary controller
#[derive(Clone)]
pub struct FallbackRouter {
    primary: SharedController,
    secondary: SharedController,
}

impl FallbackRouter {
    pub fn new(primary: SharedController, secondary: SharedController) -> Self {
        Self { primary, secondary }
    }

    pub fn primary(&self) -> &dyn ParameterController {
        self.primary.as_ref()
    }

    pub fn secondary(&self) -> &dyn ParameterController {
        self.secondary.as_ref()
    }

    /// Read `path`, falling back to the secondary when the primary fails
    pub async fn read(&self, path: &str, with_metadata: bool) -> Result<Routed<Value>, FallbackError> {
        let primary = match self.primary.get(path, with_metadata).await {
            Ok(value) => {
                metrics::record_fallback("read", Backend::Primary.as_str());
                return Ok(Routed {
                    value,
                    source: Backend::Primary,
                });
            }
            Err(e) => e,
        };

        tracing::debug!(
            path,
            primary = self.primary.name(),
            error = %primary,
            "Primary read failed, trying secondary"
        );

        match self.secondary.get(path, with_metadata).await {
            Ok(value) => {
                metrics::record_fallback("read", Backend::Secondary.as_str());
                Ok(Routed {
                    value,
                    source: Backend::Secondary,
                })
            }
            Err(secondary) => {
                metrics::record_fallback("read", "none");
                Err(FallbackError { primary, secondary })
            }
        }
    }

    /// Write `value` to `path`, falling back to the secondary when the
    /// primary fails for any reason
    pub async fn write(&self, path: &str, value: Value) -> Result<Routed<()>, FallbackError> {
        let primary = match self.primary.put(path, value.clone()).await {
            Ok(()) => {
                metrics::record_fallback("write", Backend::Primary.as_str());
                return Ok(Routed {
                    value: (),
                    source: Backend::Primary,
                });
            }
            Err(e) => e,
        };

        tracing::debug!(
            path,
            primary = self.primary.name(),
            error = %primary,
            "Primary write failed, trying secondary"
        );

        match self.secondary.put(path, value).await {
            Ok(()) => {
                metrics::record_fallback("write", Backend::Secondary.as_str());
                Ok(Routed {
                    value: (),
                    source: Backend::Secondary,
                })
            }
            Err(secondary) => {
                metrics::record_fallback("write", "none");
                Err(FallbackError { primary, secondary })
            }
        }
    }
}
