//! framectl - rank assignment and fallback control for frame handler pools
//!
//! Coordinates a pool of frame processing workers behind a control adapter:
//! waits for the peer adapter's first update, assigns each worker a rank out
//! of the current pool size, and serves parameter reads and writes with
//! fallback from the peer to a local controller.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`control`] - Controller, rank assignment, readiness and fallback routing
//! - [`params`] - Path-addressable parameter tree
//! - [`client`] - HTTP peer speaking to a remote control adapter
//! - [`metrics`] - Prometheus metrics
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use framectl::client::{ClientConfig, HttpPeer};
//! use framectl::control::{ControllerRegistry, PoolPeer};
//! use framectl::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let controller = ControllerRegistry::default().build(&config.controller)?;
//!     let peer = Arc::new(HttpPeer::new("od_fps", config.peers.client_config())?);
//!     controller.initialize(peer.clone(), peer.as_controller())?;
//!     controller.wait_settled().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod control;
pub mod error;
pub mod metrics;
pub mod params;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::{ClientConfig, HttpPeer};
    pub use crate::config::Config;
    pub use crate::control::{
        AdapterResponse, ControllerConfig, ControllerRegistry, ControllerState, FailurePolicy,
        FrameHandlerAdapter, FrameHandlerController, ParameterController, PoolPeer,
        ReadinessSource,
    };
    pub use crate::error::{ControlError, ControlResult, ErrorCategory};
    pub use crate::params::{Param, ParameterTree};
}

// Direct re-exports for convenience
pub use error::{ControlError, ControlResult};
