//! Control core for a frame handler node
//!
//! Waits for the peer adapter to complete its first update, assigns every
//! worker in the pool a rank, and serves parameter reads and writes with
//! fallback from the peer to the local controller.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            FrameHandlerAdapter              │
//! │   get/put → (body, status)                  │
//! │                                             │
//! │  ┌───────────────────┐  ┌────────────────┐  │
//! │  │  FallbackRouter   │  │ Acquisition    │  │
//! │  │  peer → local     │  │ Fanout         │  │
//! │  └───────────────────┘  └────────────────┘  │
//! │                                             │
//! │  ┌───────────────────────────────────────┐  │
//! │  │       FrameHandlerController          │  │
//! │  │  - ParameterTree                      │  │
//! │  │  - PoolReadinessMonitor (background)  │  │
//! │  │  - RankAssigner                       │  │
//! │  └───────────────────────────────────────┘  │
//! └─────────────────────────────────────────────┘
//!          │ first_update, count      │ <r>/config
//!          ▼                          ▼
//!       peer adapter               workers
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use framectl::control::{ControllerConfig, ControllerRegistry, FrameHandlerAdapter};
//!
//! let config = ControllerConfig::default();
//! let mut adapter = FrameHandlerAdapter::from_config(&config, &ControllerRegistry::default())?;
//! adapter.initialize(&loaded_adapters)?;
//! let response = adapter.get("module", false).await;
//! ```

pub mod acquisition;
pub mod adapter;
pub mod config;
pub mod controller;
pub mod factory;
pub mod fallback;
pub mod peer;
pub mod rank;
pub mod readiness;

// Re-export main types
pub use acquisition::{AcquisitionFanout, AcquisitionSettings};
pub use adapter::{AdapterResponse, FrameHandlerAdapter};
pub use config::ControllerConfig;
pub use controller::{ConfigChange, ControllerState, FrameHandlerController};
pub use factory::ControllerRegistry;
pub use fallback::{Backend, FallbackError, FallbackRouter, Routed};
pub use peer::{ParameterController, PoolPeer, ReadinessSource, SharedController, SharedPeer};
pub use rank::{AssignmentReport, FailurePolicy, RankAssigner, RankAssignment};
pub use readiness::PoolReadinessMonitor;
