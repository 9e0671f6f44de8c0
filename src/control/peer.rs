//! Collaborator controller traits
//!
//! Every controller the core talks to, local or remote, is reached through
//! these traits. The core only ever holds them behind `Arc`, so it never
//! owns a collaborator's lifetime.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ControlResult;

/// A controller exposing a path-addressable parameter interface
#[async_trait]
pub trait ParameterController: Send + Sync {
    /// Name used in logs and error messages
    fn name(&self) -> &str;

    /// Read the value at `path`, optionally with metadata
    async fn get(&self, path: &str, with_metadata: bool) -> ControlResult<Value>;

    /// Write `value` at `path`
    async fn put(&self, path: &str, value: Value) -> ControlResult<()>;
}

/// A controller exposing the one-way `first_update` readiness latch
#[async_trait]
pub trait ReadinessSource: Send + Sync {
    /// Whether the controller has completed its first update cycle
    async fn first_update(&self) -> ControlResult<bool>;
}

/// The peer a controller waits on and reads the pool size from
pub trait PoolPeer: ParameterController + ReadinessSource {
    /// View this peer as a plain parameter controller
    fn as_controller(self: Arc<Self>) -> SharedController;
}

impl<T: ParameterController + ReadinessSource + 'static> PoolPeer for T {
    fn as_controller(self: Arc<Self>) -> SharedController {
        self
    }
}

/// Shared handle to a parameter controller
pub type SharedController = Arc<dyn ParameterController>;

/// Shared handle to a pool peer
pub type SharedPeer = Arc<dyn PoolPeer>;
