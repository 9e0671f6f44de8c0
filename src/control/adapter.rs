//! Adapter surface for a frame handler node
//!
//! Translates `get`/`put` into `(body, status)` pairs the way the web
//! control layer expects. Requests go to the connected peer adapter first
//! and fall back to the local controller; only the last attempt's outcome
//! is reported.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use super::acquisition::{
    is_local_path, is_write_command, parse_write_flag, AcquisitionFanout, AcquisitionSettings,
};
use super::config::ControllerConfig;
use super::controller::FrameHandlerController;
use super::factory::ControllerRegistry;
use super::fallback::FallbackRouter;
use super::peer::{ParameterController, SharedController, SharedPeer};
use crate::error::{ControlError, ControlResult};

/// Status and JSON body returned to the web layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdapterResponse {
    pub body: Value,
    pub status: u16,
}

impl AdapterResponse {
    pub fn ok(body: Value) -> Self {
        Self { body, status: 200 }
    }

    pub fn empty() -> Self {
        Self::ok(json!({}))
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            body: json!({ "error": message.into() }),
            status,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Adapter pairing a local controller with a raw peer adapter
pub struct FrameHandlerAdapter {
    name: String,
    peer_adapter: String,
    controller: Arc<FrameHandlerController>,
    peer: Option<SharedPeer>,
    workers: Option<SharedController>,
    router: Option<FallbackRouter>,
    fanout: AcquisitionFanout,
}

impl FrameHandlerAdapter {
    /// Wrap `controller`; the peer adapter defaults to `od_fps`
    pub fn new(name: impl Into<String>, controller: Arc<FrameHandlerController>) -> Self {
        let fanout = AcquisitionFanout::new(controller.assigner().clone());
        Self {
            name: name.into(),
            peer_adapter: ControllerConfig::default().peer_adapter,
            controller,
            peer: None,
            workers: None,
            router: None,
            fanout,
        }
    }

    /// Build the controller from `config` through `registry` and wrap it
    pub fn from_config(config: &ControllerConfig, registry: &ControllerRegistry) -> ControlResult<Self> {
        let controller = Arc::new(registry.build(config)?);
        Ok(Self::new(config.name.clone(), controller).with_peer_adapter(config.peer_adapter.clone()))
    }

    /// Name of the peer adapter looked up by [`initialize`](Self::initialize)
    pub fn with_peer_adapter(mut self, name: impl Into<String>) -> Self {
        self.peer_adapter = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn controller(&self) -> &Arc<FrameHandlerController> {
        &self.controller
    }

    pub fn is_connected(&self) -> bool {
        self.peer.is_some()
    }

    /// Find the configured peer among the loaded adapters and connect to it.
    ///
    /// A missing peer is logged and leaves the adapter serving from the local
    /// controller only. The peer also receives worker configuration.
    pub fn initialize(&mut self, adapters: &HashMap<String, SharedPeer>) -> ControlResult<()> {
        match adapters.get(&self.peer_adapter) {
            Some(peer) => {
                let workers = Arc::clone(peer).as_controller();
                self.connect(Arc::clone(peer), workers)
            }
            None => {
                tracing::error!(
                    name = %self.name,
                    peer_adapter = %self.peer_adapter,
                    "Peer adapter not found, serving local parameters only"
                );
                Ok(())
            }
        }
    }

    /// Connect to an explicit peer and worker controller and start the
    /// controller's rank assignment
    pub fn connect(&mut self, peer: SharedPeer, workers: SharedController) -> ControlResult<()> {
        self.controller
            .initialize(Arc::clone(&peer), Arc::clone(&workers))?;

        let local: SharedController = self.controller.clone();
        self.router = Some(FallbackRouter::new(Arc::clone(&peer).as_controller(), local));
        self.peer = Some(peer);
        self.workers = Some(workers);

        tracing::info!(name = %self.name, peer_adapter = %self.peer_adapter, "Adapter connected");
        Ok(())
    }

    /// Read `path`
    pub async fn get(&self, path: &str, with_metadata: bool) -> AdapterResponse {
        let result = match &self.router {
            Some(router) if !is_local_path(path) => router
                .read(path, with_metadata)
                .await
                .map(|routed| routed.value)
                .map_err(|e| e.last().clone()),
            _ => self.controller.get(path, with_metadata).await,
        };

        match result {
            Ok(value) => AdapterResponse::ok(value),
            Err(e) => AdapterResponse {
                body: json!({ "response": format!("{} GET error: {}", self.name, e) }),
                status: 400,
            },
        }
    }

    /// Write `value` to `path`
    pub async fn put(&self, path: &str, value: Value) -> AdapterResponse {
        if is_write_command(path) {
            return self.write_command(&value).await;
        }

        if is_local_path(path) {
            return match self.controller.put(path, value).await {
                Ok(()) => AdapterResponse::empty(),
                Err(e) => AdapterResponse::error(400, e.to_string()),
            };
        }

        let accepted = match &self.router {
            Some(router) => match router.write(path, value).await {
                Ok(routed) => {
                    tracing::debug!(path, backend = routed.source.as_str(), "Write accepted");
                    true
                }
                Err(e) => {
                    tracing::debug!(path, error = %e, "Write rejected by both controllers");
                    false
                }
            },
            None => self.controller.put(path, value).await.is_ok(),
        };

        if accepted {
            AdapterResponse::empty()
        } else {
            AdapterResponse {
                body: json!({ "error": format!("PUT method not implemented by {}", self.name) }),
                status: 400,
            }
        }
    }

    async fn write_command(&self, value: &Value) -> AdapterResponse {
        let (Some(peer), Some(workers)) = (&self.peer, &self.workers) else {
            return AdapterResponse::error(
                503,
                format!("{} is not connected to peer adapter {}", self.name, self.peer_adapter),
            );
        };

        let result = if parse_write_flag(value) {
            match AcquisitionSettings::from_tree(self.controller.params()) {
                Ok(settings) => self
                    .fanout
                    .start(&settings, peer.as_ref(), workers.as_ref())
                    .await
                    .map(|report| json!({ "process_count": report.process_count })),
                Err(e) => Err(e),
            }
        } else {
            self.fanout
                .stop(peer.as_ref(), workers.as_ref())
                .await
                .map(|count| json!({ "process_count": count }))
        };

        match result {
            Ok(body) => AdapterResponse::ok(body),
            Err(e) => {
                tracing::error!(name = %self.name, error = %e, "Write command failed");
                AdapterResponse::error(503, e.to_string())
            }
        }
    }

    /// Lifecycle summary of the wrapped controller
    pub fn status(&self) -> Value {
        json!({
            "name": self.name,
            "connected": self.is_connected(),
            "state": self.controller.state(),
            "assignment": self.controller.last_assignment(),
        })
    }

    /// Stop the controller's background work
    pub async fn cleanup(&self) {
        self.controller.shutdown().await;
    }
}

impl std::fmt::Debug for FrameHandlerAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHandlerAdapter")
            .field("name", &self.name)
            .field("peer_adapter", &self.peer_adapter)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl From<ControlError> for AdapterResponse {
    fn from(e: ControlError) -> Self {
        Self::error(e.status_code(), e.to_string())
    }
}
