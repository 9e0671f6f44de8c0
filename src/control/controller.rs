//! Frame handler controller
//!
//! Owns this node's parameter tree and drives the one-shot
//! readiness → rank-assignment sequence on a background task.

use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::acquisition::{
    FILE_EXTENSION_PATH, FILE_NAME_PATH, FILE_PATH_PATH, FRAMES_PATH,
};
use super::peer::{ParameterController, SharedController, SharedPeer};
use super::rank::{AssignmentReport, RankAssigner};
use super::readiness::{shutdown_requested, PoolReadinessMonitor};
use crate::error::{ControlError, ControlResult};
use crate::params::ParameterTree;

// ============================================================================
// Controller State
// ============================================================================

/// Lifecycle of a controller's rank assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    /// `initialize` has not been called
    Uninitialized,

    /// Background task is polling the peer's readiness latch
    WaitingForPeerReady,

    /// Every worker received its rank
    RankAssigned,

    /// The pool size could not be read or some worker rejected its rank
    AssignmentFailed,

    /// Shut down (or timed out) before rank assignment finished
    Stopped,
}

impl ControllerState {
    /// No further transitions will happen
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::RankAssigned | Self::AssignmentFailed | Self::Stopped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::WaitingForPeerReady => "waiting_for_peer_ready",
            Self::RankAssigned => "rank_assigned",
            Self::AssignmentFailed => "assignment_failed",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Config Changes
// ============================================================================

/// Changes buffered per subscriber before the slowest one starts lagging
const CONFIG_CHANGE_CAPACITY: usize = 64;

/// A local parameter write, with the subtree as it reads afterwards
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigChange {
    pub path: String,
    pub value: Value,
}

// ============================================================================
// Frame Handler Controller
// ============================================================================

/// Controller for one frame handler node
pub struct FrameHandlerController {
    name: String,
    params: Arc<ParameterTree>,
    monitor: PoolReadinessMonitor,
    assigner: RankAssigner,
    state: Arc<watch::Sender<ControllerState>>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    last_report: Arc<RwLock<Option<AssignmentReport>>>,
    config_changes: broadcast::Sender<ConfigChange>,
}

impl FrameHandlerController {
    /// Create a controller with the default readiness and assignment settings
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_parts(name, PoolReadinessMonitor::default(), RankAssigner::default())
    }

    /// Create a controller with explicit readiness and assignment settings
    pub fn with_parts(
        name: impl Into<String>,
        monitor: PoolReadinessMonitor,
        assigner: RankAssigner,
    ) -> Self {
        let name = name.into();
        tracing::info!(name = %name, "Frame handler controller created");

        let params = ParameterTree::builder()
            .read_only("module", json!(name))
            .writable(FILE_PATH_PATH, json!(""))
            .writable(FILE_NAME_PATH, json!(""))
            .writable(FILE_EXTENSION_PATH, json!("h5"))
            .writable(FRAMES_PATH, json!(0))
            .mutable(true)
            .build();

        let (state, _) = watch::channel(ControllerState::Uninitialized);
        let (shutdown, _) = watch::channel(false);

        Self {
            name,
            params: Arc::new(params),
            monitor,
            assigner,
            state: Arc::new(state),
            shutdown,
            task: Mutex::new(None),
            last_report: Arc::new(RwLock::new(None)),
            config_changes: broadcast::channel(CONFIG_CHANGE_CAPACITY).0,
        }
    }

    /// The controller's parameter tree
    pub fn params(&self) -> &Arc<ParameterTree> {
        &self.params
    }

    pub fn assigner(&self) -> &RankAssigner {
        &self.assigner
    }

    /// Current lifecycle state
    pub fn state(&self) -> ControllerState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ControllerState> {
        self.state.subscribe()
    }

    /// Wait until the lifecycle reaches a terminal state.
    ///
    /// Never returns for a controller that is not initialized.
    pub async fn wait_settled(&self) -> ControllerState {
        let mut rx = self.state.subscribe();
        let settled = match rx.wait_for(ControllerState::is_terminal).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        settled
    }

    /// Report of the last completed assignment cycle
    pub fn last_assignment(&self) -> Option<AssignmentReport> {
        self.last_report.read().ok().and_then(|r| r.clone())
    }

    /// Start the readiness wait and the rank assignment that follows it.
    ///
    /// `peer` is polled for readiness and asked for the pool size; `workers`
    /// receives the per-rank configuration. Only the first call on a
    /// controller is accepted. Must be called from within a tokio runtime.
    pub fn initialize(&self, peer: SharedPeer, workers: SharedController) -> ControlResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ControlError::config("runtime", e.to_string()))?;

        let accepted = self.state.send_if_modified(|state| {
            if *state == ControllerState::Uninitialized {
                *state = ControllerState::WaitingForPeerReady;
                true
            } else {
                false
            }
        });
        if !accepted {
            tracing::warn!(name = %self.name, state = %self.state(), "Ignoring repeated initialize");
            return Err(ControlError::AlreadyInitialized(self.name.clone()));
        }

        tracing::info!(
            name = %self.name,
            peer = peer.name(),
            workers = workers.name(),
            "Controller initialized, waiting for peer readiness"
        );

        let monitor = self.monitor.clone();
        let assigner = self.assigner.clone();
        let state = Arc::clone(&self.state);
        let last_report = Arc::clone(&self.last_report);
        let mut shutdown = self.shutdown.subscribe();
        let name = self.name.clone();

        let handle = runtime.spawn(async move {
            match monitor.wait_ready(peer.as_ref(), &mut shutdown).await {
                Ok(_) => {}
                Err(ControlError::Cancelled) => {
                    tracing::info!(name = %name, "Readiness wait cancelled by shutdown");
                    state.send_replace(ControllerState::Stopped);
                    return;
                }
                Err(e) => {
                    tracing::error!(name = %name, error = %e, "Peer never became ready");
                    state.send_replace(ControllerState::Stopped);
                    return;
                }
            }

            let assigned = tokio::select! {
                assigned = assigner.assign(peer.as_ref(), workers.as_ref()) => assigned,
                _ = shutdown_requested(&mut shutdown) => {
                    tracing::warn!(name = %name, "Rank assignment interrupted by shutdown");
                    state.send_replace(ControllerState::Stopped);
                    return;
                }
            };

            let next = match assigned {
                Ok(report) => {
                    let next = if report.is_complete() {
                        tracing::info!(
                            name = %name,
                            process_count = report.process_count,
                            "Rank assignment complete"
                        );
                        ControllerState::RankAssigned
                    } else {
                        tracing::error!(
                            name = %name,
                            assigned = report.assigned.len(),
                            failed = report.failures.len(),
                            aborted = report.aborted,
                            "Rank assignment incomplete"
                        );
                        ControllerState::AssignmentFailed
                    };
                    if let Ok(mut slot) = last_report.write() {
                        *slot = Some(report);
                    }
                    next
                }
                Err(e) => {
                    tracing::error!(name = %name, error = %e, "Rank assignment failed");
                    ControllerState::AssignmentFailed
                }
            };
            state.send_replace(next);
        });

        if let Ok(mut task) = self.task.lock() {
            *task = Some(handle);
        }
        Ok(())
    }

    /// Stop the background task and wait for it to finish. Idempotent.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);

        let handle = self.task.lock().ok().and_then(|mut task| task.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(name = %self.name, error = %e, "Controller task ended abnormally");
            }
        }

        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = ControllerState::Stopped;
                true
            }
        });
        tracing::info!(name = %self.name, state = %self.state(), "Controller shut down");
    }

    /// Receive every change accepted by [`put`](ParameterController::put)
    pub fn subscribe_config_changes(&self) -> broadcast::Receiver<ConfigChange> {
        self.config_changes.subscribe()
    }

    fn process_config_changes(&self, path: &str) {
        let value = match self.params.get(path, false) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(name = %self.name, path, error = %e, "Changed path unreadable");
                return;
            }
        };
        tracing::debug!(name = %self.name, path, "Configuration updated");

        let change = ConfigChange {
            path: path.trim_matches('/').to_string(),
            value,
        };
        // Err only means nobody is subscribed
        let _ = self.config_changes.send(change);
    }
}

impl Drop for FrameHandlerController {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

#[async_trait]
impl ParameterController for FrameHandlerController {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, path: &str, with_metadata: bool) -> ControlResult<Value> {
        self.params.get(path, with_metadata)
    }

    async fn put(&self, path: &str, value: Value) -> ControlResult<()> {
        self.params.set(path, value)?;
        self.process_config_changes(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_module_parameter() {
        let controller = FrameHandlerController::new("fp1");
        let value = controller.get("module", false).await.unwrap();
        assert_eq!(value, json!({"module": "fp1"}));
        assert!(controller.put("module", json!("other")).await.is_err());
    }

    #[tokio::test]
    async fn test_put_creates_new_paths() {
        let controller = FrameHandlerController::new("fp1");
        controller.put("x", json!(5)).await.unwrap();
        assert_eq!(controller.get("x", false).await.unwrap(), json!({"x": 5}));
    }

    #[tokio::test]
    async fn test_shutdown_before_initialize() {
        let controller = FrameHandlerController::new("fp1");
        assert_eq!(controller.state(), ControllerState::Uninitialized);
        controller.shutdown().await;
        assert_eq!(controller.state(), ControllerState::Stopped);
        controller.shutdown().await;
        assert_eq!(controller.state(), ControllerState::Stopped);
    }

    #[tokio::test]
    async fn test_put_publishes_change() {
        let controller = FrameHandlerController::new("fp1");
        let mut changes = controller.subscribe_config_changes();

        controller.put(FRAMES_PATH, json!(10)).await.unwrap();
        assert!(controller.put("module", json!("other")).await.is_err());
        controller.put("/x/", json!(5)).await.unwrap();

        let first = changes.recv().await.unwrap();
        assert_eq!(first.path, FRAMES_PATH);
        assert_eq!(first.value, controller.get(FRAMES_PATH, false).await.unwrap());

        let second = changes.recv().await.unwrap();
        assert_eq!(second, ConfigChange { path: "x".into(), value: json!({"x": 5}) });
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_put_without_subscribers() {
        let controller = FrameHandlerController::new("fp1");
        controller.put("x", json!(1)).await.unwrap();
        assert_eq!(controller.get("x", false).await.unwrap(), json!({"x": 1}));
    }

    #[test]
    fn test_state_labels() {
        assert!(ControllerState::RankAssigned.is_terminal());
        assert!(!ControllerState::WaitingForPeerReady.is_terminal());
        assert_eq!(ControllerState::AssignmentFailed.to_string(), "assignment_failed");
    }
}
