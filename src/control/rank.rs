//! Rank assignment across a worker pool
//!
//! Reads the pool size from the peer controller, then pushes one
//! `{"hdf": {"process": {"number": N, "rank": r}}}` fragment to each worker
//! at `"<r>/config"`, strictly in increasing rank order.
//!
//! The peer the pool size is read from and the controller whose workers
//! receive configuration are distinct endpoints and are always passed as
//! two separate arguments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::peer::ParameterController;
use crate::error::{ControlError, ControlResult};
use crate::metrics;

/// Default path of the pool size on the peer controller
pub const DEFAULT_COUNT_PATH: &str = "count";

// ============================================================================
// Failure Policy
// ============================================================================

/// What to do when a single worker rejects its rank
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failed write; later ranks are not attempted
    #[default]
    AbortOnFirst,

    /// Attempt every rank and collect the failures
    ContinueOnError,
}

impl std::str::FromStr for FailurePolicy {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" | "abort_on_first" => Ok(Self::AbortOnFirst),
            "continue" | "continue_on_error" => Ok(Self::ContinueOnError),
            other => Err(ControlError::config(
                "failure_policy",
                format!("unknown policy '{other}', expected 'abort' or 'continue'"),
            )),
        }
    }
}

// ============================================================================
// Assignment Types
// ============================================================================

/// One worker's position in the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankAssignment {
    pub process_count: usize,
    pub rank: usize,
}

impl RankAssignment {
    /// Path of the worker's configuration node
    pub fn config_path(&self) -> String {
        worker_config_path(self.rank)
    }

    /// Configuration fragment carrying this assignment
    pub fn fragment(&self) -> Value {
        json!({
            "hdf": {
                "process": {
                    "number": self.process_count,
                    "rank": self.rank,
                }
            }
        })
    }
}

/// Path of the configuration node of the worker at `rank`
pub fn worker_config_path(rank: usize) -> String {
    format!("{rank}/config")
}

/// A rank whose configuration write failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankFailure {
    pub rank: usize,
    pub error: String,
}

/// Outcome of one assignment cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentReport {
    pub process_count: usize,
    /// Ranks whose write succeeded, in the order they were issued
    pub assigned: Vec<usize>,
    pub failures: Vec<RankFailure>,
    /// True when the abort-on-first policy ended the loop at a failure
    pub aborted: bool,
    pub completed_at: DateTime<Utc>,
}

impl AssignmentReport {
    /// Every rank in the pool received its assignment
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.assigned.len() == self.process_count
    }

    /// Short label for logs and metrics
    pub fn result_label(&self) -> &'static str {
        if self.is_complete() {
            "complete"
        } else if self.aborted {
            "aborted"
        } else {
            "partial"
        }
    }
}

// ============================================================================
// Rank Assigner
// ============================================================================

/// Pushes rank assignments to every worker in the pool
#[derive(Debug, Clone)]
pub struct RankAssigner {
    policy: FailurePolicy,
    count_path: String,
}

impl Default for RankAssigner {
    fn default() -> Self {
        Self::new(FailurePolicy::default())
    }
}

impl RankAssigner {
    /// Create an assigner reading the pool size from [`DEFAULT_COUNT_PATH`]
    pub fn new(policy: FailurePolicy) -> Self {
        Self {
            policy,
            count_path: DEFAULT_COUNT_PATH.to_string(),
        }
    }

    /// Read the pool size from another path
    pub fn with_count_path(mut self, path: impl Into<String>) -> Self {
        self.count_path = path.into();
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Read the current pool size from `peer`.
    ///
    /// The peer answers `{"count": N}`; the key is the last segment of the
    /// configured count path.
    pub async fn read_pool_size<P>(&self, peer: &P) -> ControlResult<usize>
    where
        P: ParameterController + ?Sized,
    {
        let response = peer.get(&self.count_path, false).await.map_err(|e| match e {
            ControlError::PeerUnavailable(_) => e,
            other => ControlError::PeerUnavailable(format!(
                "reading '{}' from {}: {}",
                self.count_path,
                peer.name(),
                other
            )),
        })?;

        let key = self
            .count_path
            .rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or(DEFAULT_COUNT_PATH);

        response
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| {
                ControlError::PoolSizeMissing(format!(
                    "{} returned no integer '{}' field: {}",
                    peer.name(),
                    key,
                    response
                ))
            })
    }

    /// Run one assignment cycle.
    ///
    /// Fails without issuing any write when the pool size cannot be read.
    /// Worker write failures are handled per the configured policy and
    /// reported in the returned [`AssignmentReport`].
    pub async fn assign<P, W>(&self, peer: &P, workers: &W) -> ControlResult<AssignmentReport>
    where
        P: ParameterController + ?Sized,
        W: ParameterController + ?Sized,
    {
        let process_count = match self.read_pool_size(peer).await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(peer = peer.name(), error = %e, "Failed to read pool size");
                metrics::record_assignment_cycle("failed", None);
                return Err(e);
            }
        };

        tracing::info!(
            process_count,
            workers = workers.name(),
            "Setting up rank information for {} processes",
            process_count
        );

        let report = self.push_ranks(process_count, 0..process_count, workers).await;

        metrics::record_assignment_cycle(report.result_label(), Some(process_count));
        Ok(report)
    }

    /// Push assignments for `ranks` out of a pool of `process_count`.
    ///
    /// Ranks are drawn one at a time; nothing is sized from `process_count`.
    pub async fn push_ranks<W, R>(
        &self,
        process_count: usize,
        ranks: R,
        workers: &W,
    ) -> AssignmentReport
    where
        W: ParameterController + ?Sized,
        R: IntoIterator<Item = usize>,
    {
        let mut assigned = Vec::new();
        let mut failures = Vec::new();
        let mut aborted = false;

        for rank in ranks {
            let assignment = RankAssignment {
                process_count,
                rank,
            };
            let path = assignment.config_path();
            tracing::debug!(rank, path = %path, "Sending rank config to worker");

            match workers.put(&path, assignment.fragment()).await {
                Ok(()) => {
                    metrics::record_rank_write(true);
                    assigned.push(rank);
                }
                Err(e) => {
                    metrics::record_rank_write(false);
                    tracing::error!(rank, error = %e, "Failed to send rank information to worker");
                    failures.push(RankFailure {
                        rank,
                        error: e.to_string(),
                    });

                    if self.policy == FailurePolicy::AbortOnFirst {
                        aborted = true;
                        break;
                    }
                }
            }
        }

        AssignmentReport {
            process_count,
            assigned,
            failures,
            aborted,
            completed_at: Utc::now(),
        }
    }
}
