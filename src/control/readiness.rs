//! Peer readiness monitoring
//!
//! Waits for a peer's `first_update` latch to flip before rank assignment
//! may run. The wait polls on a fixed interval, stops early when the
//! shutdown signal fires, and can optionally give up after a bound.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use super::peer::ReadinessSource;
use crate::error::{ControlError, ControlResult};
use crate::metrics;

/// Default interval between readiness polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Polls a [`ReadinessSource`] until it reports ready
#[derive(Debug, Clone)]
pub struct PoolReadinessMonitor {
    poll_interval: Duration,
    max_wait: Option<Duration>,
}

impl Default for PoolReadinessMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl PoolReadinessMonitor {
    /// Create an unbounded monitor polling every `poll_interval`
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            max_wait: None,
        }
    }

    /// Give up with [`ControlError::ReadinessTimeout`] after `max_wait`
    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Interval between polls
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait until `source` reports its first update.
    ///
    /// Returns the number of polls issued. A failed poll counts as "not
    /// ready yet". Setting the shutdown channel to `true` (or dropping its
    /// sender) ends the wait with [`ControlError::Cancelled`].
    pub async fn wait_ready<S>(
        &self,
        source: &S,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ControlResult<u64>
    where
        S: ReadinessSource + ?Sized,
    {
        let started = Instant::now();
        let deadline = self.max_wait.map(|max| started + max);
        let mut polls = 0u64;

        loop {
            if *shutdown.borrow() {
                tracing::debug!(polls, "Readiness wait cancelled");
                return Err(ControlError::Cancelled);
            }

            polls += 1;
            metrics::record_readiness_poll();
            let polled = tokio::select! {
                polled = source.first_update() => polled,
                _ = shutdown_requested(shutdown) => {
                    tracing::debug!(polls, "Readiness poll abandoned on shutdown");
                    return Err(ControlError::Cancelled);
                }
            };
            match polled {
                Ok(true) => {
                    tracing::info!(
                        polls,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "Peer reported first update"
                    );
                    return Ok(polls);
                }
                Ok(false) => {}
                Err(e) => tracing::debug!(error = %e, "Readiness poll failed, treating as not ready"),
            }

            let sleep_for = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(ControlError::ReadinessTimeout {
                            waited_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                    self.poll_interval.min(deadline - now)
                }
                None => self.poll_interval,
            };

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = shutdown_requested(shutdown) => {
                    tracing::debug!(polls, "Readiness wait cancelled");
                    return Err(ControlError::Cancelled);
                }
            }
        }
    }
}

/// Resolves once `shutdown` holds `true` or its sender is gone
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
