//! Waiting for a node to drain.
//!
//! After a node's labels are stripped and its jobs re-synced, the control
//! plane moves the node's migratable jobs elsewhere. `JobDrainWaiter` polls
//! the node's job set at a fixed interval until it is empty, the deadline
//! passes, or the caller cancels.
//!
//! Timing uses `tokio::time`, so tests can drive the waiter on a paused clock.

use std::time::Duration;

use async_trait::async_trait;
use dcscale_core::{JobId, SdcId};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ControlError, Result};

/// Default time between drain polls.
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_secs(5);

/// Default upper bound on a drain wait.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(3600);

/// Source of the jobs still assigned to a node.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Ids of the migratable jobs currently assigned to `sdc_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the job set cannot be retrieved.
    async fn migratable_jobs(&self, sdc_id: &SdcId) -> Result<Vec<JobId>>;
}

/// Poll interval and deadline for a drain wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainPolicy {
    /// Time between polls.
    pub interval: Duration,
    /// Maximum time to wait before giving up.
    pub timeout: Duration,
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_DRAIN_INTERVAL,
            timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

/// Outcome of a successful drain wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Number of times the job set was queried.
    pub polls: u32,
    /// Time from the first poll to the empty result.
    pub waited: Duration,
}

/// Blocks until a node has no migratable jobs left.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobDrainWaiter {
    policy: DrainPolicy,
}

impl JobDrainWaiter {
    /// Create a waiter with the given policy.
    #[must_use]
    pub const fn new(policy: DrainPolicy) -> Self {
        Self { policy }
    }

    /// Get the policy.
    #[must_use]
    pub const fn policy(&self) -> DrainPolicy {
        self.policy
    }

    /// Poll `source` until `sdc_id` has no migratable jobs.
    ///
    /// The job set is queried immediately, then once per interval. Once the
    /// deadline is reached a final poll decides between success and timeout,
    /// so a wait never times out before the deadline.
    ///
    /// Cancellation and the deadline also apply while a poll is outstanding.
    /// A stalled poll ends the wait at the deadline, or one interval after it
    /// started if that is later, reporting the job count of the last answer.
    ///
    /// # Errors
    ///
    /// - `ControlError::DrainTimeout` if jobs remain at the deadline
    /// - `ControlError::DrainCancelled` if `cancel` fires first
    /// - any error from `source`, which aborts the wait immediately
    pub async fn wait_until_drained<J: JobSource + ?Sized>(
        &self,
        source: &J,
        sdc_id: &SdcId,
        cancel: &CancellationToken,
    ) -> Result<DrainReport> {
        let started = Instant::now();
        let deadline = started + self.policy.timeout;
        let mut polls = 0u32;
        let mut remaining = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(ControlError::DrainCancelled(sdc_id.clone()));
            }

            // The poll issued at the deadline still gets one interval to answer.
            let poll_deadline = deadline.max(Instant::now() + self.policy.interval);
            let jobs = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::warn!(sdc_id = %sdc_id, polls, "Drain wait cancelled during poll");
                    return Err(ControlError::DrainCancelled(sdc_id.clone()));
                }
                result = source.migratable_jobs(sdc_id) => result?,
                () = tokio::time::sleep_until(poll_deadline) => {
                    tracing::warn!(
                        sdc_id = %sdc_id,
                        remaining,
                        polls,
                        "Drain deadline reached while a job listing was outstanding"
                    );
                    return Err(ControlError::DrainTimeout {
                        sdc_id: sdc_id.clone(),
                        remaining,
                        waited: Instant::now() - started,
                    });
                }
            };
            polls += 1;
            remaining = jobs.len();
            let now = Instant::now();

            if jobs.is_empty() {
                let report = DrainReport {
                    polls,
                    waited: now - started,
                };
                tracing::info!(
                    sdc_id = %sdc_id,
                    polls = report.polls,
                    waited = ?report.waited,
                    "Node drained"
                );
                return Ok(report);
            }

            if now >= deadline {
                tracing::warn!(
                    sdc_id = %sdc_id,
                    remaining = jobs.len(),
                    polls,
                    "Drain deadline reached with jobs still assigned"
                );
                return Err(ControlError::DrainTimeout {
                    sdc_id: sdc_id.clone(),
                    remaining: jobs.len(),
                    waited: now - started,
                });
            }

            tracing::debug!(
                sdc_id = %sdc_id,
                remaining = jobs.len(),
                poll = polls,
                "Waiting for jobs to leave node"
            );

            let wake_at = (now + self.policy.interval).min(deadline);
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::warn!(sdc_id = %sdc_id, polls, "Drain wait cancelled");
                    return Err(ControlError::DrainCancelled(sdc_id.clone()));
                }
                () = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }
}
