//! Node lifecycle transitions.
//!
//! `NodeLifecycleController` runs the fixed sequence of control plane calls
//! behind each transition. A transition stops at the first failing step and
//! returns that error unchanged. Completed steps are not rolled back; the
//! fleet manager re-invokes the transition, and every step except the
//! pre-stop drain wait is safe to repeat.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use dcscale_auth::SessionToken;
use dcscale_core::{JobId, LabelSet, SdcId};
use tokio_util::sync::CancellationToken;

use crate::api::{ControlPlaneSession, Permission, SubjectType};
use crate::client::ControlPlaneClient;
use crate::drain::{DrainPolicy, DrainReport, JobDrainWaiter};
use crate::error::{ControlError, Result};
use crate::lifecycle::{self, NodeState, Transition};

/// Settings the controller needs for every transition.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Organization the fleet belongs to.
    pub organization: String,
    /// Service account granted access on every node alongside the operator group.
    pub service_user: String,
    /// Drain poll interval and deadline.
    pub drain: DrainPolicy,
    /// Remove duplicate job ids before rebalancing.
    pub dedupe_balance_jobs: bool,
}

/// Tracks progress through a transition for logging.
struct StepTracker<'a> {
    transition: Transition,
    sdc_id: Option<&'a SdcId>,
    state: NodeState,
}

impl<'a> StepTracker<'a> {
    fn new(transition: Transition, sdc_id: Option<&'a SdcId>) -> Self {
        Self {
            transition,
            sdc_id,
            state: transition.from_state(),
        }
    }

    fn node(&self) -> &str {
        self.sdc_id.map_or("-", SdcId::as_str)
    }

    async fn run<T, F>(&self, step: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match fut.await {
            Ok(value) => {
                tracing::debug!(
                    sdc_id = %self.node(),
                    transition = %self.transition,
                    step,
                    "Step completed"
                );
                Ok(value)
            }
            Err(err) => {
                tracing::error!(
                    sdc_id = %self.node(),
                    transition = %self.transition,
                    state = %self.state,
                    step,
                    error = %err,
                    "Step failed, completed steps are left in place"
                );
                Err(err)
            }
        }
    }

    fn advance(&mut self, next: NodeState) {
        debug_assert!(
            lifecycle::is_valid_transition(self.state, next),
            "invalid node state change {} -> {next}",
            self.state
        );
        tracing::info!(
            sdc_id = %self.node(),
            transition = %self.transition,
            from = %self.state,
            to = %next,
            "Node state changed"
        );
        self.state = next;
        if lifecycle::is_terminal(next) {
            tracing::info!(sdc_id = %self.node(), "Node removed from control plane");
        }
    }
}

/// Runs lifecycle transitions against the control plane.
pub struct NodeLifecycleController<C> {
    client: Arc<C>,
    config: LifecycleConfig,
}

impl<C: ControlPlaneClient> NodeLifecycleController<C> {
    /// Create a new controller.
    #[must_use]
    pub fn new(client: Arc<C>, config: LifecycleConfig) -> Self {
        Self { client, config }
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Bind a session token to this controller's client and organization.
    #[must_use]
    pub fn session(&self, token: &SessionToken) -> ControlPlaneSession<C> {
        ControlPlaneSession::new(
            Arc::clone(&self.client),
            token.clone(),
            self.config.organization.as_str(),
        )
    }

    /// Issue the auth token a new node will present at boot.
    ///
    /// Makes exactly one control plane call.
    ///
    /// # Errors
    ///
    /// Returns an error if issuance fails or the response carries no token.
    pub async fn pre_start(&self, token: &SessionToken) -> Result<String> {
        let session = self.session(token);
        let mut tracker = StepTracker::new(Transition::PreStart, None);

        let issued = tracker
            .run("issue_token", session.issue_component_tokens(1))
            .await?;
        let component = issued.into_iter().next().ok_or_else(|| {
            ControlError::Decode("component issuance returned no tokens".to_string())
        })?;

        tracing::info!(
            component_id = ?component.component_id,
            "Issued data collector auth token"
        );
        tracker.advance(NodeState::Authorized);
        Ok(component.full_auth_token)
    }

    /// Grant access to a started node, label it and rebalance matching jobs.
    ///
    /// Steps, in order: set the node ACL for `group` and the service user,
    /// replace the node's labels, list the jobs carrying each label, then
    /// rebalance all of those jobs in a single call.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step; later steps do not run.
    pub async fn post_start(
        &self,
        token: &SessionToken,
        sdc_id: &SdcId,
        labels: &LabelSet,
        group: &str,
    ) -> Result<()> {
        let session = self.session(token);
        let mut tracker = StepTracker::new(Transition::PostStart, Some(sdc_id));

        let permissions = [
            Permission::full_access(group, SubjectType::Group),
            Permission::full_access(self.config.service_user.as_str(), SubjectType::User),
        ];
        tracker
            .run("set_acl", session.set_sdc_acl(sdc_id, &permissions))
            .await?;

        tracker
            .run("update_labels", session.update_labels(sdc_id, labels))
            .await?;

        let mut job_ids = Vec::new();
        for label in labels.iter() {
            let jobs = tracker
                .run("list_jobs_by_label", session.jobs_by_label(label))
                .await?;
            tracing::debug!(sdc_id = %sdc_id, label, jobs = jobs.len(), "Found labeled jobs");
            job_ids.extend(jobs.into_iter().map(|job| job.id));
        }
        if self.config.dedupe_balance_jobs {
            job_ids = dedupe_preserving_order(job_ids);
        }

        tracker
            .run("balance_jobs", session.balance_jobs(&job_ids))
            .await?;
        tracing::info!(sdc_id = %sdc_id, jobs = job_ids.len(), "Requested job rebalance");

        tracker.advance(NodeState::Active);
        Ok(())
    }

    /// Drain a node and remove it from the control plane.
    ///
    /// Labels are stripped before the drain wait starts so the control plane
    /// stops placing jobs on the node, and the auth token and node resource
    /// are only removed once no migratable jobs remain.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step, including
    /// `ControlError::DrainTimeout` and `ControlError::DrainCancelled`.
    /// A failure after the labels were stripped leaves the node unlabeled
    /// with its token still active; re-invoking pre-stop starts from the top.
    pub async fn pre_stop(
        &self,
        token: &SessionToken,
        sdc_id: &SdcId,
        cancel: &CancellationToken,
    ) -> Result<DrainReport> {
        let session = self.session(token);
        let mut tracker = StepTracker::new(Transition::PreStop, Some(sdc_id));

        let job_ids = tracker
            .run("list_node_jobs", session.migratable_job_ids(sdc_id))
            .await?;

        tracker
            .run(
                "clear_labels",
                session.update_labels(sdc_id, &LabelSet::empty()),
            )
            .await?;
        tracker.advance(NodeState::Draining);

        tracker
            .run("sync_jobs", session.sync_jobs(&job_ids))
            .await?;
        tracing::info!(sdc_id = %sdc_id, jobs = job_ids.len(), "Requested job sync, waiting for drain");

        let waiter = JobDrainWaiter::new(self.config.drain);
        let report = tracker
            .run(
                "drain_wait",
                waiter.wait_until_drained(&session, sdc_id, cancel),
            )
            .await?;

        let node = [sdc_id.clone()];
        tracker
            .run(
                "deactivate_token",
                session.deactivate_component_tokens(&node),
            )
            .await?;
        tracker
            .run("delete_token", session.delete_component_tokens(&node))
            .await?;
        tracker.advance(NodeState::Deactivated);

        tracker.run("delete_node", session.delete_sdc(sdc_id)).await?;
        tracker.advance(NodeState::Deleted);

        Ok(report)
    }
}

/// Drop repeated job ids, keeping the first occurrence of each.
fn dedupe_preserving_order(job_ids: Vec<JobId>) -> Vec<JobId> {
    let mut seen = HashSet::with_capacity(job_ids.len());
    job_ids
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect()
}
