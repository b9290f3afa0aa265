//! Reconciliation entry point
//!
//! A [`GroupsManager`] is created once per run from the state the previous
//! run exported. Each [`update`](GroupsManager::update) normalizes a desired
//! state, recomputes the aggregate groups and queues whatever differs from
//! the confirmed state; [`execute`](GroupsManager::execute) then applies the
//! queues through the controller.

use crate::aggregate::generate_aggregated;
use crate::config::ReconcileConfig;
use crate::controller::GroupsController;
use crate::differ::diff;
use crate::error::Result;
use crate::journal::{Journal, RetryPolicy};
use crate::normalize::{DesiredState, normalize};
use crate::state::{GroupTree, PersistedState};
use crate::summary::{ExecuteSummary, PlanSummary};
use grouppolicy::GroupPolicy;

pub struct GroupsManager<C> {
    journal: Journal<C>,
    policy: GroupPolicy,
    desired: Option<GroupTree>,
}

impl<C: GroupsController> GroupsManager<C> {
    /// Resume from `persisted`.
    ///
    /// Restored operations that failed verification last time are checked
    /// once more before anything new is planned.
    pub fn new(ctrl: C, policy: GroupPolicy, persisted: PersistedState) -> Result<Self> {
        let mut journal = Journal::new(ctrl, persisted)?;
        journal.verify_imported();
        Ok(Self {
            journal,
            policy,
            desired: None,
        })
    }

    pub fn from_config(ctrl: C, config: &ReconcileConfig, persisted: PersistedState) -> Result<Self> {
        config.validate()?;
        let manager = Self::new(ctrl, config.policy()?, persisted)?;
        Ok(manager.with_retry_policy(config.retry_policy()))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.journal = self.journal.with_retry_policy(retry);
        self
    }

    pub fn policy(&self) -> &GroupPolicy {
        &self.policy
    }

    /// Normalized desired tree including its aggregated branch.
    pub fn desired_tree(&self, desired: &DesiredState) -> Result<GroupTree> {
        let mut tree = normalize(&self.policy, desired)?;
        tree.aggregated = generate_aggregated(&self.policy, &tree)?;
        Ok(tree)
    }

    /// Queue the operations that take the confirmed state to `desired`.
    ///
    /// Queued work the new plan no longer needs is dropped. Invalid input
    /// fails before anything is queued or dropped.
    pub fn update(&mut self, desired: &DesiredState) -> Result<PlanSummary> {
        let tree = self.desired_tree(desired)?;
        let mut plan = diff(self.journal.state(), &tree);
        if self.journal.retire_stale(&plan) > 0 {
            plan = diff(self.journal.state(), &tree);
        }

        let mut summary = PlanSummary::from_plan(&plan);
        summary.queued = self.journal.queue_plan(plan);
        self.journal.record_subgroups(&tree);
        self.desired = Some(tree);

        log::info!(
            "Planned {} additions, {} removals, {} modifications ({} newly queued)",
            summary.additions,
            summary.removals,
            summary.modifications,
            summary.queued
        );
        Ok(summary)
    }

    pub fn execute(&mut self) -> ExecuteSummary {
        let summary = self.journal.execute();
        if let Some(desired) = &self.desired {
            self.journal.record_subgroups(desired);
        }
        summary
    }

    /// Confirmed state plus the unverified backlog, for the next run.
    pub fn export(&self) -> Result<PersistedState> {
        self.journal.export()
    }

    pub fn state(&self) -> &GroupTree {
        self.journal.state()
    }

    pub fn journal(&self) -> &Journal<C> {
        &self.journal
    }

    pub fn controller(&self) -> &C {
        self.journal.controller()
    }

    pub fn controller_mut(&mut self) -> &mut C {
        self.journal.controller_mut()
    }
}
