//! Phased operation journal
//!
//! The journal owns the authoritative group tree and four ordered queues of
//! operations. A pass runs each phase as one controller batch, routes
//! per-request failures back to their operations by nonce, then verifies
//! every executed operation. Verified operations update the tree and leave
//! their queue; everything else stays queued for the next pass, and survives
//! [`export`](Journal::export) so a later run can pick it up.

use crate::controller::{BatchResults, GroupsController, ItemOutcome};
use crate::error::Result;
use crate::operation::{Nonce, Operation, OperationHandle, OperationKind, Phase};
use crate::state::{GroupTree, PersistedState, QueueSnapshot};
use crate::summary::ExecuteSummary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How often an unverified operation is retried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPolicy {
    /// Passes an operation may fail before it is dropped; `None` retries forever
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Never drop an unverified operation.
    pub fn unlimited() -> Self {
        Self { max_attempts: None }
    }

    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
        }
    }

    fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

/// Operation queues plus the state they converge.
#[derive(Debug)]
pub struct Journal<C> {
    ctrl: C,
    state: GroupTree,
    queues: BTreeMap<Phase, Vec<Operation>>,
    retry: RetryPolicy,
    nonces: u64,
}

impl<C: GroupsController> Journal<C> {
    /// Resume from persisted state, re-queueing its backlog.
    ///
    /// Fails if a queued record names an unknown run-function or carries
    /// the wrong parameters.
    pub fn new(ctrl: C, persisted: PersistedState) -> Result<Self> {
        let PersistedState { tree, queues } = persisted;
        let mut journal = Self {
            ctrl,
            state: tree,
            queues: BTreeMap::new(),
            retry: RetryPolicy::default(),
            nonces: 0,
        };

        for (phase, records) in queues {
            for record in records {
                let nonce = journal.next_nonce();
                let op = Operation::from_record(nonce, record)?;
                if op.kind().phase() != phase {
                    log::debug!(
                        "Moving {} from {} to {} queue",
                        op.kind(),
                        phase,
                        op.kind().phase()
                    );
                }
                journal.push(op);
            }
        }

        let restored = journal.pending().count();
        if restored > 0 {
            log::info!("Restored {restored} queued operations");
        }
        Ok(journal)
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    fn next_nonce(&mut self) -> Nonce {
        self.nonces += 1;
        Nonce::from_counter(self.nonces)
    }

    fn push(&mut self, op: Operation) -> bool {
        let queue = self.queues.entry(op.kind().phase()).or_default();
        if queue.iter().any(|queued| queued.same_work(op.kind())) {
            log::debug!("Skipping duplicate {}", op.kind());
            return false;
        }
        log::debug!("Queued {} as {}", op.kind(), op.nonce());
        queue.push(op);
        true
    }

    /// Queue an operation in its phase.
    ///
    /// Returns `false` if the same work is already queued there.
    pub fn queue(&mut self, kind: OperationKind) -> bool {
        let nonce = self.next_nonce();
        self.push(Operation::new(nonce, kind))
    }

    /// Queue every operation of a plan, in order.
    ///
    /// Returns how many were not already queued.
    pub fn queue_plan(&mut self, plan: impl IntoIterator<Item = OperationKind>) -> usize {
        plan.into_iter()
            .map(|kind| self.queue(kind))
            .filter(|queued| *queued)
            .count()
    }

    /// Run every queued operation, then verify what ran.
    pub fn execute(&mut self) -> ExecuteSummary {
        let mut summary = ExecuteSummary::default();

        for op in self.queues.values_mut().flatten() {
            op.reset();
        }

        for phase in Phase::ALL {
            let Some(ops) = self.queues.get_mut(&phase) else {
                continue;
            };
            if ops.is_empty() {
                continue;
            }

            log::debug!("Beginning {phase} phase with {} operations", ops.len());
            if let Err(e) = self.ctrl.begin() {
                log::warn!("Could not begin {phase} phase: {e:#}");
                continue;
            }

            for op in ops.iter_mut() {
                let (kind, mut handle) = op.split();
                let outcome = run(&mut self.ctrl, kind, &mut handle);
                op.executed = true;
                if let Err(e) = outcome {
                    log::warn!("{} failed: {e:#}", op.kind());
                    op.batch_errors.push(format!("{e:#}"));
                }
            }
            summary.executed += ops.len();

            match self.ctrl.complete(true) {
                Ok(results) => correlate(ops, &results),
                Err(e) => {
                    log::warn!("Could not complete {phase} phase: {e:#}");
                    for op in ops.iter_mut() {
                        op.batch_errors.push(format!("batch failed: {e:#}"));
                    }
                }
            }
            log::debug!("Completed {phase} phase");
        }

        for phase in Phase::ALL {
            let Some(ops) = self.queues.get_mut(&phase) else {
                continue;
            };

            let mut remaining = Vec::with_capacity(ops.len());
            for mut op in std::mem::take(ops) {
                if !op.executed {
                    remaining.push(op);
                    continue;
                }

                let confirmed = if op.batch_errors.is_empty() {
                    let confirmed = confirm(&mut self.ctrl, op.kind());
                    if !confirmed {
                        summary.failed_verification += 1;
                    }
                    confirmed
                } else {
                    summary.batch_errors += 1;
                    false
                };

                if confirmed {
                    log::debug!("Verified {}", op.kind());
                    apply_verified(&mut self.state, op.kind());
                    summary.verified += 1;
                    continue;
                }

                op.status.failed_verification = true;
                op.status.attempts += 1;
                if self.retry.is_exhausted(op.status.attempts) {
                    log::warn!(
                        "Abandoning {} after {} attempts",
                        op.kind(),
                        op.status.attempts
                    );
                    summary.abandoned += 1;
                } else {
                    remaining.push(op);
                }
            }
            *ops = remaining;
        }

        summary.pending = self.pending().count();
        log::info!(
            "Executed {} operations: {} verified, {} unverified, {} with batch errors, {} pending",
            summary.executed,
            summary.verified,
            summary.failed_verification,
            summary.batch_errors,
            summary.pending
        );
        summary
    }

    /// Check restored operations that already ran in an earlier pass.
    ///
    /// Operations marked `failedVerification` that have a verify action are
    /// verified without running them again; the ones that pass are applied
    /// and retired. Returns how many were retired.
    pub fn verify_imported(&mut self) -> usize {
        let mut retired = 0;
        for ops in self.queues.values_mut() {
            ops.retain(|op| {
                if !op.status.failed_verification || op.kind().verify_function().is_none() {
                    return true;
                }
                if confirm(&mut self.ctrl, op.kind()) {
                    log::debug!("Verified restored {}", op.kind());
                    apply_verified(&mut self.state, op.kind());
                    retired += 1;
                    false
                } else {
                    true
                }
            });
        }
        if retired > 0 {
            log::info!("Retired {retired} restored operations that had already taken effect");
        }
        retired
    }

    /// Drop queued operations that `plan` no longer contains.
    ///
    /// A dropped operation that already ran is verified once first; if its
    /// effect is visible it is applied to the state, so the next diff plans
    /// its reversal. Returns how many were applied.
    pub fn retire_stale(&mut self, plan: &[OperationKind]) -> usize {
        let mut applied = 0;
        let mut dropped = 0;
        for ops in self.queues.values_mut() {
            ops.retain(|op| {
                if plan.iter().any(|kind| op.same_work(kind)) {
                    return true;
                }
                if op.status.failed_verification
                    && op.kind().verify_function().is_some()
                    && confirm(&mut self.ctrl, op.kind())
                {
                    log::debug!("Applying stale {} that had taken effect", op.kind());
                    apply_verified(&mut self.state, op.kind());
                    applied += 1;
                } else {
                    log::debug!("Dropping stale {}", op.kind());
                }
                dropped += 1;
                false
            });
        }
        if dropped > 0 {
            log::info!("Dropped {dropped} queued operations no longer wanted");
        }
        applied
    }

    /// Copy the declared hierarchy onto branches that already exist.
    ///
    /// Subgroups have no counterpart in the directory service and are never
    /// changed by operations.
    pub fn record_subgroups(&mut self, desired: &GroupTree) {
        for (name, branch) in &mut self.state.branches {
            if let Some(wanted) = desired.branches.get(name) {
                branch.subgroups.clone_from(&wanted.subgroups);
            }
        }
    }

    /// The tree as confirmed so far.
    pub fn state(&self) -> &GroupTree {
        &self.state
    }

    /// Every queued operation, in phase order.
    pub fn pending(&self) -> impl Iterator<Item = &Operation> {
        self.queues.values().flatten()
    }

    /// Operations queued in one phase.
    pub fn queued(&self, phase: Phase) -> &[Operation] {
        self.queues.get(&phase).map(Vec::as_slice).unwrap_or_default()
    }

    /// State and backlog in their persisted form.
    pub fn export(&self) -> Result<PersistedState> {
        let mut queues = QueueSnapshot::new();
        for (phase, ops) in &self.queues {
            if ops.is_empty() {
                continue;
            }
            let records = ops
                .iter()
                .map(Operation::to_record)
                .collect::<Result<Vec<_>>>()?;
            queues.insert(*phase, records);
        }
        Ok(PersistedState {
            tree: self.state.clone(),
            queues,
        })
    }

    pub fn controller(&self) -> &C {
        &self.ctrl
    }

    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.ctrl
    }
}

/// Route failed batch items back to their operations.
fn correlate(ops: &mut [Operation], results: &BatchResults) {
    for (key, outcome) in results {
        let ItemOutcome::Failure { message } = outcome else {
            continue;
        };
        let target = Nonce::from_result_key(key)
            .and_then(|nonce| ops.iter_mut().find(|op| op.nonce().as_str() == nonce));
        match target {
            Some(op) => {
                log::warn!("{} failed: {message}", op.kind());
                op.batch_errors.push(message.clone());
            }
            None => log::warn!("Could not correlate batch failure '{key}': {message}"),
        }
    }
}

fn run<C: GroupsController + ?Sized>(
    ctrl: &mut C,
    kind: &OperationKind,
    op: &mut OperationHandle<'_>,
) -> anyhow::Result<()> {
    match kind {
        OperationKind::InsertBranch { branch } => ctrl.insert_branch(op, branch),
        OperationKind::DeleteBranch { branch } => ctrl.delete_branch(op, branch),
        OperationKind::InsertOffice {
            branch,
            office,
            properties,
        } => ctrl.insert_office(op, branch, office, properties),
        OperationKind::ConfigureOffice {
            branch,
            office,
            properties,
        } => ctrl.configure_office(op, branch, office, properties),
        OperationKind::DeleteOffice {
            branch,
            office,
            properties,
        } => ctrl.delete_office(op, branch, office, properties),
        OperationKind::InsertMember {
            branch,
            office,
            group_id,
            email,
        } => ctrl.insert_member(op, branch, office, group_id, email),
        OperationKind::RemoveMember {
            branch,
            office,
            group_id,
            email,
        } => ctrl.remove_member(op, branch, office, group_id, email),
        OperationKind::InsertGroupAlternateAddress {
            branch,
            office,
            group_id,
            address,
        } => ctrl.insert_group_alternate_address(op, branch, office, group_id, address),
        OperationKind::RemoveGroupAlternateAddress {
            branch,
            office,
            group_id,
            address,
        } => ctrl.remove_group_alternate_address(op, branch, office, group_id, address),
    }
}

/// Run the verify action, if the kind has one.
fn verify<C: GroupsController + ?Sized>(
    ctrl: &mut C,
    kind: &OperationKind,
) -> Option<anyhow::Result<bool>> {
    let verified = match kind {
        OperationKind::InsertOffice {
            branch,
            office,
            properties,
        } => ctrl.verify_office(branch, office, properties),
        OperationKind::ConfigureOffice {
            branch,
            office,
            properties,
        } => ctrl.verify_office_configuration(branch, office, properties),
        OperationKind::InsertMember {
            branch,
            office,
            group_id,
            email,
        } => ctrl.verify_member(branch, office, group_id, email),
        OperationKind::InsertGroupAlternateAddress {
            branch,
            office,
            group_id,
            address,
        } => ctrl.verify_group_alternate_address(branch, office, group_id, address),
        _ => return None,
    };
    Some(verified)
}

/// Whether an executed operation's effect is confirmed.
fn confirm<C: GroupsController + ?Sized>(ctrl: &mut C, kind: &OperationKind) -> bool {
    match verify(ctrl, kind) {
        None => true,
        Some(Ok(verified)) => verified,
        Some(Err(e)) => {
            log::warn!("Could not verify {kind}: {e:#}");
            false
        }
    }
}

/// Update the slice of state a verified operation affected.
fn apply_verified(state: &mut GroupTree, kind: &OperationKind) {
    match kind {
        OperationKind::InsertBranch { branch } => {
            state.branch_mut(branch);
        }
        OperationKind::DeleteBranch { branch } => {
            state.remove_branch(branch);
        }
        OperationKind::InsertOffice {
            branch,
            office,
            properties,
        }
        | OperationKind::ConfigureOffice {
            branch,
            office,
            properties,
        } => {
            let stored = &mut state.office_mut(branch, office).properties;
            let addresses = std::mem::take(&mut stored.alternate_addresses);
            *stored = properties.without_addresses();
            stored.alternate_addresses = addresses;
        }
        OperationKind::DeleteOffice { branch, office, .. } => {
            state.remove_office(branch, office);
        }
        OperationKind::InsertMember {
            branch,
            office,
            email,
            ..
        } => {
            state.office_mut(branch, office).members.insert(email.clone());
        }
        OperationKind::RemoveMember {
            branch,
            office,
            email,
            ..
        } => {
            if let Some(office) = state.existing_office_mut(branch, office) {
                office.members.remove(email);
            }
        }
        OperationKind::InsertGroupAlternateAddress {
            branch,
            office,
            address,
            ..
        } => {
            state
                .office_mut(branch, office)
                .properties
                .alternate_addresses
                .insert(address.clone());
        }
        OperationKind::RemoveGroupAlternateAddress {
            branch,
            office,
            address,
            ..
        } => {
            if let Some(office) = state.existing_office_mut(branch, office) {
                office.properties.alternate_addresses.remove(address);
            }
        }
    }
}
