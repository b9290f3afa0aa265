//! Controller trait for the directory service
//!
//! The reconciliation core never talks to the directory service itself. It
//! drives an implementation of [`GroupsController`], one phase at a time:
//!
//! 1. [`begin`](GroupsController::begin) opens a batch
//! 2. one run action per queued operation adds requests to the batch
//! 3. [`complete`](GroupsController::complete) flushes it and reports
//!    per-request outcomes keyed by the request keys handed out through
//!    [`OperationHandle::next_key`]
//!
//! Verify actions are called after every phase has run and should query the
//! service directly.

use crate::operation::OperationHandle;
use crate::state::OfficeProperties;
use anyhow::Result;
use std::collections::BTreeMap;

/// Outcome of one request in a flushed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Success,
    Failure { message: String },
}

impl ItemOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Per-request outcomes of a batch, keyed by the service's response key.
pub type BatchResults = BTreeMap<String, ItemOutcome>;

/// Create/update/delete/verify actions against the directory service.
///
/// Run actions return `Err` when a request could not even be issued; the
/// journal records that as a batch error on the operation. Verify actions
/// return whether the operation's effect is visible; `Err` counts as not
/// verified.
pub trait GroupsController {
    /// Open a batch for the next phase.
    fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    /// Branches have no representation in the service by default.
    fn insert_branch(&mut self, _op: &mut OperationHandle<'_>, _branch: &str) -> Result<()> {
        Ok(())
    }

    fn delete_branch(&mut self, _op: &mut OperationHandle<'_>, _branch: &str) -> Result<()> {
        Ok(())
    }

    fn insert_member(
        &mut self,
        op: &mut OperationHandle<'_>,
        branch: &str,
        office: &str,
        group_id: &str,
        email: &str,
    ) -> Result<()>;

    fn remove_member(
        &mut self,
        op: &mut OperationHandle<'_>,
        branch: &str,
        office: &str,
        group_id: &str,
        email: &str,
    ) -> Result<()>;

    fn verify_member(
        &mut self,
        branch: &str,
        office: &str,
        group_id: &str,
        email: &str,
    ) -> Result<bool>;

    fn insert_group_alternate_address(
        &mut self,
        op: &mut OperationHandle<'_>,
        branch: &str,
        office: &str,
        group_id: &str,
        address: &str,
    ) -> Result<()>;

    fn remove_group_alternate_address(
        &mut self,
        op: &mut OperationHandle<'_>,
        branch: &str,
        office: &str,
        group_id: &str,
        address: &str,
    ) -> Result<()>;

    fn verify_group_alternate_address(
        &mut self,
        branch: &str,
        office: &str,
        group_id: &str,
        address: &str,
    ) -> Result<bool>;

    fn insert_office(
        &mut self,
        op: &mut OperationHandle<'_>,
        branch: &str,
        office: &str,
        properties: &OfficeProperties,
    ) -> Result<()>;

    /// Apply group settings (name, forwarding mode) to an existing group.
    fn configure_office(
        &mut self,
        op: &mut OperationHandle<'_>,
        branch: &str,
        office: &str,
        properties: &OfficeProperties,
    ) -> Result<()>;

    /// Delete the group. The service is expected to drop its members with it.
    fn delete_office(
        &mut self,
        op: &mut OperationHandle<'_>,
        branch: &str,
        office: &str,
        properties: &OfficeProperties,
    ) -> Result<()>;

    fn verify_office(
        &mut self,
        branch: &str,
        office: &str,
        properties: &OfficeProperties,
    ) -> Result<bool>;

    fn verify_office_configuration(
        &mut self,
        branch: &str,
        office: &str,
        properties: &OfficeProperties,
    ) -> Result<bool>;

    /// Flush the batch opened by [`begin`](Self::begin).
    ///
    /// With `want_results` the returned map should hold one outcome per
    /// request issued in this batch. The journal always asks for results,
    /// since batch failures are routed back to operations by key; `false` is
    /// for callers flushing a batch they do not correlate.
    fn complete(&mut self, want_results: bool) -> Result<BatchResults>;
}
