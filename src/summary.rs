//! Pass summaries for reporting

use crate::operation::OperationKind;
use serde::{Deserialize, Serialize};

/// What a call to `update` planned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    /// Branches, offices, members and addresses to add
    pub additions: usize,
    /// Branches, offices, members and addresses to remove
    pub removals: usize,
    /// Offices whose settings change
    pub modifications: usize,
    /// Planned operations not already in a queue
    pub queued: usize,
}

impl PlanSummary {
    /// Count a plan. `queued` is left for the caller to fill in.
    pub fn from_plan(plan: &[OperationKind]) -> Self {
        let mut summary = Self::default();
        for kind in plan {
            match kind {
                OperationKind::InsertBranch { .. }
                | OperationKind::InsertOffice { .. }
                | OperationKind::InsertMember { .. }
                | OperationKind::InsertGroupAlternateAddress { .. } => summary.additions += 1,
                OperationKind::DeleteBranch { .. }
                | OperationKind::DeleteOffice { .. }
                | OperationKind::RemoveMember { .. }
                | OperationKind::RemoveGroupAlternateAddress { .. } => summary.removals += 1,
                OperationKind::ConfigureOffice { .. } => summary.modifications += 1,
            }
        }
        summary
    }

    /// Total number of planned changes
    pub fn total(&self) -> usize {
        self.additions + self.removals + self.modifications
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Outcome of one `execute` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    /// Operations whose run action was issued
    pub executed: usize,
    /// Operations confirmed, applied to state and retired
    pub verified: usize,
    /// Operations that ran cleanly but could not be confirmed
    pub failed_verification: usize,
    /// Operations with a run or batch failure
    pub batch_errors: usize,
    /// Operations dropped after exhausting their retry budget
    pub abandoned: usize,
    /// Operations still queued after the pass
    pub pending: usize,
}

impl ExecuteSummary {
    /// Check if every executed operation was verified
    pub fn is_success(&self) -> bool {
        self.failed_verification == 0 && self.batch_errors == 0 && self.abandoned == 0
    }
}
