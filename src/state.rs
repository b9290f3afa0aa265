//! Group tree and persisted state
//!
//! The tree is branch → office → members/properties. The computed
//! `_aggregated` branch and the `#queues` retry backlog are reserved keys
//! in the serialized layout; in memory they are ordinary struct fields.

use crate::operation::OperationRecord;
use crate::operation::Phase;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Key of the computed branch holding aggregate groups.
pub const AGGREGATED_BRANCH: &str = "_aggregated";

/// Key of the persisted retry backlog.
pub const QUEUES_KEY: &str = "#queues";

/// Whether `name` is reserved for computed or bookkeeping data.
pub fn is_reserved(name: &str) -> bool {
    name.starts_with('_') || name.starts_with('#')
}

// ============================================================================
// Tree Structures
// ============================================================================

/// Resolved properties of an office.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OfficeProperties {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group_email: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group_name: String,

    /// Secondary addresses routed to this office
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub alternate_addresses: BTreeSet<String>,

    /// Alias offices forward mail without keeping an archive
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub forward_only: bool,

    /// Any other user-declared properties (visible to policy templates)
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl OfficeProperties {
    /// A copy without alternate addresses.
    ///
    /// Office-level operations carry these; addresses are managed by their
    /// own operations.
    pub fn without_addresses(&self) -> Self {
        Self {
            alternate_addresses: BTreeSet::new(),
            ..self.clone()
        }
    }
}

/// A named group within a branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Office {
    #[serde(default)]
    pub members: BTreeSet<String>,

    #[serde(default)]
    pub properties: OfficeProperties,
}

/// A named subtree of offices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    #[serde(default)]
    pub lists: BTreeMap<String, Office>,

    /// Child branch names, used to compute parentage
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subgroups: Vec<String>,
}

/// Declared branches plus the computed aggregate branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupTree {
    #[serde(flatten)]
    pub branches: BTreeMap<String, Branch>,

    #[serde(
        rename = "_aggregated",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub aggregated: Option<Branch>,
}

/// Queued operations by phase, in their persisted form.
pub type QueueSnapshot = BTreeMap<Phase, Vec<OperationRecord>>;

/// Everything carried from one reconciliation run to the next.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(flatten)]
    pub tree: GroupTree,

    #[serde(rename = "#queues", default, skip_serializing_if = "queues_empty")]
    pub queues: QueueSnapshot,
}

fn queues_empty(queues: &QueueSnapshot) -> bool {
    queues.values().all(Vec::is_empty)
}

// ============================================================================
// GroupTree Implementation
// ============================================================================

impl GroupTree {
    /// Look up a branch, including the aggregated one.
    pub fn branch(&self, name: &str) -> Option<&Branch> {
        if name == AGGREGATED_BRANCH {
            self.aggregated.as_ref()
        } else {
            self.branches.get(name)
        }
    }

    /// Get or create a branch.
    pub fn branch_mut(&mut self, name: &str) -> &mut Branch {
        if name == AGGREGATED_BRANCH {
            self.aggregated.get_or_insert_with(Branch::default)
        } else {
            self.branches.entry(name.to_string()).or_default()
        }
    }

    /// Remove a branch and everything in it.
    pub fn remove_branch(&mut self, name: &str) -> Option<Branch> {
        if name == AGGREGATED_BRANCH {
            self.aggregated.take()
        } else {
            self.branches.remove(name)
        }
    }

    /// Every branch, declared ones first, the aggregated branch last.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Branch)> {
        self.branches
            .iter()
            .map(|(name, branch)| (name.as_str(), branch))
            .chain(
                self.aggregated
                    .as_ref()
                    .map(|branch| (AGGREGATED_BRANCH, branch)),
            )
    }

    /// Look up an office.
    pub fn office(&self, branch: &str, office: &str) -> Option<&Office> {
        self.branch(branch)?.lists.get(office)
    }

    /// Get or create an office (and its branch).
    pub fn office_mut(&mut self, branch: &str, office: &str) -> &mut Office {
        self.branch_mut(branch)
            .lists
            .entry(office.to_string())
            .or_default()
    }

    /// Mutable access to an office only if it already exists.
    pub fn existing_office_mut(&mut self, branch: &str, office: &str) -> Option<&mut Office> {
        let branch = if branch == AGGREGATED_BRANCH {
            self.aggregated.as_mut()?
        } else {
            self.branches.get_mut(branch)?
        };
        branch.lists.get_mut(office)
    }

    /// Remove an office, leaving its branch in place.
    pub fn remove_office(&mut self, branch: &str, office: &str) -> Option<Office> {
        let branch = if branch == AGGREGATED_BRANCH {
            self.aggregated.as_mut()?
        } else {
            self.branches.get_mut(branch)?
        };
        branch.lists.remove(office)
    }

    /// Subgroup lists of every declared branch, for parentage generation.
    pub fn subgroups(&self) -> BTreeMap<String, Vec<String>> {
        self.branches
            .iter()
            .map(|(name, branch)| (name.clone(), branch.subgroups.clone()))
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
