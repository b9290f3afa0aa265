//! Desired-vs-existing diff
//!
//! The diff is a pure function of two trees. It plans operations; it never
//! runs them. Members and alternate addresses are compared as sets, and an
//! office that disappears is deleted outright rather than emptied first.

use crate::operation::OperationKind;
use crate::state::{Branch, GroupTree, Office};

/// Operations that take `existing` to `desired`, in emission order.
///
/// Within a branch, office-level changes come before member and address
/// changes. Branches missing from `desired` are torn down last.
pub fn diff(existing: &GroupTree, desired: &GroupTree) -> Vec<OperationKind> {
    let mut plan = Vec::new();

    for (name, branch) in desired.iter() {
        match existing.branch(name) {
            Some(current) => diff_branch(&mut plan, name, current, branch),
            None => {
                plan.push(OperationKind::InsertBranch {
                    branch: name.to_string(),
                });
                diff_branch(&mut plan, name, &Branch::default(), branch);
            }
        }
    }

    for (name, branch) in existing.iter() {
        if desired.branch(name).is_some() {
            continue;
        }
        for (office, current) in &branch.lists {
            plan.push(OperationKind::DeleteOffice {
                branch: name.to_string(),
                office: office.clone(),
                properties: current.properties.without_addresses(),
            });
        }
        plan.push(OperationKind::DeleteBranch {
            branch: name.to_string(),
        });
    }

    plan
}

fn diff_branch(plan: &mut Vec<OperationKind>, branch: &str, existing: &Branch, desired: &Branch) {
    let mut changes = Vec::new();
    let absent = Office::default();

    for (office, wanted) in &desired.lists {
        let properties = wanted.properties.without_addresses();
        let current = match existing.lists.get(office) {
            Some(current) => {
                if current.properties.without_addresses() != properties {
                    plan.push(OperationKind::ConfigureOffice {
                        branch: branch.to_string(),
                        office: office.clone(),
                        properties,
                    });
                }
                current
            }
            None => {
                plan.push(OperationKind::InsertOffice {
                    branch: branch.to_string(),
                    office: office.clone(),
                    properties: properties.clone(),
                });
                plan.push(OperationKind::ConfigureOffice {
                    branch: branch.to_string(),
                    office: office.clone(),
                    properties,
                });
                &absent
            }
        };
        diff_office(&mut changes, branch, office, current, wanted);
    }

    for (office, current) in &existing.lists {
        if !desired.lists.contains_key(office) {
            plan.push(OperationKind::DeleteOffice {
                branch: branch.to_string(),
                office: office.clone(),
                properties: current.properties.without_addresses(),
            });
        }
    }

    plan.append(&mut changes);
}

fn diff_office(
    changes: &mut Vec<OperationKind>,
    branch: &str,
    office: &str,
    existing: &Office,
    desired: &Office,
) {
    let group_id = &desired.properties.group_id;

    for email in desired.members.difference(&existing.members) {
        changes.push(OperationKind::InsertMember {
            branch: branch.to_string(),
            office: office.to_string(),
            group_id: group_id.clone(),
            email: email.clone(),
        });
    }
    for email in existing.members.difference(&desired.members) {
        changes.push(OperationKind::RemoveMember {
            branch: branch.to_string(),
            office: office.to_string(),
            group_id: group_id.clone(),
            email: email.clone(),
        });
    }

    let wanted = &desired.properties.alternate_addresses;
    let current = &existing.properties.alternate_addresses;
    for address in wanted.difference(current) {
        changes.push(OperationKind::InsertGroupAlternateAddress {
            branch: branch.to_string(),
            office: office.to_string(),
            group_id: group_id.clone(),
            address: address.clone(),
        });
    }
    for address in current.difference(wanted) {
        changes.push(OperationKind::RemoveGroupAlternateAddress {
            branch: branch.to_string(),
            office: office.to_string(),
            group_id: group_id.clone(),
            address: address.clone(),
        });
    }
}
