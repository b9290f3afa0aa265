//! The computed `_aggregated` branch

use crate::error::{Error, Result};
use crate::state::{AGGREGATED_BRANCH, Branch, GroupTree, Office, OfficeProperties};
use grouppolicy::GroupPolicy;
use std::collections::BTreeMap;

/// Build the aggregated branch for a normalized tree.
///
/// Every office's primary address becomes a member of each aggregate the
/// policy maps it into. Aggregates that end up with fewer than two members
/// are dropped, and `None` is returned if nothing is left.
///
/// Fails if a kept aggregate would answer at an address a declared office
/// already uses.
pub fn generate_aggregated(policy: &GroupPolicy, tree: &GroupTree) -> Result<Option<Branch>> {
    let parentage = policy.generate_parentage(&tree.subgroups());
    let mut lists: BTreeMap<String, Office> = BTreeMap::new();

    for (branch_name, branch) in &tree.branches {
        let lineage = parentage
            .get(branch_name)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for (office_name, office) in &branch.lists {
            let groups = policy.aggregated_groups(
                branch_name,
                office_name,
                &office.properties.extra,
                lineage,
            )?;
            for group in groups {
                let aggregate = lists.entry(group.key).or_insert_with(|| Office {
                    members: Default::default(),
                    properties: OfficeProperties {
                        group_id: group.group_email.clone(),
                        group_email: group.group_email,
                        group_name: group.group_name,
                        alternate_addresses: group.alternate_addresses,
                        ..OfficeProperties::default()
                    },
                });
                aggregate
                    .members
                    .insert(office.properties.group_email.clone());
            }
        }
    }

    let before = lists.len();
    lists.retain(|_, office| office.members.len() > 1);
    log::debug!(
        "Generated {} aggregate groups ({} too small to keep)",
        lists.len(),
        before - lists.len()
    );

    if lists.is_empty() {
        return Ok(None);
    }
    check_collisions(tree, &lists)?;
    Ok(Some(Branch {
        lists,
        subgroups: Vec::new(),
    }))
}

fn check_collisions(tree: &GroupTree, aggregates: &BTreeMap<String, Office>) -> Result<()> {
    let mut claimed: BTreeMap<&str, String> = BTreeMap::new();
    for (branch_name, branch) in &tree.branches {
        for (office_name, office) in &branch.lists {
            let properties = &office.properties;
            for address in
                std::iter::once(&properties.group_email).chain(&properties.alternate_addresses)
            {
                claimed
                    .entry(address.as_str())
                    .or_insert_with(|| format!("{branch_name}/{office_name}"));
            }
        }
    }

    for (key, aggregate) in aggregates {
        let properties = &aggregate.properties;
        for address in
            std::iter::once(&properties.group_email).chain(&properties.alternate_addresses)
        {
            if let Some(first) = claimed.get(address.as_str()) {
                return Err(Error::DuplicateGroupEmail {
                    email: address.clone(),
                    first: first.clone(),
                    second: format!("{AGGREGATED_BRANCH}/{key}"),
                });
            }
        }
    }
    Ok(())
}
