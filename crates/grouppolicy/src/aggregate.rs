//! Aggregate group definitions and branch parentage
//!
//! Every office also belongs to a handful of synthesized groups: one for
//! all holders of that office everywhere, one for all officers of its
//! branch, and one per ancestor branch for holders of that office within
//! the ancestor's subtree. This module only names those groups; collecting
//! their members is the caller's job.

use crate::error::{Result, require_address};
use crate::policy::{GroupPolicy, defaults};
use crate::template::Properties;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A synthesized group an office's primary address should be a member of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AggregateGroup {
    /// Office key inside the aggregated branch (local part of the address)
    pub key: String,
    pub group_email: String,
    pub group_name: String,
    pub alternate_addresses: BTreeSet<String>,
}

impl GroupPolicy {
    /// Aggregates that `office` in `branch` maps into.
    ///
    /// `parentage` is the branch's ancestor list as produced by
    /// [`GroupPolicy::generate_parentage`]. `properties` are the office's
    /// own properties and are visible to the aggregate templates.
    pub fn aggregated_groups(
        &self,
        branch: &str,
        office: &str,
        properties: &Properties,
        parentage: &[String],
    ) -> Result<Vec<AggregateGroup>> {
        let mut groups = Vec::new();

        groups.push(self.aggregate(
            &self.scoped_context(branch, office, properties),
            defaults::ALL_GROUP_EMAIL,
            defaults::ALL_GROUP_NAME,
            None,
        )?);

        let officers_alternate = if self.is_top_level(branch) {
            Some(defaults::OFFICERS_TOP_LEVEL_ALTERNATE)
        } else if self.is_subdomain(branch) {
            Some(defaults::OFFICERS_SUBDOMAIN_ALTERNATE)
        } else {
            None
        };
        groups.push(self.aggregate(
            &self.scoped_context(branch, office, properties),
            defaults::OFFICERS_GROUP_EMAIL,
            defaults::OFFICERS_GROUP_NAME,
            officers_alternate,
        )?);

        if !self.is_top_level(branch) {
            let scopes = parentage
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(branch));
            for ancestor in scopes {
                let alternate = self
                    .is_subdomain(ancestor)
                    .then_some(defaults::SCOPED_ALL_SUBDOMAIN_ALTERNATE);
                groups.push(self.aggregate(
                    &self.scoped_context(ancestor, office, properties),
                    defaults::SCOPED_ALL_GROUP_EMAIL,
                    defaults::SCOPED_ALL_GROUP_NAME,
                    alternate,
                )?);
            }
        }

        Ok(groups)
    }

    /// Ancestor lists for every branch named in `subgroups`.
    ///
    /// A child's parentage is its parent followed by the parent's own
    /// parentage, nearest first. The top-level group is never listed as an
    /// ancestor, so its direct children have empty parentage. Cyclic input is
    /// not supported; the walk stops at the first repeated branch.
    pub fn generate_parentage(
        &self,
        subgroups: &BTreeMap<String, Vec<String>>,
    ) -> BTreeMap<String, Vec<String>> {
        let mut parent_of: BTreeMap<&str, &str> = BTreeMap::new();
        for (parent, children) in subgroups {
            for child in children {
                parent_of.entry(child.as_str()).or_insert(parent.as_str());
            }
        }

        let branches = subgroups
            .keys()
            .map(String::as_str)
            .chain(parent_of.keys().copied())
            .collect::<BTreeSet<_>>();

        branches
            .into_iter()
            .map(|branch| {
                let mut lineage = Vec::new();
                let mut seen = BTreeSet::from([branch]);
                let mut current = branch;
                while let Some(&parent) = parent_of.get(current) {
                    if !seen.insert(parent) {
                        break;
                    }
                    if !self.is_top_level(parent) {
                        lineage.push(parent.to_string());
                    }
                    current = parent;
                }
                (branch.to_string(), lineage)
            })
            .collect()
    }

    fn scoped_context(&self, branch: &str, office: &str, properties: &Properties) -> Properties {
        let mut context = properties.clone();
        context.extend(self.context(branch, office));
        context
    }

    fn aggregate(
        &self,
        context: &Properties,
        email_template: &str,
        name_template: &str,
        alternate_template: Option<&str>,
    ) -> Result<AggregateGroup> {
        let group_email = self
            .property(email_template, context)
            .unwrap_or_default()
            .to_lowercase();
        require_address(email_template, &group_email)?;

        let group_name = self.property(name_template, context).unwrap_or_default();

        let alternate_addresses = alternate_template
            .and_then(|template| self.property(template, context))
            .map(|address| address.to_lowercase())
            .filter(|address| require_address("alternate-address", address).is_ok())
            .filter(|address| *address != group_email)
            .into_iter()
            .collect();

        let key = group_email
            .split_once('@')
            .map(|(local, _)| local.to_string())
            .unwrap_or_default();

        Ok(AggregateGroup {
            key,
            group_email,
            group_name,
            alternate_addresses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> GroupPolicy {
        let overrides = Properties::from([
            ("top-level-group".to_string(), "north".to_string()),
            (
                "subdomains".to_string(),
                "fogs,geese,wolves,lightwoods".to_string(),
            ),
        ]);
        GroupPolicy::new("testdomain.org", overrides).unwrap()
    }

    fn keys(groups: &[AggregateGroup]) -> Vec<&str> {
        groups.iter().map(|g| g.key.as_str()).collect()
    }

    fn tree() -> BTreeMap<String, Vec<String>> {
        [
            ("north", vec!["fogs", "geese", "wolves"]),
            ("fogs", vec!["lightwoods"]),
            ("geese", vec!["gustyplains"]),
            ("wolves", vec!["coldholm"]),
            ("lightwoods", vec!["seamountain"]),
            ("gustyplains", vec![]),
            ("coldholm", vec![]),
            ("seamountain", vec![]),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.into_iter().map(String::from).collect()))
        .collect()
    }

    #[test]
    fn test_parentage() {
        let parentage = policy().generate_parentage(&tree());

        assert!(parentage["north"].is_empty());
        assert!(parentage["fogs"].is_empty());
        assert!(parentage["geese"].is_empty());
        assert_eq!(parentage["lightwoods"], vec!["fogs"]);
        assert_eq!(parentage["gustyplains"], vec!["geese"]);
        assert_eq!(parentage["coldholm"], vec!["wolves"]);
        assert_eq!(parentage["seamountain"], vec!["lightwoods", "fogs"]);
    }

    #[test]
    fn test_parentage_tolerates_cycles() {
        let cyclic = BTreeMap::from([
            ("a".to_string(), vec!["b".to_string()]),
            ("b".to_string(), vec!["a".to_string()]),
        ]);
        let parentage = policy().generate_parentage(&cyclic);
        assert_eq!(parentage["a"], vec!["b"]);
        assert_eq!(parentage["b"], vec!["a"]);
    }

    #[test]
    fn test_top_level_aggregates() {
        let groups = policy()
            .aggregated_groups("north", "president", &Properties::new(), &[])
            .unwrap();

        assert_eq!(keys(&groups), vec!["all-presidents", "north-officers"]);
        assert_eq!(groups[0].group_email, "all-presidents@testdomain.org");
        assert_eq!(groups[0].group_name, "All Presidents");
        assert!(groups[0].alternate_addresses.is_empty());
        assert_eq!(groups[1].group_name, "North Officers");
        assert_eq!(
            groups[1].alternate_addresses,
            BTreeSet::from(["officers@testdomain.org".to_string()])
        );
    }

    #[test]
    fn test_descendant_aggregates_cover_every_ancestor() {
        let policy = policy();
        let parentage = policy.generate_parentage(&tree());
        let groups = policy
            .aggregated_groups(
                "seamountain",
                "president",
                &Properties::new(),
                &parentage["seamountain"],
            )
            .unwrap();

        assert_eq!(
            keys(&groups),
            vec![
                "all-presidents",
                "seamountain-officers",
                "lightwoods-all-presidents",
                "fogs-all-presidents",
                "seamountain-all-presidents",
            ]
        );

        // seamountain is not a subdomain; its ancestors are
        assert!(groups[1].alternate_addresses.is_empty());
        assert_eq!(
            groups[3].alternate_addresses,
            BTreeSet::from(["all-presidents@fogs.testdomain.org".to_string()])
        );
        assert_eq!(groups[3].group_name, "Fogs All Presidents");
        assert!(groups[4].alternate_addresses.is_empty());
    }

    #[test]
    fn test_subdomain_officers_alternate() {
        let groups = policy()
            .aggregated_groups("fogs", "seneschal", &Properties::new(), &[])
            .unwrap();
        assert_eq!(
            groups[1].alternate_addresses,
            BTreeSet::from(["officers@fogs.testdomain.org".to_string()])
        );
    }

    #[test]
    fn test_aggregate_names_use_raw_office_plural() {
        let groups = policy()
            .aggregated_groups("west", "rapier-marshal", &Properties::new(), &[])
            .unwrap();
        assert_eq!(groups[0].key, "all-rapiermarshals");
        assert_eq!(groups[0].group_name, "All Rapier-marshals");
    }
}
