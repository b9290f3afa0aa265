//! Declared desired state and its normalization
//!
//! Offices may be declared in three shapes:
//!
//! ```yaml
//! west:
//!   lists:
//!     herald: herald@sca.org                  # one member
//!     seneschal: [a@sca.org, b@sca.org]       # members only
//!     webminister:                            # members and properties
//!       members: [minister@sca.org]
//!       properties:
//!         group-name: West Kingdom Web Minister
//!   aliases:
//!     exchequer: [treasurer@sca.org]          # forward-only
//!   subgroups: [cynagua]
//! ```
//!
//! Normalization turns all of them into [`Office`] values whose properties
//! carry the identifiers the [`GroupPolicy`] derives.

use crate::error::{Error, Result};
use crate::state::{Branch, GroupTree, Office, OfficeProperties, is_reserved};
use grouppolicy::policy::defaults;
use grouppolicy::{GroupPolicy, Properties};
use serde::Deserialize;
use serde::de::IgnoredAny;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// Declared Input
// ============================================================================

/// Desired state as declared by the user.
///
/// Computed keys left over from an exported state (`_aggregated`,
/// `#queues`) are accepted and ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DesiredState {
    #[serde(flatten)]
    pub branches: BTreeMap<String, RawBranch>,

    #[serde(rename = "_aggregated", default)]
    _aggregated: Option<IgnoredAny>,

    #[serde(rename = "#queues", default)]
    _queues: Option<IgnoredAny>,
}

impl DesiredState {
    pub fn new(branches: BTreeMap<String, RawBranch>) -> Self {
        Self {
            branches,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawBranch {
    /// Archived mailing lists
    pub lists: BTreeMap<String, MembershipData>,
    /// Forward-only groups
    pub aliases: BTreeMap<String, MembershipData>,
    pub subgroups: Vec<String>,
}

/// Membership of one office, in any accepted shape.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MembershipData {
    Single(String),
    Members(Vec<String>),
    Detailed(DetailedMembership),
    /// A map without a `members` key; its values are the members
    Keyed(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetailedMembership {
    pub members: OneOrMany,
    #[serde(default)]
    pub properties: RawProperties,
}

/// A single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl Default for OneOrMany {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

/// Properties as declared, before the policy fills in identifiers.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawProperties {
    #[serde(default)]
    pub alternate_addresses: OneOrMany,

    #[serde(default)]
    pub forward_only: Option<bool>,

    /// `group-email`, `group-id`, `group-name` and anything else
    #[serde(flatten)]
    pub values: BTreeMap<String, Value>,
}

/// Canonical membership shape: a member list plus properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Membership {
    pub members: Vec<String>,
    pub properties: RawProperties,
}

// ============================================================================
// Normalization
// ============================================================================

/// Bring any accepted membership shape into [`Membership`].
pub fn normalize_membership_data(data: MembershipData) -> Membership {
    match data {
        MembershipData::Single(member) => Membership {
            members: vec![member],
            ..Membership::default()
        },
        MembershipData::Members(members) => Membership {
            members,
            ..Membership::default()
        },
        MembershipData::Keyed(members) => Membership {
            members: members.into_values().collect(),
            ..Membership::default()
        },
        MembershipData::Detailed(detailed) => Membership {
            members: detailed.members.into_vec(),
            properties: detailed.properties,
        },
    }
}

/// Normalize every declared branch into a [`GroupTree`].
///
/// The returned tree has no aggregated branch; see
/// [`generate_aggregated`](crate::aggregate::generate_aggregated).
pub fn normalize(policy: &GroupPolicy, desired: &DesiredState) -> Result<GroupTree> {
    let mut tree = GroupTree::default();
    let mut addresses: BTreeMap<String, String> = BTreeMap::new();

    for (name, raw) in &desired.branches {
        if is_reserved(name) {
            return Err(Error::ReservedBranch { name: name.clone() });
        }

        let mut branch = Branch {
            subgroups: raw.subgroups.clone(),
            ..Branch::default()
        };
        let declared = raw
            .lists
            .iter()
            .map(|entry| (entry, false))
            .chain(raw.aliases.iter().map(|entry| (entry, true)));

        for ((office_name, data), alias) in declared {
            if branch.lists.contains_key(office_name) {
                return Err(Error::DuplicateOffice {
                    branch: name.clone(),
                    office: office_name.clone(),
                });
            }

            let office = normalize_office(policy, name, office_name, data.clone(), alias)?;

            let location = format!("{name}/{office_name}");
            if let Some(first) = addresses.insert(office.properties.group_email.clone(), location)
            {
                return Err(Error::DuplicateGroupEmail {
                    email: office.properties.group_email,
                    first,
                    second: format!("{name}/{office_name}"),
                });
            }

            branch.lists.insert(office_name.clone(), office);
        }

        log::debug!("Normalized branch {name} with {} offices", branch.lists.len());
        tree.branches.insert(name.clone(), branch);
    }

    Ok(tree)
}

fn normalize_office(
    policy: &GroupPolicy,
    branch: &str,
    office: &str,
    data: MembershipData,
    alias: bool,
) -> Result<Office> {
    let Membership {
        members,
        properties,
    } = normalize_membership_data(data);

    let declared_alternates = properties.alternate_addresses.into_vec();
    let values = scalar_properties(branch, office, properties.values)?;
    let resolved = policy.resolve_office(branch, office, &values, &declared_alternates)?;

    let mut extra = values;
    for key in [
        defaults::GROUP_EMAIL,
        defaults::GROUP_ID,
        defaults::GROUP_NAME,
    ] {
        extra.remove(key);
    }

    let members: BTreeSet<String> = members
        .iter()
        .map(|member| member.trim())
        .filter(|member| !member.is_empty())
        .map(|member| policy.normalize_email(member))
        .collect();

    Ok(Office {
        members,
        properties: OfficeProperties {
            group_email: resolved.group_email,
            group_id: resolved.group_id,
            group_name: resolved.group_name,
            alternate_addresses: resolved.alternate_addresses,
            forward_only: properties.forward_only.unwrap_or(alias),
            extra,
        },
    })
}

/// Render declared property values as strings.
///
/// Numbers and booleans keep their literal form; a null value is dropped.
fn scalar_properties(
    branch: &str,
    office: &str,
    values: BTreeMap<String, Value>,
) -> Result<Properties> {
    let mut properties = Properties::new();
    for (name, value) in values {
        let rendered = match value {
            Value::Null => continue,
            Value::String(value) => value,
            Value::Bool(value) => value.to_string(),
            Value::Number(value) => value.to_string(),
            Value::Array(_) | Value::Object(_) => {
                return Err(Error::InvalidProperty {
                    branch: branch.to_string(),
                    office: office.to_string(),
                    property: name,
                });
            }
        };
        properties.insert(name, rendered);
    }
    Ok(properties)
}
