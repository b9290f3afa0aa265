//! The standard group policy
//!
//! Derives canonical identifiers for an office from its branch and office
//! names, classifies branches as top-level or subdomain, and generates the
//! alternate addresses an office should answer to. All derived values come
//! from overridable templates (see [`defaults`]).

use crate::error::{Error, Result, require_address};
use crate::template::{self, Properties};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Built-in template defaults.
///
/// Any of these may be replaced by passing an override with the same key
/// to [`GroupPolicy::new`].
pub mod defaults {
    /// Base domain for every generated address
    pub const DOMAIN: &str = "domain";
    /// Branch that owns the bare `office@domain` addresses
    pub const TOP_LEVEL_GROUP: &str = "top-level-group";
    /// Which branches get `office@branch.domain` addresses
    pub const SUBDOMAINS: &str = "subdomains";

    pub const GROUP_EMAIL: &str = "group-email";
    pub const GROUP_ID: &str = "group-id";
    pub const GROUP_NAME: &str = "group-name";
    pub const TOP_LEVEL_ALTERNATE: &str = "top-level-alternate";
    pub const SUBDOMAIN_ALTERNATE: &str = "subdomain-alternate";

    pub const ALL_GROUP_EMAIL: &str = "all-group-email";
    pub const ALL_GROUP_NAME: &str = "all-group-name";
    pub const OFFICERS_GROUP_EMAIL: &str = "officers-group-email";
    pub const OFFICERS_GROUP_NAME: &str = "officers-group-name";
    pub const OFFICERS_TOP_LEVEL_ALTERNATE: &str = "officers-top-level-alternate";
    pub const OFFICERS_SUBDOMAIN_ALTERNATE: &str = "officers-subdomain-alternate";
    pub const SCOPED_ALL_GROUP_EMAIL: &str = "scoped-all-group-email";
    pub const SCOPED_ALL_GROUP_NAME: &str = "scoped-all-group-name";
    pub const SCOPED_ALL_SUBDOMAIN_ALTERNATE: &str = "scoped-all-subdomain-alternate";

    pub(crate) const TEMPLATES: &[(&str, &str)] = &[
        (GROUP_EMAIL, "$(simplified-branch)-$(simplified-office)@$(domain)"),
        (GROUP_NAME, "${branch} ${office}"),
        (TOP_LEVEL_ALTERNATE, "$(simplified-office)@$(domain)"),
        (
            SUBDOMAIN_ALTERNATE,
            "$(simplified-office)@$(simplified-branch).$(domain)",
        ),
        (ALL_GROUP_EMAIL, "all-$(simplified-office-plural)@$(domain)"),
        (ALL_GROUP_NAME, "All ${office-plural}"),
        (OFFICERS_GROUP_EMAIL, "$(simplified-branch)-officers@$(domain)"),
        (OFFICERS_GROUP_NAME, "${branch} Officers"),
        (OFFICERS_TOP_LEVEL_ALTERNATE, "officers@$(domain)"),
        (
            OFFICERS_SUBDOMAIN_ALTERNATE,
            "officers@$(simplified-branch).$(domain)",
        ),
        (
            SCOPED_ALL_GROUP_EMAIL,
            "$(simplified-branch)-all-$(simplified-office-plural)@$(domain)",
        ),
        (SCOPED_ALL_GROUP_NAME, "${branch} All ${office-plural}"),
        (
            SCOPED_ALL_SUBDOMAIN_ALTERNATE,
            "all-$(simplified-office-plural)@$(simplified-branch).$(domain)",
        ),
    ];
}

/// Which branches are served from their own subdomain.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubdomainFilter {
    /// No branch has a subdomain
    #[default]
    None,
    /// Every branch has a subdomain (`all`)
    All,
    /// Only the listed branches (`fogs,geese`)
    Only(BTreeSet<String>),
    /// Every branch except the listed ones (`!fogs,geese`)
    Except(BTreeSet<String>),
}

impl SubdomainFilter {
    /// Parse `all`, a comma-separated allow-list, or a `!`-prefixed deny-list.
    ///
    /// Names are compared in simplified form.
    pub fn parse(filter: &str) -> Self {
        let filter = filter.trim();
        if filter.is_empty() {
            return Self::None;
        }
        if filter.eq_ignore_ascii_case("all") {
            return Self::All;
        }
        let (deny, list) = match filter.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, filter),
        };
        let names: BTreeSet<String> = list
            .split(',')
            .map(template::simplify)
            .filter(|name| !name.is_empty())
            .collect();
        if deny {
            Self::Except(names)
        } else {
            Self::Only(names)
        }
    }

    /// Whether `branch` qualifies as a subdomain.
    pub fn matches(&self, branch: &str) -> bool {
        let branch = template::simplify(branch);
        match self {
            Self::None => false,
            Self::All => true,
            Self::Only(names) => names.contains(&branch),
            Self::Except(names) => !names.contains(&branch),
        }
    }
}

/// Identifiers and addresses derived for a single office.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResolvedOffice {
    pub group_email: String,
    pub group_id: String,
    pub group_name: String,
    pub alternate_addresses: BTreeSet<String>,
}

/// Template-driven naming policy for branches, offices and aggregates.
#[derive(Debug, Clone)]
pub struct GroupPolicy {
    defaults: Properties,
    subdomains: SubdomainFilter,
}

impl GroupPolicy {
    /// Create a policy for `domain`, layering `overrides` over the
    /// built-in templates.
    ///
    /// `overrides` may also carry `top-level-group` and `subdomains`.
    pub fn new(domain: &str, overrides: Properties) -> Result<Self> {
        let domain = domain.trim();
        if domain.is_empty() {
            return Err(Error::MissingDomain);
        }

        let mut defaults: Properties = defaults::TEMPLATES
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        defaults.insert(defaults::DOMAIN.to_string(), domain.to_lowercase());
        defaults.extend(overrides);

        let subdomains = defaults
            .get(defaults::SUBDOMAINS)
            .map(|filter| SubdomainFilter::parse(filter))
            .unwrap_or_default();

        Ok(Self {
            defaults,
            subdomains,
        })
    }

    /// The base domain.
    pub fn domain(&self) -> &str {
        self.defaults
            .get(defaults::DOMAIN)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// The configured top-level group, if any.
    pub fn top_level_group(&self) -> Option<&str> {
        self.defaults
            .get(defaults::TOP_LEVEL_GROUP)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Whether `branch` is the configured top-level group.
    pub fn is_top_level(&self, branch: &str) -> bool {
        self.top_level_group() == Some(branch)
    }

    /// Whether `branch` is served from its own subdomain.
    pub fn is_subdomain(&self, branch: &str) -> bool {
        self.subdomains.matches(branch)
    }

    /// Expand `template`, looking names up in `properties` first and the
    /// policy defaults second.
    pub fn resolve(&self, template: &str, properties: &Properties) -> String {
        template::expand(template, |name| {
            properties
                .get(name)
                .or_else(|| self.defaults.get(name))
                .cloned()
        })
    }

    /// Look up a property (explicit value first, then default) and expand it.
    pub fn property(&self, id: &str, properties: &Properties) -> Option<String> {
        properties
            .get(id)
            .or_else(|| self.defaults.get(id))
            .map(|value| self.resolve(value, properties))
    }

    /// Expand the policy-wide template stored under `id`, ignoring any
    /// per-office value of the same name.
    fn default_template(&self, id: &str, properties: &Properties) -> String {
        self.defaults
            .get(id)
            .map(|value| self.resolve(value, properties))
            .unwrap_or_default()
    }

    /// Naming context for an office: raw and simplified branch/office names
    /// plus the office plural.
    pub fn context(&self, branch: &str, office: &str) -> Properties {
        let office_plural = template::plural(office);
        [
            ("branch", branch.to_string()),
            ("office", office.to_string()),
            ("simplified-branch", template::simplify(branch)),
            ("simplified-office", template::simplify(office)),
            ("simplified-office-plural", template::simplify(&office_plural)),
            ("office-plural", office_plural),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    /// Canonical primary address: `$(simplified-branch)-$(simplified-office)@$(domain)`.
    pub fn group_email(&self, branch: &str, office: &str) -> Result<String> {
        let email = self
            .default_template(defaults::GROUP_EMAIL, &self.context(branch, office))
            .to_lowercase();
        require_address(defaults::GROUP_EMAIL, &email)?;
        Ok(email)
    }

    /// Group id: an explicit `group-id` property, else the canonical address.
    pub fn group_id(&self, branch: &str, office: &str, properties: &Properties) -> Result<String> {
        match properties.get(defaults::GROUP_ID) {
            Some(id) if !id.trim().is_empty() => Ok(id.trim().to_string()),
            _ => self.group_email(branch, office),
        }
    }

    /// Display name: an explicit `group-name`, else `${branch} ${office}`.
    pub fn group_name(&self, branch: &str, office: &str, properties: &Properties) -> String {
        let mut context = self.context(branch, office);
        context.extend(properties.clone());
        self.property(defaults::GROUP_NAME, &context)
            .unwrap_or_default()
    }

    /// Lowercase an address, qualifying bare names with the base domain.
    pub fn normalize_email(&self, email: &str) -> String {
        let email = email.trim();
        if email.contains('@') {
            email.to_lowercase()
        } else {
            format!("{}@{}", email, self.domain()).to_lowercase()
        }
    }

    /// Addresses the policy generates for an office.
    ///
    /// The top-level group's offices answer at `office@domain`; subdomain
    /// branches' offices answer at `office@branch.domain`.
    pub fn alternate_addresses(&self, branch: &str, office: &str) -> Vec<String> {
        let context = self.context(branch, office);
        let template = if self.is_top_level(branch) {
            defaults::TOP_LEVEL_ALTERNATE
        } else if self.is_subdomain(branch) {
            defaults::SUBDOMAIN_ALTERNATE
        } else {
            return Vec::new();
        };
        let address = self.default_template(template, &context).to_lowercase();
        if require_address(template, &address).is_ok() {
            vec![address]
        } else {
            Vec::new()
        }
    }

    /// Derive every identifier for an office.
    ///
    /// `properties` are the caller-supplied office properties. A supplied
    /// `group-email` that differs from the canonical one is kept only as an
    /// alternate address. `declared_alternates` are merged with the
    /// policy-generated ones; the primary address never appears among them.
    pub fn resolve_office(
        &self,
        branch: &str,
        office: &str,
        properties: &Properties,
        declared_alternates: &[String],
    ) -> Result<ResolvedOffice> {
        let group_email = self.group_email(branch, office)?;
        let group_id = self.group_id(branch, office, properties)?;
        let group_name = self.group_name(branch, office, properties);

        let mut alternate_addresses: BTreeSet<String> = declared_alternates
            .iter()
            .filter(|address| !address.trim().is_empty())
            .map(|address| self.normalize_email(address))
            .collect();
        if let Some(supplied) = properties.get(defaults::GROUP_EMAIL)
            && !supplied.trim().is_empty()
        {
            alternate_addresses.insert(self.normalize_email(supplied));
        }
        alternate_addresses.extend(self.alternate_addresses(branch, office));
        alternate_addresses.remove(&group_email);

        Ok(ResolvedOffice {
            group_email,
            group_id,
            group_name,
            alternate_addresses,
        })
    }
}
