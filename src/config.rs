//! Reconciliation configuration
//!
//! ```toml
//! domain = "testdomain.org"
//! top-level-group = "north"
//! subdomains = "fogs,geese,wolves"
//!
//! [templates]
//! group-name = "${branch} ${office} Officers"
//!
//! [retry]
//! max-attempts = 10
//! ```

use crate::error::{Error, Result};
use crate::journal::RetryPolicy;
use grouppolicy::policy::defaults;
use grouppolicy::{GroupPolicy, Properties};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ============================================================================
// Config Schema
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReconcileConfig {
    /// Base domain every generated address lives under
    pub domain: String,

    /// Branch whose offices answer at `office@domain`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_level_group: Option<String>,

    /// `all`, a comma-separated allow list, or a `!`-prefixed deny list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdomains: Option<String>,

    /// Overrides for the policy's naming templates
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub templates: Properties,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl ReconcileConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.domain.trim().is_empty() {
            return Err(Error::Config("domain cannot be empty".into()));
        }
        if self.domain.contains('@') {
            return Err(Error::Config(format!(
                "domain '{}' must not contain '@'",
                self.domain
            )));
        }
        for reserved in [defaults::DOMAIN, defaults::TOP_LEVEL_GROUP, defaults::SUBDOMAINS] {
            if self.templates.contains_key(reserved) {
                return Err(Error::Config(format!(
                    "'{reserved}' is a top-level setting, not a template"
                )));
            }
        }
        if self.retry.max_attempts == Some(0) {
            return Err(Error::Config("retry.max-attempts must be at least 1".into()));
        }
        Ok(())
    }

    /// Build the naming policy this configuration describes.
    pub fn policy(&self) -> Result<GroupPolicy> {
        let mut overrides = self.templates.clone();
        if let Some(group) = &self.top_level_group {
            overrides.insert(defaults::TOP_LEVEL_GROUP.to_string(), group.clone());
        }
        if let Some(subdomains) = &self.subdomains {
            overrides.insert(defaults::SUBDOMAINS.to_string(), subdomains.clone());
        }
        Ok(GroupPolicy::new(&self.domain, overrides)?)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }
}
