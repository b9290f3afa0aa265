//! Error types for reconciliation.
//!
//! Only structural problems surface as errors: bad declarative input,
//! malformed persisted queues, unusable configuration. Failures reported by
//! the directory service never do; they leave the affected operation queued
//! for a later pass instead.

use thiserror::Error;

/// Errors that can occur while preparing a reconciliation pass.
#[derive(Debug, Error)]
pub enum Error {
    /// A derived identifier could not be produced by the naming policy
    #[error("policy error: {0}")]
    Policy(#[from] grouppolicy::Error),

    /// The same office is declared twice in one branch (e.g. as a list and an alias)
    #[error("office '{office}' is declared more than once in branch '{branch}'")]
    DuplicateOffice {
        /// Branch containing the duplicate
        branch: String,
        /// Name of the duplicated office
        office: String,
    },

    /// Two offices resolve to the same canonical address
    #[error("offices '{first}' and '{second}' both resolve to {email}")]
    DuplicateGroupEmail {
        /// The shared address
        email: String,
        /// `branch/office` of the first declaration
        first: String,
        /// `branch/office` of the second declaration
        second: String,
    },

    /// A declared property is a list or map instead of a scalar
    #[error("property '{property}' of office '{branch}/{office}' must be a string, number or boolean")]
    InvalidProperty {
        /// Branch declaring the office
        branch: String,
        /// Office declaring the property
        office: String,
        /// Name of the property
        property: String,
    },

    /// A declared branch uses a name reserved for computed data
    #[error("branch name '{name}' is reserved")]
    ReservedBranch {
        /// The offending branch name
        name: String,
    },

    /// A persisted queue entry could not be turned back into an operation
    #[error("invalid queued operation '{function}': {reason}")]
    InvalidOperation {
        /// The `run-function` of the entry
        function: String,
        /// What was wrong with it
        reason: String,
    },

    /// Configuration is missing a required value or is inconsistent
    #[error("invalid configuration: {0}")]
    Config(String),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON conversion error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error comes from the declared desired state rather than
    /// from configuration or persisted data.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Policy(_)
                | Self::DuplicateOffice { .. }
                | Self::DuplicateGroupEmail { .. }
                | Self::InvalidProperty { .. }
                | Self::ReservedBranch { .. }
        )
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;
