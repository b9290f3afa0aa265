//! Error types for policy evaluation.

use thiserror::Error;

/// Errors raised while deriving identifiers from policy templates.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The policy was constructed without a base domain.
    #[error("group policy requires a non-empty domain")]
    MissingDomain,

    /// A derived identifier is not a usable email address.
    ///
    /// This usually means a template referenced a property that has no
    /// value, leaving an empty local part or domain.
    #[error("derived {field} '{value}' is not a valid address")]
    InvalidIdentifier {
        /// Which derived field failed (e.g. `group-email`)
        field: String,
        /// The value the template produced
        value: String,
    },
}

/// Result type for policy operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Check that `value` looks like `local@domain` with both parts present.
pub(crate) fn require_address(field: &str, value: &str) -> Result<()> {
    match value.split_once('@') {
        Some((local, domain))
            if !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !domain.starts_with('.')
                && !domain.ends_with('.') =>
        {
            Ok(())
        }
        _ => Err(Error::InvalidIdentifier {
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
}
