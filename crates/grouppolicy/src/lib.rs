//! # grouppolicy
//!
//! Naming and aggregation policy for branch/office group hierarchies.
//!
//! Given a branch name, an office name and whatever properties the user
//! declared, the policy derives:
//!
//! - the canonical primary address, group id and display name
//! - the alternate addresses the office should answer to
//! - the synthesized aggregate groups the office belongs to
//!
//! Everything is driven by small string templates, so a deployment can
//! rename things without touching code.
//!
//! ## Example
//!
//! ```
//! use grouppolicy::{GroupPolicy, Properties};
//!
//! let overrides = Properties::from([
//!     ("top-level-group".to_string(), "north".to_string()),
//! ]);
//! let policy = GroupPolicy::new("testdomain.org", overrides).unwrap();
//!
//! let office = policy
//!     .resolve_office("north", "president", &Properties::new(), &[])
//!     .unwrap();
//! assert_eq!(office.group_email, "north-president@testdomain.org");
//! assert!(office.alternate_addresses.contains("president@testdomain.org"));
//! ```
//!
//! ## Templates
//!
//! `$(name)` substitutes a property verbatim and `${name}` capitalizes its
//! first letter. Lookups check the office's own properties first, then the
//! policy defaults. See [`policy::defaults`] for every overridable key.

#![warn(clippy::all)]

pub mod aggregate;
pub mod error;
pub mod policy;
pub mod template;

pub use aggregate::AggregateGroup;
pub use error::{Error, Result};
pub use policy::{GroupPolicy, ResolvedOffice, SubdomainFilter};
pub use template::{Properties, capitalize, plural, simplify};
