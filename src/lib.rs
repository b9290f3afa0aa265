//! # groupsync
//!
//! Reconcile declared branch/office group memberships against a
//! directory-of-groups service.
//!
//! ## Core Concepts
//!
//! - **GroupTree**: branches of offices, each office a group with members
//!   and alternate addresses, plus the computed `_aggregated` branch
//! - **GroupPolicy**: derives addresses, names and aggregate groups
//!   (see the `grouppolicy` crate)
//! - **diff**: plans the operations that take one tree to another
//! - **Journal**: runs operations in phases, verifies them, and keeps
//!   whatever could not be verified for the next run
//! - **GroupsController**: the directory service, behind a trait
//!
//! ## Example
//!
//! ```ignore
//! use groupsync::{DesiredState, GroupsManager, PersistedState, ReconcileConfig};
//!
//! let config = ReconcileConfig::load("groupsync.toml")?;
//! let previous: PersistedState = load_previous_run()?;
//! let desired: DesiredState = load_desired_state()?;
//!
//! let mut manager = GroupsManager::from_config(MyController::new(), &config, previous)?;
//! manager.update(&desired)?;
//! let summary = manager.execute();
//! println!("{} verified, {} pending", summary.verified, summary.pending);
//!
//! save_for_next_run(&manager.export()?)?;
//! ```

#![warn(clippy::all)]

pub mod aggregate;
pub mod config;
pub mod controller;
pub mod differ;
pub mod error;
pub mod journal;
pub mod manager;
pub mod normalize;
pub mod operation;
pub mod state;
pub mod summary;

#[cfg(test)]
mod testing;

pub use aggregate::generate_aggregated;
pub use config::ReconcileConfig;
pub use controller::{BatchResults, GroupsController, ItemOutcome};
pub use differ::diff;
pub use error::{Error, Result};
pub use journal::{Journal, RetryPolicy};
pub use manager::GroupsManager;
pub use normalize::{DesiredState, MembershipData, normalize, normalize_membership_data};
pub use operation::{Operation, OperationHandle, OperationKind, OperationRecord, Phase};
pub use state::{Branch, GroupTree, Office, OfficeProperties, PersistedState};
pub use summary::{ExecuteSummary, PlanSummary};

pub use grouppolicy::GroupPolicy;
