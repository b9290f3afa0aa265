//! Schedulable operations
//!
//! An [`OperationKind`] names one change against the directory service
//! together with its parameters. An [`Operation`] wraps a kind with the
//! bookkeeping the journal needs: a nonce for correlating batch results,
//! a per-operation request counter, and execution/verification state.

use crate::error::{Error, Result};
use crate::state::OfficeProperties;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Prefix the directory service puts in front of request keys in batch responses.
pub const RESPONSE_PREFIX: &str = "response-";

/// Ordered apply phase.
///
/// Offices are created before their members are added, and branches are
/// torn down after everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Setup,
    Creation,
    Default,
    Teardown,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Self; 4] = [Self::Setup, Self::Creation, Self::Default, Self::Teardown];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Creation => "creation",
            Self::Default => "default",
            Self::Teardown => "teardown",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One change against the directory service.
///
/// Two kinds are the same work exactly when they compare equal; the
/// journal relies on this to drop duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    InsertBranch {
        branch: String,
    },
    DeleteBranch {
        branch: String,
    },
    InsertOffice {
        branch: String,
        office: String,
        properties: OfficeProperties,
    },
    ConfigureOffice {
        branch: String,
        office: String,
        properties: OfficeProperties,
    },
    DeleteOffice {
        branch: String,
        office: String,
        properties: OfficeProperties,
    },
    InsertMember {
        branch: String,
        office: String,
        group_id: String,
        email: String,
    },
    RemoveMember {
        branch: String,
        office: String,
        group_id: String,
        email: String,
    },
    InsertGroupAlternateAddress {
        branch: String,
        office: String,
        group_id: String,
        address: String,
    },
    RemoveGroupAlternateAddress {
        branch: String,
        office: String,
        group_id: String,
        address: String,
    },
}

impl OperationKind {
    /// Which queue this kind of operation runs in.
    pub fn phase(&self) -> Phase {
        match self {
            Self::InsertBranch { .. } => Phase::Setup,
            Self::InsertOffice { .. } | Self::ConfigureOffice { .. } => Phase::Creation,
            Self::InsertMember { .. }
            | Self::RemoveMember { .. }
            | Self::InsertGroupAlternateAddress { .. }
            | Self::RemoveGroupAlternateAddress { .. } => Phase::Default,
            Self::DeleteOffice { .. } | Self::DeleteBranch { .. } => Phase::Teardown,
        }
    }

    /// Name of the controller action that performs this operation.
    pub fn run_function(&self) -> &'static str {
        match self {
            Self::InsertBranch { .. } => "insertBranch",
            Self::DeleteBranch { .. } => "deleteBranch",
            Self::InsertOffice { .. } => "insertOffice",
            Self::ConfigureOffice { .. } => "configureOffice",
            Self::DeleteOffice { .. } => "deleteOffice",
            Self::InsertMember { .. } => "insertMember",
            Self::RemoveMember { .. } => "removeMember",
            Self::InsertGroupAlternateAddress { .. } => "insertGroupAlternateAddress",
            Self::RemoveGroupAlternateAddress { .. } => "removeGroupAlternateAddress",
        }
    }

    /// Name of the controller check that confirms this operation, if any.
    ///
    /// Operations without a check count as verified once they have run
    /// without a batch error.
    pub fn verify_function(&self) -> Option<&'static str> {
        match self {
            Self::InsertOffice { .. } => Some("verifyOffice"),
            Self::ConfigureOffice { .. } => Some("verifyOfficeConfiguration"),
            Self::InsertMember { .. } => Some("verifyMember"),
            Self::InsertGroupAlternateAddress { .. } => Some("verifyGroupAlternateAddress"),
            _ => None,
        }
    }

    /// Branch this operation touches.
    pub fn branch(&self) -> &str {
        match self {
            Self::InsertBranch { branch }
            | Self::DeleteBranch { branch }
            | Self::InsertOffice { branch, .. }
            | Self::ConfigureOffice { branch, .. }
            | Self::DeleteOffice { branch, .. }
            | Self::InsertMember { branch, .. }
            | Self::RemoveMember { branch, .. }
            | Self::InsertGroupAlternateAddress { branch, .. }
            | Self::RemoveGroupAlternateAddress { branch, .. } => branch,
        }
    }

    /// Positional parameters, as persisted under `run-params`.
    pub fn run_params(&self) -> Result<Vec<Value>> {
        let params = match self {
            Self::InsertBranch { branch } | Self::DeleteBranch { branch } => {
                vec![Value::from(branch.as_str())]
            }
            Self::InsertOffice {
                branch,
                office,
                properties,
            }
            | Self::ConfigureOffice {
                branch,
                office,
                properties,
            }
            | Self::DeleteOffice {
                branch,
                office,
                properties,
            } => vec![
                Value::from(branch.as_str()),
                Value::from(office.as_str()),
                serde_json::to_value(properties)?,
            ],
            Self::InsertMember {
                branch,
                office,
                group_id,
                email: target,
            }
            | Self::RemoveMember {
                branch,
                office,
                group_id,
                email: target,
            }
            | Self::InsertGroupAlternateAddress {
                branch,
                office,
                group_id,
                address: target,
            }
            | Self::RemoveGroupAlternateAddress {
                branch,
                office,
                group_id,
                address: target,
            } => vec![
                Value::from(branch.as_str()),
                Value::from(office.as_str()),
                Value::from(group_id.as_str()),
                Value::from(target.as_str()),
            ],
        };
        Ok(params)
    }

    /// Rebuild a kind from its persisted name and parameters.
    pub fn from_parts(run_function: &str, params: Vec<Value>) -> Result<Self> {
        let mut p = Params::new(run_function, params);
        let kind = match run_function {
            "insertBranch" => Self::InsertBranch {
                branch: p.string()?,
            },
            "deleteBranch" => Self::DeleteBranch {
                branch: p.string()?,
            },
            "insertOffice" => Self::InsertOffice {
                branch: p.string()?,
                office: p.string()?,
                properties: p.properties()?,
            },
            "configureOffice" => Self::ConfigureOffice {
                branch: p.string()?,
                office: p.string()?,
                properties: p.properties()?,
            },
            "deleteOffice" => Self::DeleteOffice {
                branch: p.string()?,
                office: p.string()?,
                properties: p.properties()?,
            },
            "insertMember" => Self::InsertMember {
                branch: p.string()?,
                office: p.string()?,
                group_id: p.string()?,
                email: p.string()?,
            },
            "removeMember" => Self::RemoveMember {
                branch: p.string()?,
                office: p.string()?,
                group_id: p.string()?,
                email: p.string()?,
            },
            "insertGroupAlternateAddress" => Self::InsertGroupAlternateAddress {
                branch: p.string()?,
                office: p.string()?,
                group_id: p.string()?,
                address: p.string()?,
            },
            "removeGroupAlternateAddress" => Self::RemoveGroupAlternateAddress {
                branch: p.string()?,
                office: p.string()?,
                group_id: p.string()?,
                address: p.string()?,
            },
            other => {
                return Err(Error::InvalidOperation {
                    function: other.to_string(),
                    reason: "unknown run-function".to_string(),
                });
            }
        };
        p.finish()?;
        Ok(kind)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsertBranch { branch } | Self::DeleteBranch { branch } => {
                write!(f, "{} {}", self.run_function(), branch)
            }
            Self::InsertOffice { branch, office, .. }
            | Self::ConfigureOffice { branch, office, .. }
            | Self::DeleteOffice { branch, office, .. } => {
                write!(f, "{} {}/{}", self.run_function(), branch, office)
            }
            Self::InsertMember {
                branch,
                office,
                email: target,
                ..
            }
            | Self::RemoveMember {
                branch,
                office,
                email: target,
                ..
            }
            | Self::InsertGroupAlternateAddress {
                branch,
                office,
                address: target,
                ..
            }
            | Self::RemoveGroupAlternateAddress {
                branch,
                office,
                address: target,
                ..
            } => write!(f, "{} {}/{} {}", self.run_function(), branch, office, target),
        }
    }
}

/// Sequential reader over persisted `run-params`.
struct Params {
    function: String,
    values: std::vec::IntoIter<Value>,
}

impl Params {
    fn new(function: &str, values: Vec<Value>) -> Self {
        Self {
            function: function.to_string(),
            values: values.into_iter(),
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::InvalidOperation {
            function: self.function.clone(),
            reason: reason.into(),
        }
    }

    fn next(&mut self) -> Result<Value> {
        self.values
            .next()
            .ok_or_else(|| self.invalid("too few run-params"))
    }

    fn string(&mut self) -> Result<String> {
        match self.next()? {
            Value::String(s) => Ok(s),
            other => Err(self.invalid(format!("expected a string, found {other}"))),
        }
    }

    fn properties(&mut self) -> Result<OfficeProperties> {
        let value = self.next()?;
        serde_json::from_value(value).map_err(|e| self.invalid(e.to_string()))
    }

    fn finish(mut self) -> Result<()> {
        if self.values.next().is_some() {
            return Err(self.invalid("too many run-params"));
        }
        Ok(())
    }
}

/// Verification bookkeeping carried across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStatus {
    /// The operation ran but could not be confirmed
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub failed_verification: bool,

    /// How many passes ran this operation without confirming it
    #[serde(default, skip_serializing_if = "is_zero")]
    pub attempts: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// Persisted form of a queued operation (one entry under `#queues`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OperationRecord {
    pub run_function: String,

    #[serde(default)]
    pub run_params: Vec<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_function: Option<String>,

    #[serde(default, skip_serializing_if = "is_default_status")]
    pub state: OperationStatus,
}

fn is_default_status(status: &OperationStatus) -> bool {
    *status == OperationStatus::default()
}

/// Correlation identity of an operation.
///
/// Controllers embed it in the key of every request they issue on the
/// operation's behalf, so batch results can be routed back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Nonce(String);

impl Nonce {
    /// Nonce for the `n`th operation created by a journal.
    pub(crate) fn from_counter(n: u64) -> Self {
        Self(format!("op{n}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract the nonce from a batch result key.
    ///
    /// Accepts both the bare request key `<nonce>:<sequence>` and the
    /// service's `response-<nonce>:<sequence>` form.
    pub fn from_result_key(key: &str) -> Option<&str> {
        let key = key.strip_prefix(RESPONSE_PREFIX).unwrap_or(key);
        let (nonce, sequence) = key.rsplit_once(':')?;
        if nonce.is_empty() || sequence.parse::<u32>().is_err() {
            return None;
        }
        Some(nonce)
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a controller sees of the operation it is running.
///
/// Each request a controller adds to its batch should be keyed with
/// [`OperationHandle::next_key`].
#[derive(Debug)]
pub struct OperationHandle<'a> {
    nonce: &'a Nonce,
    sequence: &'a mut u32,
}

impl OperationHandle<'_> {
    pub fn nonce(&self) -> &str {
        self.nonce.as_str()
    }

    /// Key for the next request issued on behalf of this operation.
    pub fn next_key(&mut self) -> String {
        *self.sequence += 1;
        format!("{}:{}", self.nonce, self.sequence)
    }
}

/// A queued unit of work.
#[derive(Debug, Clone)]
pub struct Operation {
    nonce: Nonce,
    sequence: u32,
    kind: OperationKind,
    pub(crate) executed: bool,
    pub(crate) batch_errors: Vec<String>,
    pub(crate) status: OperationStatus,
}

impl Operation {
    pub(crate) fn new(nonce: Nonce, kind: OperationKind) -> Self {
        Self {
            nonce,
            sequence: 0,
            kind,
            executed: false,
            batch_errors: Vec::new(),
            status: OperationStatus::default(),
        }
    }

    pub(crate) fn from_record(nonce: Nonce, record: OperationRecord) -> Result<Self> {
        let kind = OperationKind::from_parts(&record.run_function, record.run_params)?;
        let mut op = Self::new(nonce, kind);
        op.status = record.state;
        Ok(op)
    }

    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    /// Whether this operation ran during the current pass.
    pub fn is_executed(&self) -> bool {
        self.executed
    }

    /// Failures the service reported for this operation's requests.
    pub fn batch_errors(&self) -> &[String] {
        &self.batch_errors
    }

    pub fn status(&self) -> &OperationStatus {
        &self.status
    }

    /// Same run-function and parameters as `other`.
    pub fn same_work(&self, other: &OperationKind) -> bool {
        self.kind == *other
    }

    /// The kind to run alongside the handle its requests are keyed through.
    pub(crate) fn split(&mut self) -> (&OperationKind, OperationHandle<'_>) {
        (
            &self.kind,
            OperationHandle {
                nonce: &self.nonce,
                sequence: &mut self.sequence,
            },
        )
    }

    /// Clear per-pass state before running again.
    pub(crate) fn reset(&mut self) {
        self.executed = false;
        self.batch_errors.clear();
    }

    pub fn to_record(&self) -> Result<OperationRecord> {
        Ok(OperationRecord {
            run_function: self.kind.run_function().to_string(),
            run_params: self.kind.run_params()?,
            verify_function: self.kind.verify_function().map(str::to_string),
            state: self.status.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn member() -> OperationKind {
        OperationKind::InsertMember {
            branch: "west".into(),
            office: "webminister".into(),
            group_id: "west-webminister@testdomain.org".into(),
            email: "new.admin@somewhere.com".into(),
        }
    }

    #[test]
    fn test_phases() {
        assert_eq!(
            OperationKind::InsertBranch {
                branch: "west".into()
            }
            .phase(),
            Phase::Setup
        );
        assert_eq!(member().phase(), Phase::Default);
        assert_eq!(
            OperationKind::DeleteBranch {
                branch: "west".into()
            }
            .phase(),
            Phase::Teardown
        );
        assert!(Phase::Setup < Phase::Creation && Phase::Default < Phase::Teardown);
    }

    #[test]
    fn test_record_layout() {
        let op = Operation::new(Nonce::from_counter(1), member());
        let record = serde_json::to_value(op.to_record().unwrap()).unwrap();
        assert_eq!(
            record,
            json!({
                "run-function": "insertMember",
                "run-params": [
                    "west",
                    "webminister",
                    "west-webminister@testdomain.org",
                    "new.admin@somewhere.com"
                ],
                "verify-function": "verifyMember"
            })
        );
    }

    #[test]
    fn test_office_record_from_yaml() {
        let record: OperationRecord = serde_yaml::from_str(
            "
run-function: insertOffice
run-params:
  - _aggregated
  - all-rapiermarshals
  - group-id: all-rapiermarshals@westkingdom.org
    group-name: 'All Rapier-marshals'
    group-email: all-rapiermarshals@westkingdom.org
verify-function: verifyOffice
state:
  failedVerification: true
",
        )
        .unwrap();

        let op = Operation::from_record(Nonce::from_counter(7), record).unwrap();
        assert!(op.status().failed_verification);
        match op.kind() {
            OperationKind::InsertOffice {
                branch,
                office,
                properties,
            } => {
                assert_eq!(branch, "_aggregated");
                assert_eq!(office, "all-rapiermarshals");
                assert_eq!(properties.group_name, "All Rapier-marshals");
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_unknown_function_is_rejected() {
        let err = OperationKind::from_parts("renameGroup", vec![json!("west")]).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }));
    }

    #[test]
    fn test_wrong_arity_is_rejected() {
        assert!(OperationKind::from_parts("insertMember", vec![json!("west")]).is_err());
        assert!(
            OperationKind::from_parts("deleteBranch", vec![json!("west"), json!("extra")])
                .is_err()
        );
        assert!(OperationKind::from_parts("deleteBranch", vec![json!(42)]).is_err());
    }

    #[test]
    fn test_handle_keys_advance_sequence() {
        let mut op = Operation::new(Nonce::from_counter(3), member());
        let (_, mut handle) = op.split();
        assert_eq!(handle.next_key(), "op3:1");
        assert_eq!(handle.next_key(), "op3:2");
        assert_eq!(handle.nonce(), "op3");
    }

    #[test]
    fn test_nonce_from_result_key() {
        assert_eq!(Nonce::from_result_key("response-op12:3"), Some("op12"));
        assert_eq!(Nonce::from_result_key("op12:1"), Some("op12"));
        assert_eq!(Nonce::from_result_key("response-op12"), None);
        assert_eq!(Nonce::from_result_key("response-:1"), None);
        assert_eq!(Nonce::from_result_key("response-op1:x"), None);
    }

    #[test]
    fn test_same_work_ignores_identity() {
        let a = Operation::new(Nonce::from_counter(1), member());
        let b = Operation::new(Nonce::from_counter(2), member());
        assert_ne!(a.nonce(), b.nonce());
        assert!(a.same_work(b.kind()));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            member().to_string(),
            "insertMember west/webminister new.admin@somewhere.com"
        );
    }
}
