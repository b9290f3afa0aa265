//! Mock directory service for tests

use crate::controller::{BatchResults, GroupsController, ItemOutcome};
use crate::operation::{OperationHandle, RESPONSE_PREFIX};
use crate::state::OfficeProperties;
use anyhow::{Result, bail};
use std::collections::BTreeSet;

/// Records every call and answers from configurable canned behavior.
///
/// By default every request succeeds and every verification passes.
#[derive(Debug, Default)]
pub struct MockController {
    /// Every call in order, e.g. `insertMember west/herald a@sca.org`
    pub calls: Vec<String>,
    /// Verify actions report "not visible yet"
    pub fail_verify: bool,
    /// Run functions whose requests fail inside the batch
    pub fail_batch: BTreeSet<String>,
    /// Run functions that fail before a request is issued
    pub reject: BTreeSet<String>,
    pub fail_begin: bool,
    pub fail_complete: bool,
    batch: BatchResults,
}

impl MockController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_verification() -> Self {
        Self {
            fail_verify: true,
            ..Self::default()
        }
    }

    pub fn failing_batch(function: &str) -> Self {
        Self {
            fail_batch: BTreeSet::from([function.to_string()]),
            ..Self::default()
        }
    }

    /// Calls whose function name is `function`.
    pub fn calls_to(&self, function: &str) -> Vec<&str> {
        self.calls
            .iter()
            .filter(|call| call.split(' ').next() == Some(function))
            .map(String::as_str)
            .collect()
    }

    /// Function names of run actions, in call order.
    pub fn run_order(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|call| call.split(' ').next())
            .filter(|name| {
                !name.starts_with("verify") && *name != "begin" && *name != "complete"
            })
            .collect()
    }

    fn request(&mut self, op: &mut OperationHandle<'_>, function: &str, call: String) -> Result<()> {
        self.calls.push(format!("{function} {call}"));
        if self.reject.contains(function) {
            bail!("{function} rejected");
        }
        let key = op.next_key();
        let outcome = if self.fail_batch.contains(function) {
            ItemOutcome::failure(format!("{function} failed"))
        } else {
            ItemOutcome::Success
        };
        self.batch.insert(format!("{RESPONSE_PREFIX}{key}"), outcome);
        Ok(())
    }

    fn check(&mut self, function: &str, call: String) -> bool {
        self.calls.push(format!("{function} {call}"));
        !self.fail_verify
    }
}

impl GroupsController for MockController {
    fn begin(&mut self) -> Result<()> {
        self.calls.push("begin".to_string());
        if self.fail_begin {
            bail!("service unavailable");
        }
        Ok(())
    }

    fn insert_branch(&mut self, op: &mut OperationHandle<'_>, branch: &str) -> Result<()> {
        self.request(op, "insertBranch", branch.to_string())
    }

    fn delete_branch(&mut self, op: &mut OperationHandle<'_>, branch: &str) -> Result<()> {
        self.request(op, "deleteBranch", branch.to_string())
    }

    fn insert_member(
        &mut self,
        op: &mut OperationHandle<'_>,
        branch: &str,
        office: &str,
        _group_id: &str,
        email: &str,
    ) -> Result<()> {
        self.request(op, "insertMember", format!("{branch}/{office} {email}"))
    }

    fn remove_member(
        &mut self,
        op: &mut OperationHandle<'_>,
        branch: &str,
        office: &str,
        _group_id: &str,
        email: &str,
    ) -> Result<()> {
        self.request(op, "removeMember", format!("{branch}/{office} {email}"))
    }

    fn verify_member(
        &mut self,
        branch: &str,
        office: &str,
        _group_id: &str,
        email: &str,
    ) -> Result<bool> {
        Ok(self.check("verifyMember", format!("{branch}/{office} {email}")))
    }

    fn insert_group_alternate_address(
        &mut self,
        op: &mut OperationHandle<'_>,
        branch: &str,
        office: &str,
        _group_id: &str,
        address: &str,
    ) -> Result<()> {
        self.request(
            op,
            "insertGroupAlternateAddress",
            format!("{branch}/{office} {address}"),
        )
    }

    fn remove_group_alternate_address(
        &mut self,
        op: &mut OperationHandle<'_>,
        branch: &str,
        office: &str,
        _group_id: &str,
        address: &str,
    ) -> Result<()> {
        self.request(
            op,
            "removeGroupAlternateAddress",
            format!("{branch}/{office} {address}"),
        )
    }

    fn verify_group_alternate_address(
        &mut self,
        branch: &str,
        office: &str,
        _group_id: &str,
        address: &str,
    ) -> Result<bool> {
        Ok(self.check(
            "verifyGroupAlternateAddress",
            format!("{branch}/{office} {address}"),
        ))
    }

    fn insert_office(
        &mut self,
        op: &mut OperationHandle<'_>,
        branch: &str,
        office: &str,
        _properties: &OfficeProperties,
    ) -> Result<()> {
        self.request(op, "insertOffice", format!("{branch}/{office}"))
    }

    fn configure_office(
        &mut self,
        op: &mut OperationHandle<'_>,
        branch: &str,
        office: &str,
        _properties: &OfficeProperties,
    ) -> Result<()> {
        self.request(op, "configureOffice", format!("{branch}/{office}"))
    }

    fn delete_office(
        &mut self,
        op: &mut OperationHandle<'_>,
        branch: &str,
        office: &str,
        _properties: &OfficeProperties,
    ) -> Result<()> {
        self.request(op, "deleteOffice", format!("{branch}/{office}"))
    }

    fn verify_office(
        &mut self,
        branch: &str,
        office: &str,
        _properties: &OfficeProperties,
    ) -> Result<bool> {
        Ok(self.check("verifyOffice", format!("{branch}/{office}")))
    }

    fn verify_office_configuration(
        &mut self,
        branch: &str,
        office: &str,
        _properties: &OfficeProperties,
    ) -> Result<bool> {
        Ok(self.check("verifyOfficeConfiguration", format!("{branch}/{office}")))
    }

    fn complete(&mut self, want_results: bool) -> Result<BatchResults> {
        self.calls.push(format!("complete {want_results}"));
        let batch = std::mem::take(&mut self.batch);
        if self.fail_complete {
            bail!("batch request timed out");
        }
        Ok(if want_results { batch } else { BatchResults::new() })
    }
}
