//! Rule trait definition and rule registry.
//!
//! Every access rule implements the [`Rule`] trait. Rules are stateless:
//! the requester, the analyzed query, the policy schema and the gate
//! configuration are passed in. The registry function
//! [`build_rule_registry`] returns the rules in evaluation order; the first
//! rule that denies decides the verdict.

pub mod identity;
pub mod ownership;
pub mod statement;

use crate::config::GateConfig;
use crate::query::{CandidateQuery, TableRef};
use crate::schema::PolicySchema;
use crate::scope::BlockScope;
use crate::types::{DenyReason, Requester};

/// Every access rule implements this trait.
///
/// Rules must be `Send + Sync`: one registry serves concurrent guard calls.
pub trait Rule: Send + Sync {
    /// Unique name for this rule (used in logs and audit records).
    fn name(&self) -> &'static str;

    /// Whether the rule runs for this requester. Student-only by default.
    fn applies_to(&self, requester: &Requester, _config: &GateConfig) -> bool {
        requester.is_student()
    }

    /// Return the denial this rule raises for the query, if any.
    fn evaluate(
        &self,
        requester: &Requester,
        query: &CandidateQuery,
        schema: &PolicySchema,
        config: &GateConfig,
    ) -> Option<DenyReason>;
}

/// Build the rule registry in evaluation order.
#[must_use]
pub fn build_rule_registry() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(identity::OtherRoleIdentityRule),
        Box::new(identity::OwnIdentityRule),
        Box::new(ownership::OwnedRecordsRule),
        Box::new(statement::UnknownTableRule),
        Box::new(statement::StatementShapeRule),
    ]
}

/// Whether some reference selected by `guarded` is not scoped to the
/// requester, in any block of any statement.
///
/// Tables named outside a query block (`DESCRIBE t`, `TABLE t`) have no
/// WHERE clause and are never scoped.
pub(crate) fn has_unscoped_ref(
    query: &CandidateQuery,
    schema: &PolicySchema,
    requester: &Requester,
    guarded: impl Fn(&TableRef) -> bool,
) -> bool {
    query.statements().iter().any(|statement| {
        statement.loose_tables.iter().any(&guarded)
            || statement.blocks.iter().any(|block| {
                BlockScope::new(block, schema)
                    .unscoped(requester.id())
                    .into_iter()
                    .any(&guarded)
            })
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn default_schema() -> PolicySchema {
        PolicySchema::from_config(&GateConfig::default()).expect("default schema is valid")
    }

    pub fn run_rule(rule: &dyn Rule, requester: &Requester, sql: &str) -> Option<DenyReason> {
        run_rule_with(rule, requester, sql, &GateConfig::default())
    }

    pub fn run_rule_with(
        rule: &dyn Rule,
        requester: &Requester,
        sql: &str,
        config: &GateConfig,
    ) -> Option<DenyReason> {
        let schema = PolicySchema::from_config(config).expect("schema is valid");
        let query = CandidateQuery::parse(sql);
        if !rule.applies_to(requester, config) {
            return None;
        }
        rule.evaluate(requester, &query, &schema, config)
    }

    pub fn student(id: u64) -> Requester {
        Requester::student(id).expect("valid id")
    }

    pub fn teacher(id: u64) -> Requester {
        Requester::teacher(id).expect("valid id")
    }
}
