//! Rules for identity tables (one row per person).
//!
//! A student may never read an identity table of another role, and may
//! read the students table only through their own row.

use crate::config::GateConfig;
use crate::query::CandidateQuery;
use crate::rules::{has_unscoped_ref, Rule};
use crate::schema::{PolicySchema, TableClass};
use crate::types::{DenyReason, Requester};

/// Denies any reference to an identity table of a different role
/// (for students: the teachers table).
pub struct OtherRoleIdentityRule;

impl Rule for OtherRoleIdentityRule {
    fn name(&self) -> &'static str {
        "teacher_data"
    }

    fn evaluate(
        &self,
        requester: &Requester,
        query: &CandidateQuery,
        schema: &PolicySchema,
        _config: &GateConfig,
    ) -> Option<DenyReason> {
        let hit = query.extracted_tables().iter().find(|table| {
            matches!(
                schema.classify(table),
                TableClass::Identity(identity) if identity.role != requester.role()
            )
        })?;
        log::debug!("{requester} referenced identity table '{hit}'");
        Some(DenyReason::TeacherData)
    }
}

/// Denies reading the requester's own identity table without a self filter
/// on every reference.
pub struct OwnIdentityRule;

impl Rule for OwnIdentityRule {
    fn name(&self) -> &'static str {
        "student_identity"
    }

    fn evaluate(
        &self,
        requester: &Requester,
        query: &CandidateQuery,
        schema: &PolicySchema,
        _config: &GateConfig,
    ) -> Option<DenyReason> {
        let own_identity = |name: &str| {
            matches!(
                schema.classify(name),
                TableClass::Identity(identity) if identity.role == requester.role()
            )
        };
        if !query.extracted_tables().iter().any(|t| own_identity(t)) {
            return None;
        }
        has_unscoped_ref(query, schema, requester, |r| own_identity(&r.name))
            .then_some(DenyReason::OtherStudentInformation)
    }
}
