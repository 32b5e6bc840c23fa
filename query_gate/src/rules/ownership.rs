//! Rule for tables whose rows belong to one student.

use crate::config::GateConfig;
use crate::query::CandidateQuery;
use crate::rules::{has_unscoped_ref, Rule};
use crate::schema::PolicySchema;
use crate::types::{DenyReason, Requester};

/// Denies reading an owned table unless every reference is scoped by the
/// owner key to the requester's id.
pub struct OwnedRecordsRule;

impl Rule for OwnedRecordsRule {
    fn name(&self) -> &'static str {
        "owned_records"
    }

    fn evaluate(
        &self,
        requester: &Requester,
        query: &CandidateQuery,
        schema: &PolicySchema,
        _config: &GateConfig,
    ) -> Option<DenyReason> {
        if !query.extracted_tables().iter().any(|t| schema.is_owned(t)) {
            return None;
        }
        has_unscoped_ref(query, schema, requester, |r| schema.is_owned(&r.name))
            .then_some(DenyReason::OtherStudentRecords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::{run_rule, student, teacher};

    fn owned(sql: &str) -> Option<DenyReason> {
        run_rule(&OwnedRecordsRule, &student(42), sql)
    }

    #[test]
    fn test_scoped_owned_reads_pass() {
        for sql in [
            "SELECT * FROM attendance WHERE student_id = 42",
            "SELECT * FROM attendance WHERE student_id =     42",
            "SELECT * FROM fee_payments WHERE 42 = student_id AND paid = 0",
            "SELECT * FROM academic_marks m WHERE m.student_id = 42 ORDER BY term",
            "SELECT * FROM attendance a JOIN fee_payments f ON f.student_id = a.student_id \
             WHERE a.student_id = 42",
            "SELECT * FROM medical_info WHERE (student_id = 42)",
        ] {
            assert_eq!(owned(sql), None, "{sql}");
        }
    }

    #[test]
    fn test_unscoped_owned_reads_deny() {
        for sql in [
            "SELECT * FROM attendance",
            "SELECT * FROM fee_payments WHERE student_id = 8",
            "SELECT * FROM attendance WHERE 1=1 OR student_id=42",
            "SELECT * FROM attendance WHERE student_id > 0",
            "SELECT * FROM attendance a JOIN fee_payments f ON f.day = a.day \
             WHERE a.student_id = 42",
            "SELECT * FROM hostel_transport WHERE student_id IN (42, 43)",
        ] {
            assert_eq!(owned(sql), Some(DenyReason::OtherStudentRecords), "{sql}");
        }
    }

    #[test]
    fn test_rule_is_student_only() {
        let rule = OwnedRecordsRule;
        assert!(!rule.applies_to(&teacher(1), &GateConfig::default()));
        assert_eq!(run_rule(&rule, &teacher(1), "SELECT * FROM attendance"), None);
    }

    #[test]
    fn test_other_students_id_denied() {
        assert_eq!(
            run_rule(&OwnedRecordsRule, &student(7), "SELECT * FROM fee_payments WHERE student_id = 8"),
            Some(DenyReason::OtherStudentRecords)
        );
    }
}
