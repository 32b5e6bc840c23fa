//! Access policy: run the rule registry over an analyzed query.
//!
//! Every rule dispatch is wrapped in `catch_unwind`, so a panic inside a
//! rule denies the query with [`DenyReason::Internal`] instead of letting
//! it through or unwinding into the Python process.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::config::GateConfig;
use crate::query::CandidateQuery;
use crate::rules::{build_rule_registry, Rule};
use crate::schema::PolicySchema;
use crate::types::{DenyReason, Requester, Verdict};

/// Decide with the default rule registry. Pure and idempotent.
#[must_use]
pub fn decide(
    requester: &Requester,
    query: &CandidateQuery,
    schema: &PolicySchema,
    config: &GateConfig,
) -> Verdict {
    decide_with(&build_rule_registry(), requester, query, schema, config)
}

/// Run `rules` in order; the first denial wins, otherwise the query is
/// allowed unchanged.
#[must_use]
pub fn decide_with(
    rules: &[Box<dyn Rule>],
    requester: &Requester,
    query: &CandidateQuery,
    schema: &PolicySchema,
    config: &GateConfig,
) -> Verdict {
    for rule in rules {
        if !rule.applies_to(requester, config) {
            continue;
        }
        let outcome = contained(rule.name(), || {
            rule.evaluate(requester, query, schema, config)
        });
        match outcome {
            Ok(None) => {}
            Ok(Some(reason)) | Err(reason) => {
                log::debug!("rule '{}' denied query for {requester}: {reason}", rule.name());
                return Verdict::Deny(reason);
            }
        }
    }
    Verdict::Allow(query.raw_text().to_owned())
}

/// Run `stage`, turning a panic into [`DenyReason::Internal`].
pub(crate) fn contained<T>(stage: &str, f: impl FnOnce() -> T) -> Result<T, DenyReason> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|panic_info| {
        let panic_msg = if let Some(s) = panic_info.downcast_ref::<String>() {
            s.clone()
        } else if let Some(s) = panic_info.downcast_ref::<&str>() {
            (*s).to_owned()
        } else {
            "unknown panic".to_owned()
        };
        log::error!("internal error in '{stage}': {panic_msg}");
        DenyReason::Internal(format!("{stage}: {panic_msg}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReadOnlyScope;
    use crate::rules::test_support::{default_schema, student, teacher};

    fn verdict(requester: &Requester, sql: &str) -> Verdict {
        decide(
            requester,
            &CandidateQuery::parse(sql),
            &default_schema(),
            &GateConfig::default(),
        )
    }

    fn denied_for(id: u64, sql: &str) -> Option<DenyReason> {
        match verdict(&student(id), sql) {
            Verdict::Deny(reason) => Some(reason),
            _ => None,
        }
    }

    #[test]
    fn test_teacher_table_always_denied_for_students() {
        assert_eq!(
            denied_for(7, "SELECT * FROM teachers WHERE id = 7"),
            Some(DenyReason::TeacherData)
        );
        // Teacher rule runs before the owned-records rule.
        assert_eq!(
            denied_for(7, "SELECT * FROM attendance a JOIN teachers t ON t.id = a.teacher_id"),
            Some(DenyReason::TeacherData)
        );
    }

    #[test]
    fn test_students_table_self_filter_forms() {
        for sql in [
            "SELECT * FROM students WHERE students.id = 7",
            "SELECT * FROM students WHERE students.id=7",
            "SELECT * FROM students WHERE 7 = students.id",
            "SELECT * FROM students s WHERE s.id = 7",
        ] {
            assert_eq!(verdict(&student(7), sql), Verdict::Allow(sql.to_owned()), "{sql}");
        }
        assert_eq!(
            denied_for(7, "SELECT * FROM students WHERE students.id = 8"),
            Some(DenyReason::OtherStudentInformation)
        );
    }

    #[test]
    fn test_owned_tables_need_own_id() {
        assert_eq!(
            denied_for(7, "SELECT * FROM fee_payments WHERE student_id = 8"),
            Some(DenyReason::OtherStudentRecords)
        );
        assert_eq!(
            denied_for(42, "SELECT * FROM attendance WHERE 1=1 OR student_id=42"),
            Some(DenyReason::OtherStudentRecords)
        );
        assert_eq!(denied_for(42, "SELECT * FROM attendance WHERE student_id =     42"), None);
    }

    #[test]
    fn test_fail_closed_extras_run_after_record_rules() {
        assert_eq!(
            denied_for(3, "SELECT * FROM salaries"),
            Some(DenyReason::UnknownTable("salaries".to_owned()))
        );
        assert_eq!(
            denied_for(3, "SELECT * FROM attendance WHERE student_id = 3; DROP TABLE x"),
            Some(DenyReason::UnknownTable("x".to_owned()))
        );
        assert_eq!(
            denied_for(3, "SELECT 1; SELECT 2"),
            Some(DenyReason::MultipleStatements)
        );
        assert_eq!(denied_for(3, ""), Some(DenyReason::EmptyQuery));
    }

    #[test]
    fn test_teachers_are_unrestricted_by_default() {
        for sql in [
            "SELECT * FROM teachers",
            "SELECT * FROM students",
            "SELECT * FROM attendance",
            "SELECT * FROM salaries",
        ] {
            assert_eq!(verdict(&teacher(1), sql), Verdict::Allow(sql.to_owned()));
        }
    }

    #[test]
    fn test_read_only_all_restricts_teachers() {
        let config = GateConfig {
            read_only: ReadOnlyScope::All,
            ..GateConfig::default()
        };
        let v = decide(
            &teacher(1),
            &CandidateQuery::parse("DELETE FROM attendance"),
            &default_schema(),
            &config,
        );
        assert_eq!(v, Verdict::Deny(DenyReason::NotReadOnly("DELETE".to_owned())));
    }

    #[test]
    fn test_decide_is_idempotent() {
        let query = CandidateQuery::parse("SELECT * FROM students s WHERE s.id = 7");
        let schema = default_schema();
        let config = GateConfig::default();
        let first = decide(&student(7), &query, &schema, &config);
        let second = decide(&student(7), &query, &schema, &config);
        assert_eq!(first, second);
    }

    struct PanickingRule;

    impl Rule for PanickingRule {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn evaluate(
            &self,
            _requester: &Requester,
            _query: &CandidateQuery,
            _schema: &PolicySchema,
            _config: &GateConfig,
        ) -> Option<DenyReason> {
            panic!("rule exploded")
        }
    }

    #[test]
    fn test_panicking_rule_denies() {
        let rules: Vec<Box<dyn Rule>> = vec![Box::new(PanickingRule)];
        let v = decide_with(
            &rules,
            &student(1),
            &CandidateQuery::parse("SELECT 1"),
            &default_schema(),
            &GateConfig::default(),
        );
        match v {
            Verdict::Deny(DenyReason::Internal(msg)) => assert!(msg.contains("rule exploded")),
            other => panic!("expected internal denial, got {other:?}"),
        }
    }
}
