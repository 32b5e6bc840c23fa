//! Fail-closed rules about what a statement is, rather than which rows it
//! reads: unclassified tables, and input that is empty, multi-statement,
//! not read-only, or carries executable comments.

use crate::config::{GateConfig, UnknownTablePolicy};
use crate::query::CandidateQuery;
use crate::rules::Rule;
use crate::schema::{PolicySchema, TableClass};
use crate::types::{DenyReason, Requester};

/// Denies tables the policy schema does not classify, unless configured
/// to allow them. CTE names are not tables.
pub struct UnknownTableRule;

impl Rule for UnknownTableRule {
    fn name(&self) -> &'static str {
        "unknown_table"
    }

    fn evaluate(
        &self,
        _requester: &Requester,
        query: &CandidateQuery,
        schema: &PolicySchema,
        config: &GateConfig,
    ) -> Option<DenyReason> {
        if config.unknown_tables == UnknownTablePolicy::Allow {
            return None;
        }
        let ctes: Vec<&String> = query.cte_names().collect();
        query
            .extracted_tables()
            .iter()
            .find(|t| {
                matches!(schema.classify(t), TableClass::Unclassified) && !ctes.contains(t)
            })
            .map(|t| DenyReason::UnknownTable(t.clone()))
    }
}

/// Denies executable comments, empty input, more than one statement, and
/// statements that do more than read when the requester's role is held to
/// read-only.
pub struct StatementShapeRule;

impl Rule for StatementShapeRule {
    fn name(&self) -> &'static str {
        "statement_shape"
    }

    fn applies_to(&self, requester: &Requester, config: &GateConfig) -> bool {
        requester.is_student() || config.read_only.covers(requester.role())
    }

    fn evaluate(
        &self,
        requester: &Requester,
        query: &CandidateQuery,
        _schema: &PolicySchema,
        config: &GateConfig,
    ) -> Option<DenyReason> {
        if query.has_executable_comment() {
            return Some(DenyReason::ExecutableComment);
        }
        let statements = query.statements();
        match statements {
            [] => Some(DenyReason::EmptyQuery),
            [statement] if config.read_only.covers(requester.role()) => statement
                .write_keyword()
                .map(|kw| DenyReason::NotReadOnly(kw.to_owned())),
            [_] => None,
            _ => Some(DenyReason::MultipleStatements),
        }
    }
}
