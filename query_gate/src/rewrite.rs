//! Rewrite stage: scope an unfiltered student query to the student's rows.
//!
//! Only the simplest shape is rewritten: one statement, one top-level
//! SELECT block that reads an owned table, no identity tables, and no
//! mention of the owner-key column anywhere. Everything else is left for
//! the policy rules to judge as written.

use crate::query::{BlockKind, CandidateQuery, QueryBlock};
use crate::schema::PolicySchema;
use crate::types::Requester;

/// Return `query` with `owner_key = <id>` added to its top-level block, or
/// `None` when the query is not eligible.
///
/// An existing WHERE predicate is parenthesized before the filter is ANDed
/// on, so `WHERE a OR b` becomes `WHERE (a OR b) AND student_id = 42`.
/// Without a WHERE clause one is inserted ahead of any GROUP BY / HAVING /
/// ORDER BY / LIMIT tail. In a multi-table block the column is qualified
/// with the first owned table's alias or name.
#[must_use]
pub fn scope_to_requester(
    requester: &Requester,
    query: &CandidateQuery,
    schema: &PolicySchema,
) -> Option<String> {
    if !requester.is_student() {
        return None;
    }
    let owner_key = schema.owner_key();
    if query.mentions_identifier(owner_key)
        || query.extracted_tables().iter().any(|t| schema.is_identity(t))
    {
        return None;
    }

    let block = sole_top_level_block(query)?;
    if block.kind != BlockKind::Select || block.where_dangling {
        return None;
    }
    let owned = block.tables.iter().find(|r| schema.is_owned(&r.name))?;

    let column = if block.tables.len() > 1 {
        format!("{}.{owner_key}", owned.qualifier_text)
    } else {
        owner_key.to_owned()
    };
    let condition = format!("{column} = {}", requester.id());
    let raw = query.raw_text();

    let rewritten = match &block.where_span {
        Some(span) => format!(
            "{}({}) AND {condition}{}",
            &raw[..span.start],
            &raw[span.clone()],
            &raw[span.end..]
        ),
        None => format!(
            "{} WHERE {condition}{}",
            &raw[..block.insert_at],
            &raw[block.insert_at..]
        ),
    };
    log::debug!("scoped query for {requester} on '{}'", owned.name);
    Some(rewritten)
}

fn sole_top_level_block(query: &CandidateQuery) -> Option<&QueryBlock> {
    let [statement] = query.statements() else {
        return None;
    };
    let mut top = statement.top_level_blocks();
    match (top.next(), top.next()) {
        (Some(block), None) => Some(block),
        _ => None,
    }
}
