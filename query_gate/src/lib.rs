//! School Query Gate: access control for LLM-generated SQL over school records.
//!
//! Sits between a text-to-SQL step and the database. Each generated query is
//! either approved (possibly after being scoped to the student's own rows)
//! or denied with a message for the user.
//!
//! This crate provides the `school_query_gate` Python module via PyO3:
//! ```python
//! from school_query_gate import QueryGate, quick_guard, extract_tables
//! ```

// PyO3-generated code triggers this lint on PyResult return types.
#![allow(clippy::useless_conversion)]

pub mod audit;
pub mod config;
pub mod gate;
pub mod policy;
pub mod predicate;
pub mod pyo3_bindings;
pub mod query;
pub mod rewrite;
pub mod rules;
pub mod schema;
pub mod scope;
pub mod sql_lexer;
pub mod types;

use pyo3::prelude::*;

/// The Python module exposed by this crate.
///
/// Importable as: `from school_query_gate import QueryGate`
#[pymodule]
fn school_query_gate(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Route `log` records to Python's logging module.
    pyo3_log::init();

    pyo3_bindings::register_module(m)?;

    Ok(())
}
