//! PyO3 bindings exposing the query gate to Python.
//!
//! The Python module is importable as:
//! ```python
//! from school_query_gate import QueryGate, GuardOutcome, quick_guard, extract_tables
//! ```
//!
//! `QueryGate`, `GuardOutcome`, `GuardStatus` and `Role` are registered as
//! PyO3 classes.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::config::GateConfig;
use crate::gate::QueryGate as RustQueryGate;
use crate::query::extract_tables as extract_table_names;
use crate::types::{GateError, GuardOutcome, GuardStatus, Requester, Role};

/// Python-facing QueryGate wrapper.
///
/// Usage from Python:
/// ```python
/// from school_query_gate import QueryGate
/// gate = QueryGate()                      # built-in school schema
/// outcome = gate.guard("student", 42, "SELECT * FROM attendance")
/// if outcome:
///     rows = db.execute(outcome.sql)
/// else:
///     reply(outcome.message)
/// ```
#[pyclass(name = "QueryGate")]
pub struct PyQueryGate {
    inner: RustQueryGate,
}

#[pymethods]
impl PyQueryGate {
    /// Create a gate, reading `query_gate.toml` / `pyproject.toml` /
    /// `query_gate.yaml` from `config_dir` when given.
    #[new]
    #[pyo3(signature = (config_dir=None))]
    fn new(config_dir: Option<&str>) -> PyResult<Self> {
        let inner = match config_dir {
            Some(dir) => {
                let root = Path::new(dir);
                if !root.is_dir() {
                    return Err(PyValueError::new_err(format!(
                        "Path '{dir}' is not a directory"
                    )));
                }
                RustQueryGate::from_dir(root)
            }
            None => RustQueryGate::new(GateConfig::default()),
        }
        .map_err(to_py_err)?;
        Ok(Self { inner })
    }

    /// Guard one query.
    ///
    /// # Arguments
    ///
    /// * `role`: `"student"` or `"teacher"`.
    /// * `requester_id`: The requester's id (positive).
    /// * `sql`: The generated SQL.
    ///
    /// # Returns
    ///
    /// A `GuardOutcome`; truthy when `outcome.sql` may be executed.
    fn guard(
        &self,
        py: Python<'_>,
        role: &str,
        requester_id: u64,
        sql: &str,
    ) -> PyResult<GuardOutcome> {
        let requester = parse_requester(role, requester_id)?;
        Ok(py.allow_threads(|| self.inner.guard(&requester, sql)))
    }

    /// Reclassify tables from a `{table: [columns]}` map (the output of
    /// `DESCRIBE` per table). Returns the new schema version.
    fn refresh_from_columns(&self, columns: HashMap<String, Vec<String>>) -> PyResult<u64> {
        let columns: BTreeMap<String, Vec<String>> = columns.into_iter().collect();
        self.inner.refresh_from_columns(&columns).map_err(to_py_err)
    }

    /// Version of the schema currently in force.
    #[getter]
    fn schema_version(&self) -> PyResult<u64> {
        self.inner.schema_version().map_err(to_py_err)
    }

    /// Return a human-readable string representation.
    fn __repr__(&self) -> String {
        match self.inner.schema_version() {
            Ok(version) => format!("QueryGate(schema_version={version})"),
            Err(_) => "QueryGate(...)".to_owned(),
        }
    }
}

/// One-shot guard with the built-in schema.
///
/// Equivalent to `QueryGate().guard(role, requester_id, sql)`.
///
/// # Errors
///
/// Returns a `PyErr` if the role is unknown or the id is zero.
#[pyfunction]
pub fn quick_guard(role: &str, requester_id: u64, sql: &str) -> PyResult<GuardOutcome> {
    let requester = parse_requester(role, requester_id)?;
    let gate = RustQueryGate::new(GateConfig::default()).map_err(to_py_err)?;
    Ok(gate.guard(&requester, sql))
}

/// Lowercased names of every table in a FROM / JOIN position of `sql`,
/// sorted.
#[pyfunction]
#[pyo3(name = "extract_tables")]
pub fn py_extract_tables(sql: &str) -> Vec<String> {
    extract_table_names(sql).into_iter().collect()
}

fn parse_requester(role: &str, requester_id: u64) -> PyResult<Requester> {
    let role: Role = role.parse().map_err(to_py_err)?;
    Requester::new(role, requester_id).map_err(to_py_err)
}

fn to_py_err(err: GateError) -> PyErr {
    match err {
        GateError::LockPoisoned => PyRuntimeError::new_err(err.to_string()),
        other => PyValueError::new_err(other.to_string()),
    }
}

/// Register all PyO3 classes and functions into the Python module.
///
/// This is called from `lib.rs` to populate the module.
pub fn register_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyQueryGate>()?;
    m.add_class::<GuardOutcome>()?;
    m.add_class::<GuardStatus>()?;
    m.add_class::<Role>()?;
    m.add_function(wrap_pyfunction!(quick_guard, m)?)?;
    m.add_function(wrap_pyfunction!(py_extract_tables, m)?)?;
    Ok(())
}
