//! Core type definitions for the query gate.
//!
//! These types form the contract between Rust and the Python chat service
//! via PyO3:
//!
//! - [`Role`] and [`Requester`] identify who is asking
//! - [`Verdict`] is the gate's decision for one candidate query
//! - [`DenyReason`] carries the user-facing denial message
//! - [`GuardOutcome`] is what the caller receives and acts on

use std::fmt;
use std::str::FromStr;

use pyo3::prelude::*;
use serde::{Deserialize, Serialize};

/// The role of an authenticated requester.
///
/// Python values are lowercase strings: `"student"`, `"teacher"`.
#[pyclass(eq, eq_int)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A student; may only see their own rows.
    Student,
    /// A teacher; unrestricted under the current policy.
    Teacher,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Student => write!(f, "student"),
            Self::Teacher => write!(f, "teacher"),
        }
    }
}

impl FromStr for Role {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "teacher" => Ok(Self::Teacher),
            _ => Err(GateError::UnknownRole(s.to_owned())),
        }
    }
}

/// An already-authenticated requester. Immutable per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Requester {
    role: Role,
    id: u64,
}

impl Requester {
    /// Build a requester.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidRequesterId`] when `id` is zero.
    pub fn new(role: Role, id: u64) -> Result<Self, GateError> {
        if id == 0 {
            return Err(GateError::InvalidRequesterId(id));
        }
        Ok(Self { role, id })
    }

    /// Shorthand for a student requester.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidRequesterId`] when `id` is zero.
    pub fn student(id: u64) -> Result<Self, GateError> {
        Self::new(Role::Student, id)
    }

    /// Shorthand for a teacher requester.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidRequesterId`] when `id` is zero.
    pub fn teacher(id: u64) -> Result<Self, GateError> {
        Self::new(Role::Teacher, id)
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn is_student(&self) -> bool {
        self.role == Role::Student
    }
}

impl fmt::Display for Requester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.role, self.id)
    }
}

/// Why a query was denied.
///
/// The `Display` text is shown to the end user in place of data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DenyReason {
    /// The query touches the teachers identity table.
    TeacherData,
    /// The query reads the students identity table without a self filter.
    OtherStudentInformation,
    /// The query reads an owned table without a self filter on the owner key.
    OtherStudentRecords,
    /// The query reads a table the policy schema does not classify.
    UnknownTable(String),
    /// The statement is not a read-only query.
    NotReadOnly(String),
    /// More than one statement was submitted.
    MultipleStatements,
    /// Nothing to run.
    EmptyQuery,
    /// The text carries a `/*! ... */` or `/*+ ... */` comment.
    ExecutableComment,
    /// A policy rule panicked; the query is refused rather than run.
    Internal(String),
}

impl DenyReason {
    /// Stable identifier of the rule family that produced this denial.
    #[must_use]
    pub fn rule_id(&self) -> &'static str {
        match self {
            Self::TeacherData => "teacher_data",
            Self::OtherStudentInformation => "student_identity",
            Self::OtherStudentRecords => "owned_records",
            Self::UnknownTable(_) => "unknown_table",
            Self::NotReadOnly(_)
            | Self::MultipleStatements
            | Self::EmptyQuery
            | Self::ExecutableComment => "statement_shape",
            Self::Internal(_) => "internal",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TeacherData => write!(f, "students cannot view teacher data"),
            Self::OtherStudentInformation => {
                write!(f, "students cannot view other students' information")
            }
            Self::OtherStudentRecords => write!(f, "students cannot view other students' records"),
            Self::UnknownTable(table) => write!(f, "students cannot query table '{table}'"),
            Self::NotReadOnly(_) => write!(f, "students may only run read-only queries"),
            Self::MultipleStatements => write!(f, "only one SQL statement may be run at a time"),
            Self::EmptyQuery => write!(f, "no SQL statement to run"),
            Self::ExecutableComment => {
                write!(f, "queries may not contain executable comments or optimizer hints")
            }
            Self::Internal(_) => write!(f, "the query could not be checked and was not run"),
        }
    }
}

/// The gate's decision. Exactly one per invocation, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Run this SQL unchanged.
    Allow(String),
    /// Do not run anything.
    Deny(DenyReason),
    /// Run this SQL, which the gate rewrote to scope it to the requester.
    Rewrite(String),
}

impl Verdict {
    #[must_use]
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny(_))
    }

    /// The SQL the caller may execute, if any.
    #[must_use]
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Allow(sql) | Self::Rewrite(sql) => Some(sql),
            Self::Deny(_) => None,
        }
    }
}

/// Whether the caller may execute the returned SQL.
#[pyclass(eq, eq_int)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardStatus {
    Allowed,
    Denied,
}

impl fmt::Display for GuardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allowed => write!(f, "allowed"),
            Self::Denied => write!(f, "denied"),
        }
    }
}

/// What the gate hands back to the chat orchestration layer.
///
/// On denial `sql` is always `None`, so the denied text cannot be executed
/// by accident.
#[pyclass(get_all)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardOutcome {
    /// `allowed` or `denied`.
    pub status: GuardStatus,

    /// The SQL to execute (possibly rewritten); `None` when denied.
    pub sql: Option<String>,

    /// User-facing denial message; `None` when allowed.
    pub message: Option<String>,

    /// Whether `sql` differs from what the caller submitted.
    pub rewritten: bool,

    /// Tables the query references, sorted.
    pub tables: Vec<String>,

    /// Rule family that denied the query, if any.
    pub rule: Option<String>,
}

impl GuardOutcome {
    /// Build the outcome for a verdict.
    #[must_use]
    pub fn from_verdict(verdict: &Verdict, tables: Vec<String>) -> Self {
        match verdict {
            Verdict::Allow(sql) => Self {
                status: GuardStatus::Allowed,
                sql: Some(sql.clone()),
                message: None,
                rewritten: false,
                tables,
                rule: None,
            },
            Verdict::Rewrite(sql) => Self {
                status: GuardStatus::Allowed,
                sql: Some(sql.clone()),
                message: None,
                rewritten: true,
                tables,
                rule: None,
            },
            Verdict::Deny(reason) => Self {
                status: GuardStatus::Denied,
                sql: None,
                message: Some(format!("Access denied: {reason}.")),
                rewritten: false,
                tables,
                rule: Some(reason.rule_id().to_owned()),
            },
        }
    }

    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.status == GuardStatus::Allowed
    }
}

#[pymethods]
impl GuardOutcome {
    /// Serialize the outcome to JSON for the HTTP response layer.
    ///
    /// # Errors
    ///
    /// Returns a `PyErr` if serialization fails (should not happen for valid data).
    fn to_json(&self) -> PyResult<String> {
        serde_json::to_string(self).map_err(|e| {
            pyo3::exceptions::PyValueError::new_err(format!("JSON serialization failed: {e}"))
        })
    }

    /// Python truthiness: an outcome is truthy when the query may run.
    fn __bool__(&self) -> bool {
        self.is_allowed()
    }

    /// Return a human-readable string representation.
    fn __repr__(&self) -> String {
        format!(
            "GuardOutcome(status={}, rewritten={}, tables={:?}, rule={:?})",
            self.status, self.rewritten, self.tables, self.rule,
        )
    }
}

/// Errors raised at the gate's construction boundary.
///
/// Policy violations are never errors; they are [`Verdict::Deny`].
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Requester ids are positive integers.
    #[error("requester id must be a positive integer, got {0}")]
    InvalidRequesterId(u64),

    /// Role string not recognized.
    #[error("unknown requester role '{0}'")]
    UnknownRole(String),

    /// The policy schema failed validation.
    #[error(transparent)]
    Schema(#[from] crate::schema::SchemaError),

    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// A thread panicked while holding the schema lock.
    #[error("policy schema lock poisoned")]
    LockPoisoned,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
