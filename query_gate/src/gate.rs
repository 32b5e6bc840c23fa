//! Gate orchestrator: the main entry point for guarding a query.
//!
//! For each submitted query the gate reads the current schema snapshot,
//! analyzes the SQL, runs the rewrite stage for students, decides on the
//! (possibly rewritten) text, and emits an audit record. Verdicts are
//! computed fresh on every call and never cached.
//!
//! Analysis, rewrite and every rule dispatch run inside `catch_unwind`; an
//! internal panic denies the query with an `internal` rule id.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::audit::AuditRecord;
use crate::config::GateConfig;
use crate::policy::{contained, decide_with};
use crate::query::CandidateQuery;
use crate::rewrite::scope_to_requester;
use crate::rules::{build_rule_registry, Rule};
use crate::schema::{PolicySchema, PolicySnapshot, SchemaHandle};
use crate::types::{DenyReason, GateError, GuardOutcome, Requester, Verdict};

/// The query safety gate.
///
/// Cheap to share across threads: the rule registry is immutable and the
/// schema lives behind a [`SchemaHandle`].
pub struct QueryGate {
    /// The gate configuration.
    config: GateConfig,
    /// Current policy schema.
    schema: SchemaHandle,
    /// All registered rules, in evaluation order.
    rules: Vec<Box<dyn Rule>>,
}

impl QueryGate {
    /// Create a gate whose schema comes from the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Schema`] if the configured schema is invalid.
    pub fn new(config: GateConfig) -> Result<Self, GateError> {
        let schema = PolicySchema::from_config(&config)?;
        Ok(Self::with_schema(config, schema))
    }

    /// Create a gate from the configuration file found in `root`, or the
    /// built-in defaults when there is none.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Config`] if a config file is unreadable or
    /// malformed, or [`GateError::Schema`] if it describes an invalid schema.
    pub fn from_dir(root: &Path) -> Result<Self, GateError> {
        let config = GateConfig::load_from_dir(root)?;
        Self::new(config)
    }

    /// Create a gate with an explicit schema (for example one classified
    /// from introspected columns).
    #[must_use]
    pub fn with_schema(config: GateConfig, schema: PolicySchema) -> Self {
        log::debug!(
            "query gate ready (config {}, {} owned tables)",
            &config.fingerprint()[..12],
            schema.owned_tables().count()
        );
        Self {
            config,
            schema: SchemaHandle::new(schema),
            rules: build_rule_registry(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Handle to the live schema; clones share the same snapshot pointer.
    #[must_use]
    pub fn schema_handle(&self) -> &SchemaHandle {
        &self.schema
    }

    /// Version of the schema snapshot in force.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::LockPoisoned`] if the schema lock is poisoned.
    pub fn schema_version(&self) -> Result<u64, GateError> {
        Ok(self.schema.current()?.version)
    }

    /// Reclassify tables from an introspected `{table: [columns]}` map and
    /// publish the result. Returns the new schema version.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Schema`] if the classification is invalid, or
    /// [`GateError::LockPoisoned`] if the schema lock is poisoned. The
    /// previous schema stays in force on error.
    pub fn refresh_from_columns(
        &self,
        columns: &BTreeMap<String, Vec<String>>,
    ) -> Result<u64, GateError> {
        let schema = PolicySchema::from_columns(columns, &self.config)?;
        self.schema.refresh(schema)
    }

    /// Guard one query for one requester.
    ///
    /// Never fails: anything that prevents a decision denies the query.
    #[must_use]
    pub fn guard(&self, requester: &Requester, sql: &str) -> GuardOutcome {
        let snapshot = match self.schema.current() {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                log::error!("cannot read policy schema: {e}");
                None
            }
        };

        let (verdict, query) = match &snapshot {
            Some(snap) => self.guard_verdict(requester, sql, &snap.schema),
            None => (
                Verdict::Deny(DenyReason::Internal("policy schema unavailable".to_owned())),
                None,
            ),
        };
        let tables = query
            .map(|q| q.extracted_tables().iter().cloned().collect())
            .unwrap_or_default();
        let outcome = GuardOutcome::from_verdict(&verdict, tables);

        if self.config.audit {
            AuditRecord::new(requester, sql, &outcome, snapshot.as_deref()).emit();
        }
        outcome
    }

    /// Compute the verdict against a given schema, returning the analyzed
    /// query it was reached on (absent if analysis itself failed).
    #[must_use]
    pub fn guard_verdict(
        &self,
        requester: &Requester,
        sql: &str,
        schema: &PolicySchema,
    ) -> (Verdict, Option<CandidateQuery>) {
        let original = match contained("analysis", || CandidateQuery::parse(sql)) {
            Ok(query) => query,
            Err(reason) => return (Verdict::Deny(reason), None),
        };

        if requester.is_student() {
            match contained("rewrite", || scope_to_requester(requester, &original, schema)) {
                Err(reason) => return (Verdict::Deny(reason), Some(original)),
                Ok(Some(scoped_sql)) => {
                    let scoped = match contained("analysis", || CandidateQuery::parse(&scoped_sql)) {
                        Ok(query) => query,
                        Err(reason) => return (Verdict::Deny(reason), Some(original)),
                    };
                    let verdict = match self.decide(requester, &scoped, schema) {
                        Verdict::Allow(text) => Verdict::Rewrite(text),
                        other => other,
                    };
                    return (verdict, Some(scoped));
                }
                Ok(None) => {}
            }
        }

        let verdict = self.decide(requester, &original, schema);
        (verdict, Some(original))
    }

    fn decide(&self, requester: &Requester, query: &CandidateQuery, schema: &PolicySchema) -> Verdict {
        decide_with(&self.rules, requester, query, schema, &self.config)
    }

    /// The snapshot a guard call started now would use.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::LockPoisoned`] if the schema lock is poisoned.
    pub fn snapshot(&self) -> Result<Arc<PolicySnapshot>, GateError> {
        self.schema.current()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
