//! Policy schema: which tables hold people and which tables hold records
//! owned by a student.
//!
//! The schema is process-wide, read-only configuration. It is built once at
//! startup (from [`GateConfig`] or from an introspected `{table: [columns]}`
//! map) and published through a [`SchemaHandle`]. A refresh swaps in a new
//! [`PolicySnapshot`]; decisions already running keep the snapshot they
//! started with.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock, RwLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use crate::config::GateConfig;
use crate::types::{GateError, Role};

/// Table and column names the schema accepts: plain lowercase identifiers.
fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_$]*$").expect("name pattern regex is valid"))
}

/// A table with one row per person, keyed by that person's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityTable {
    pub name: String,
    pub role: Role,
    pub key: String,
}

/// How the schema classifies a table name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableClass<'a> {
    Identity(&'a IdentityTable),
    Owned,
    Unclassified,
}

/// Validated identity/owned classification.
///
/// Invariant: identity and owned tables are disjoint, every name is a plain
/// lowercase identifier, and at least one identity table holds students.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicySchema {
    owner_key: String,
    identity: BTreeMap<String, IdentityTable>,
    owned: BTreeSet<String>,
}

impl PolicySchema {
    /// Build and validate a schema.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] if a name is not a plain identifier, a table
    /// is both identity and owned, or no identity table holds students.
    pub fn new(
        owner_key: &str,
        identity: impl IntoIterator<Item = IdentityTable>,
        owned: impl IntoIterator<Item = String>,
    ) -> Result<Self, SchemaError> {
        let owner_key = normalize(owner_key)?;

        let mut identity_tables = BTreeMap::new();
        for table in identity {
            let name = normalize(&table.name)?;
            let key = normalize(&table.key)?;
            identity_tables.insert(
                name.clone(),
                IdentityTable {
                    name,
                    role: table.role,
                    key,
                },
            );
        }

        let mut owned_tables = BTreeSet::new();
        for table in owned {
            let name = normalize(&table)?;
            if identity_tables.contains_key(&name) {
                return Err(SchemaError::Overlap(name));
            }
            owned_tables.insert(name);
        }

        if !identity_tables.values().any(|t| t.role == Role::Student) {
            return Err(SchemaError::MissingStudentIdentity);
        }

        Ok(Self {
            owner_key,
            identity: identity_tables,
            owned: owned_tables,
        })
    }

    /// Build the schema a [`GateConfig`] describes.
    ///
    /// # Errors
    ///
    /// See [`PolicySchema::new`].
    pub fn from_config(config: &GateConfig) -> Result<Self, SchemaError> {
        Self::new(
            &config.owner_key,
            identity_from_config(config),
            config.owned.iter().cloned(),
        )
    }

    /// Classify introspected tables (e.g. the result of `DESCRIBE` per table).
    ///
    /// Configured identity tables stay identity tables. Every other table
    /// carrying the owner key column is owned. A table listed as owned in the
    /// config whose introspection came back empty stays owned, so a failed
    /// `DESCRIBE` never loosens the policy.
    ///
    /// # Errors
    ///
    /// See [`PolicySchema::new`].
    pub fn from_columns(
        columns: &BTreeMap<String, Vec<String>>,
        config: &GateConfig,
    ) -> Result<Self, SchemaError> {
        let owner_key = config.owner_key.to_lowercase();
        let mut owned: BTreeSet<String> = BTreeSet::new();

        for (table, cols) in columns {
            let table = table.to_lowercase();
            if config.identity.contains_key(&table) {
                continue;
            }
            let has_owner_key = cols.iter().any(|c| c.eq_ignore_ascii_case(&owner_key));
            let configured_owned = config.owned.iter().any(|t| *t == table);
            if has_owner_key || (cols.is_empty() && configured_owned) {
                owned.insert(table);
            } else if configured_owned {
                log::warn!(
                    "table '{table}' is configured as owned but has no '{owner_key}' column; \
                     leaving it unclassified"
                );
            }
        }

        for table in &config.owned {
            if !columns.keys().any(|t| t.eq_ignore_ascii_case(table)) {
                owned.insert(table.clone());
            }
        }

        log::info!(
            "classified {} introspected tables: {} owned",
            columns.len(),
            owned.len()
        );
        Self::new(&config.owner_key, identity_from_config(config), owned)
    }

    /// Column in owned tables that references the owning student.
    #[must_use]
    pub fn owner_key(&self) -> &str {
        &self.owner_key
    }

    /// Classify a lowercase table name.
    #[must_use]
    pub fn classify(&self, table: &str) -> TableClass<'_> {
        if let Some(identity) = self.identity.get(table) {
            TableClass::Identity(identity)
        } else if self.owned.contains(table) {
            TableClass::Owned
        } else {
            TableClass::Unclassified
        }
    }

    /// The column that must equal the requester id to scope rows of `table`.
    #[must_use]
    pub fn scope_key(&self, table: &str) -> Option<&str> {
        match self.classify(table) {
            TableClass::Identity(identity) => Some(&identity.key),
            TableClass::Owned => Some(&self.owner_key),
            TableClass::Unclassified => None,
        }
    }

    #[must_use]
    pub fn is_owned(&self, table: &str) -> bool {
        self.owned.contains(table)
    }

    #[must_use]
    pub fn is_identity(&self, table: &str) -> bool {
        self.identity.contains_key(table)
    }

    pub fn identity_tables(&self) -> impl Iterator<Item = &IdentityTable> {
        self.identity.values()
    }

    pub fn owned_tables(&self) -> impl Iterator<Item = &str> {
        self.owned.iter().map(String::as_str)
    }

    /// SHA-256 of the schema's JSON form. Stable across runs.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};

        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

fn identity_from_config(config: &GateConfig) -> Vec<IdentityTable> {
    config
        .identity
        .iter()
        .map(|(name, t)| IdentityTable {
            name: name.clone(),
            role: t.role,
            key: t.key.clone(),
        })
        .collect()
}

fn normalize(name: &str) -> Result<String, SchemaError> {
    let name = name.trim().to_lowercase();
    if name_pattern().is_match(&name) {
        Ok(name)
    } else {
        Err(SchemaError::InvalidName(name))
    }
}

// ---------------------------------------------------------------------------
// Versioned snapshot + handle
// ---------------------------------------------------------------------------

/// One published version of the policy schema.
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    pub schema: PolicySchema,
    /// Starts at 1, bumped on every refresh.
    pub version: u64,
    pub fingerprint: String,
    pub loaded_at: DateTime<Utc>,
}

impl PolicySnapshot {
    fn new(schema: PolicySchema, version: u64) -> Self {
        let fingerprint = schema.fingerprint();
        Self {
            schema,
            version,
            fingerprint,
            loaded_at: Utc::now(),
        }
    }
}

/// Shared, swappable pointer to the current [`PolicySnapshot`].
///
/// Readers clone the inner `Arc` under a short read lock and then work
/// lock-free; [`SchemaHandle::refresh`] swaps the pointer under the write
/// lock, which also serializes concurrent refreshes.
#[derive(Debug, Clone)]
pub struct SchemaHandle {
    current: Arc<RwLock<Arc<PolicySnapshot>>>,
}

impl SchemaHandle {
    #[must_use]
    pub fn new(schema: PolicySchema) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(PolicySnapshot::new(schema, 1)))),
        }
    }

    /// The snapshot in force right now.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::LockPoisoned`] if a refresh panicked mid-swap.
    pub fn current(&self) -> Result<Arc<PolicySnapshot>, GateError> {
        self.current
            .read()
            .map(|guard| Arc::clone(&*guard))
            .map_err(|_| GateError::LockPoisoned)
    }

    /// Publish a new schema and return its version.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::LockPoisoned`] if the lock is poisoned.
    pub fn refresh(&self, schema: PolicySchema) -> Result<u64, GateError> {
        let mut guard = self.current.write().map_err(|_| GateError::LockPoisoned)?;
        let version = guard.version + 1;
        let snapshot = PolicySnapshot::new(schema, version);
        log::info!(
            "policy schema refreshed to version {version} ({})",
            &snapshot.fingerprint[..12]
        );
        *guard = Arc::new(snapshot);
        Ok(version)
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while building a [`PolicySchema`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// A table or column name is not a plain identifier.
    #[error("'{0}' is not a valid table or column name")]
    InvalidName(String),

    /// A table was classified as both identity and owned.
    #[error("table '{0}' cannot be both an identity table and an owned table")]
    Overlap(String),

    /// No identity table is bound to the student role.
    #[error("the policy schema has no identity table for students")]
    MissingStudentIdentity,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
