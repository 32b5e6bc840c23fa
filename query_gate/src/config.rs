//! Configuration loading and resolution for the query gate.
//!
//! Supports a 4-level configuration resolution order:
//! 1. `query_gate.toml` (`[gate]` section, service root)
//! 2. `[tool.query_gate]` section in `pyproject.toml`
//! 3. `gate:` section in `query_gate.yaml` / `query_gate.yml`
//! 4. Built-in defaults (the school records schema)
//!
//! The configuration names the identity tables, the owned tables and the
//! owner key column. It is turned into a validated
//! [`PolicySchema`](crate::schema::PolicySchema) once at startup.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::Role;

// ---------------------------------------------------------------------------
// Policy switches
// ---------------------------------------------------------------------------

/// What to do with a table the schema classifies as neither identity nor owned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownTablePolicy {
    /// Deny students any query touching an unclassified table.
    Deny,
    /// Let unclassified tables through (the identity/owned rules still apply).
    Allow,
}

/// Which roles are restricted to read-only, single-statement queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadOnlyScope {
    /// Writes are not refused. Students are still held to one non-empty statement.
    Off,
    /// Students only.
    Students,
    /// Every role.
    All,
}

impl ReadOnlyScope {
    /// Whether `role` is restricted under this scope.
    #[must_use]
    pub fn covers(self, role: Role) -> bool {
        match self {
            Self::Off => false,
            Self::Students => role == Role::Student,
            Self::All => true,
        }
    }
}

/// An identity table: one row per person of `role`, keyed by `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityTableConfig {
    /// The role whose people this table holds.
    pub role: Role,
    /// Primary key column that equals the requester id.
    pub key: String,
}

// ---------------------------------------------------------------------------
// Main config
// ---------------------------------------------------------------------------

/// Complete gate configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Column in owned tables that references the owning student.
    pub owner_key: String,

    /// Identity tables by name.
    pub identity: BTreeMap<String, IdentityTableConfig>,

    /// Tables carrying the owner key.
    pub owned: Vec<String>,

    /// Handling of tables outside the schema.
    pub unknown_tables: UnknownTablePolicy,

    /// Roles restricted to read-only, single-statement queries.
    pub read_only: ReadOnlyScope,

    /// Whether each decision is written to the audit log target.
    pub audit: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        let mut identity = BTreeMap::new();
        identity.insert(
            "students".to_owned(),
            IdentityTableConfig {
                role: Role::Student,
                key: "id".to_owned(),
            },
        );
        identity.insert(
            "teachers".to_owned(),
            IdentityTableConfig {
                role: Role::Teacher,
                key: "id".to_owned(),
            },
        );
        Self {
            owner_key: "student_id".to_owned(),
            identity,
            owned: [
                "attendance",
                "fee_payments",
                "academic_marks",
                "hostel_transport",
                "medical_info",
                "student_details",
            ]
            .iter()
            .map(|t| (*t).to_owned())
            .collect(),
            unknown_tables: UnknownTablePolicy::Deny,
            read_only: ReadOnlyScope::Students,
            audit: true,
        }
    }
}

// ---------------------------------------------------------------------------
// File deserialization helpers
// ---------------------------------------------------------------------------

/// Raw structure for `query_gate.toml`.
#[derive(Debug, Deserialize)]
struct GateFile {
    gate: Option<GateSection>,
}

/// The `[gate]` section shared by all three file formats.
#[derive(Debug, Deserialize)]
struct GateSection {
    owner_key: Option<String>,
    unknown_tables: Option<String>,
    read_only: Option<String>,
    audit: Option<bool>,
    owned: Option<Vec<String>>,
    identity: Option<BTreeMap<String, IdentitySection>>,
}

#[derive(Debug, Deserialize)]
struct IdentitySection {
    role: String,
    key: Option<String>,
}

/// Raw structure for `pyproject.toml` with `[tool.query_gate]`.
#[derive(Debug, Deserialize)]
struct PyprojectToml {
    tool: Option<PyprojectTool>,
}

#[derive(Debug, Deserialize)]
struct PyprojectTool {
    query_gate: Option<GateSection>,
}

fn parse_unknown_tables(s: &str) -> Option<UnknownTablePolicy> {
    match s.to_lowercase().as_str() {
        "deny" | "reject" => Some(UnknownTablePolicy::Deny),
        "allow" => Some(UnknownTablePolicy::Allow),
        _ => None,
    }
}

fn parse_read_only(s: &str) -> Option<ReadOnlyScope> {
    match s.to_lowercase().as_str() {
        "off" | "none" | "false" => Some(ReadOnlyScope::Off),
        "students" | "student" => Some(ReadOnlyScope::Students),
        "all" | "true" => Some(ReadOnlyScope::All),
        _ => None,
    }
}

/// Apply a [`GateSection`] onto a [`GateConfig`], overriding any set values.
///
/// `owned` and `identity` replace the defaults wholesale so a deployment can
/// drop a table from the policy.
fn apply_section(
    config: &mut GateConfig,
    section: &GateSection,
    source: &str,
) -> Result<(), ConfigError> {
    if let Some(ref v) = section.owner_key {
        config.owner_key = v.trim().to_lowercase();
    }
    if let Some(ref v) = section.unknown_tables {
        match parse_unknown_tables(v) {
            Some(p) => config.unknown_tables = p,
            None => log::warn!("{source}: ignoring unknown_tables = {v:?}"),
        }
    }
    if let Some(ref v) = section.read_only {
        match parse_read_only(v) {
            Some(s) => config.read_only = s,
            None => log::warn!("{source}: ignoring read_only = {v:?}"),
        }
    }
    if let Some(v) = section.audit {
        config.audit = v;
    }
    if let Some(ref owned) = section.owned {
        config.owned = owned.iter().map(|t| t.trim().to_lowercase()).collect();
    }
    if let Some(ref identity) = section.identity {
        let mut tables = BTreeMap::new();
        for (table, entry) in identity {
            let role = entry
                .role
                .parse::<Role>()
                .map_err(|e| ConfigError::Invalid(source.to_owned(), e.to_string()))?;
            let key = entry
                .key
                .as_deref()
                .unwrap_or("id")
                .trim()
                .to_lowercase();
            tables.insert(table.trim().to_lowercase(), IdentityTableConfig { role, key });
        }
        config.identity = tables;
    }
    Ok(())
}

impl GateConfig {
    /// Load configuration from a service root using the 4-level resolution order.
    ///
    /// First file found wins; later files are not consulted.
    ///
    /// # Errors
    ///
    /// Returns an error if a found config file cannot be read or parsed, or
    /// names an unknown role.
    pub fn load_from_dir(root: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // 1. query_gate.toml
        let gate_toml = root.join("query_gate.toml");
        if gate_toml.is_file() {
            let source = gate_toml.display().to_string();
            let content = read(&gate_toml)?;
            let parsed: GateFile = toml::from_str(&content)
                .map_err(|e| ConfigError::ParseError(source.clone(), e.to_string()))?;
            if let Some(ref section) = parsed.gate {
                apply_section(&mut config, section, &source)?;
            }
            log::debug!("loaded gate config from {source}");
            return Ok(config);
        }

        // 2. pyproject.toml [tool.query_gate]
        let pyproject = root.join("pyproject.toml");
        if pyproject.is_file() {
            let source = pyproject.display().to_string();
            let content = read(&pyproject)?;
            if let Ok(parsed) = toml::from_str::<PyprojectToml>(&content) {
                if let Some(section) = parsed.tool.and_then(|t| t.query_gate) {
                    apply_section(&mut config, &section, &source)?;
                    log::debug!("loaded gate config from {source}");
                    return Ok(config);
                }
            }
        }

        // 3. query_gate.yaml / query_gate.yml
        for name in &["query_gate.yaml", "query_gate.yml"] {
            let yaml_path = root.join(name);
            if yaml_path.is_file() {
                let source = yaml_path.display().to_string();
                let content = read(&yaml_path)?;
                let parsed: GateFile = serde_yaml::from_str(&content)
                    .map_err(|e| ConfigError::ParseError(source.clone(), e.to_string()))?;
                if let Some(ref section) = parsed.gate {
                    apply_section(&mut config, section, &source)?;
                }
                log::debug!("loaded gate config from {source}");
                return Ok(config);
            }
        }

        // 4. Built-in defaults (already set)
        Ok(config)
    }

    /// SHA-256 of the configuration, for logging which policy made a decision.
    ///
    /// Every map in the config is a `BTreeMap`, so the JSON form is already
    /// key-ordered and the digest is deterministic.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};

        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadError(path.display().to_string(), e.to_string()))
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a configuration file.
    #[error("Failed to read config file '{0}': {1}")]
    ReadError(String, String),

    /// Failed to parse a configuration file.
    #[error("Failed to parse config file '{0}': {1}")]
    ParseError(String, String),

    /// The file parsed but holds a value the gate cannot use.
    #[error("Invalid value in config file '{0}': {1}")]
    Invalid(String, String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GateConfig::default();
        assert_eq!(config.owner_key, "student_id");
        assert_eq!(config.owned.len(), 6);
        assert_eq!(config.identity["students"].role, Role::Student);
        assert_eq!(config.identity["teachers"].key, "id");
        assert_eq!(config.unknown_tables, UnknownTablePolicy::Deny);
        assert_eq!(config.read_only, ReadOnlyScope::Students);
    }

    #[test]
    fn test_read_only_scope_covers() {
        assert!(ReadOnlyScope::Students.covers(Role::Student));
        assert!(!ReadOnlyScope::Students.covers(Role::Teacher));
        assert!(ReadOnlyScope::All.covers(Role::Teacher));
        assert!(!ReadOnlyScope::Off.covers(Role::Student));
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_unknown_tables("DENY"), Some(UnknownTablePolicy::Deny));
        assert_eq!(parse_unknown_tables("allow"), Some(UnknownTablePolicy::Allow));
        assert_eq!(parse_unknown_tables("maybe"), None);
        assert_eq!(parse_read_only("all"), Some(ReadOnlyScope::All));
        assert_eq!(parse_read_only("none"), Some(ReadOnlyScope::Off));
        assert_eq!(parse_read_only("sometimes"), None);
    }

    #[test]
    fn test_fingerprint_deterministic_and_sensitive() {
        let a = GateConfig::default();
        let mut b = GateConfig::default();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.owned.push("library_loans".to_owned());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_load_nonexistent_dir() {
        let config = GateConfig::load_from_dir(Path::new("/nonexistent/path")).unwrap();
        assert_eq!(config, GateConfig::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let content = r#"
[gate]
owner_key = "Student_ID"
unknown_tables = "allow"
read_only = "all"
owned = ["attendance", "Library_Loans"]

[gate.identity.students]
role = "student"

[gate.identity.staff]
role = "teacher"
key = "staff_id"
"#;
        std::fs::write(dir.path().join("query_gate.toml"), content).unwrap();
        let config = GateConfig::load_from_dir(dir.path()).unwrap();
        assert_eq!(config.owner_key, "student_id");
        assert_eq!(config.unknown_tables, UnknownTablePolicy::Allow);
        assert_eq!(config.read_only, ReadOnlyScope::All);
        assert_eq!(config.owned, vec!["attendance", "library_loans"]);
        assert_eq!(config.identity.len(), 2);
        assert_eq!(config.identity["students"].key, "id");
        assert_eq!(config.identity["staff"].role, Role::Teacher);
        assert_eq!(config.identity["staff"].key, "staff_id");
    }

    #[test]
    fn test_load_rejects_unknown_role() {
        let dir = tempfile::tempdir().unwrap();
        let content = "[gate.identity.parents]\nrole = \"parent\"\n";
        std::fs::write(dir.path().join("query_gate.toml"), content).unwrap();
        let err = GateConfig::load_from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_, _)));
    }

    #[test]
    fn test_load_from_pyproject_toml() {
        let dir = tempfile::tempdir().unwrap();
        let content = r#"
[project]
name = "school-chatbot"

[tool.query_gate]
read_only = "off"
"#;
        std::fs::write(dir.path().join("pyproject.toml"), content).unwrap();
        let config = GateConfig::load_from_dir(dir.path()).unwrap();
        assert_eq!(config.read_only, ReadOnlyScope::Off);
        assert_eq!(config.owner_key, "student_id");
    }

    #[test]
    fn test_pyproject_without_section_falls_through_to_yaml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pyproject.toml"), "[project]\nname = \"x\"\n").unwrap();
        let yaml = "gate:\n  audit: false\n  owned:\n    - attendance\n";
        std::fs::write(dir.path().join("query_gate.yaml"), yaml).unwrap();
        let config = GateConfig::load_from_dir(dir.path()).unwrap();
        assert!(!config.audit);
        assert_eq!(config.owned, vec!["attendance"]);
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("query_gate.toml"), "[gate\nowner_key=").unwrap();
        let err = GateConfig::load_from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_, _)));
    }
}
