//! Audit records for guard decisions.
//!
//! One record per guard call, serialized as a single JSON line and written
//! through the `log` facade under the `school_query_gate::audit` target:
//! `info` for allowed queries, `warn` for denials. The submitted SQL is
//! recorded only as a SHA-256 digest.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::schema::PolicySnapshot;
use crate::types::{GuardOutcome, GuardStatus, Requester, Role};

const AUDIT_TARGET: &str = "school_query_gate::audit";

/// Length of the schema fingerprint prefix kept in a record.
const FINGERPRINT_PREFIX: usize = 12;

/// What the gate decided for one submitted query.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub role: Role,
    pub requester_id: u64,
    pub status: GuardStatus,
    pub rule: Option<String>,
    pub rewritten: bool,
    pub tables: Vec<String>,
    /// `0` when no schema snapshot could be read.
    pub schema_version: u64,
    pub schema_fingerprint: String,
    pub sql_sha256: String,
}

impl AuditRecord {
    #[must_use]
    pub fn new(
        requester: &Requester,
        sql: &str,
        outcome: &GuardOutcome,
        snapshot: Option<&PolicySnapshot>,
    ) -> Self {
        let (schema_version, schema_fingerprint) = snapshot.map_or((0, String::new()), |s| {
            let prefix = s.fingerprint.get(..FINGERPRINT_PREFIX).unwrap_or(&s.fingerprint);
            (s.version, prefix.to_owned())
        });
        Self {
            timestamp: Utc::now(),
            role: requester.role(),
            requester_id: requester.id(),
            status: outcome.status,
            rule: outcome.rule.clone(),
            rewritten: outcome.rewritten,
            tables: outcome.tables.clone(),
            schema_version,
            schema_fingerprint,
            sql_sha256: hex::encode(Sha256::digest(sql.as_bytes())),
        }
    }

    /// Serialize the record to one line of JSON.
    ///
    /// # Errors
    ///
    /// Returns an error message if serialization fails (should not happen for valid data).
    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string(self).map_err(|e| format!("JSON serialization failed: {e}"))
    }

    /// Write the record to the log.
    pub fn emit(&self) {
        let line = match self.to_json() {
            Ok(line) => line,
            Err(e) => {
                log::error!(target: AUDIT_TARGET, "{e}");
                return;
            }
        };
        match self.status {
            GuardStatus::Allowed => log::info!(target: AUDIT_TARGET, "{line}"),
            GuardStatus::Denied => log::warn!(target: AUDIT_TARGET, "{line}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GateConfig;
    use crate::schema::{PolicySchema, SchemaHandle};
    use crate::types::{DenyReason, Verdict};

    fn snapshot() -> std::sync::Arc<PolicySnapshot> {
        let schema = PolicySchema::from_config(&GateConfig::default()).expect("default schema");
        SchemaHandle::new(schema).current().expect("snapshot")
    }

    #[test]
    fn test_record_hashes_sql_instead_of_storing_it() {
        let requester = Requester::student(7).expect("valid id");
        let sql = "SELECT * FROM teachers";
        let outcome = GuardOutcome::from_verdict(
            &Verdict::Deny(DenyReason::TeacherData),
            vec!["teachers".to_owned()],
        );
        let snap = snapshot();
        let record = AuditRecord::new(&requester, sql, &outcome, Some(&snap));

        let json = record.to_json().expect("serializes");
        assert!(!json.contains("SELECT"));
        assert_eq!(record.sql_sha256.len(), 64);
        assert_eq!(record.schema_version, 1);
        assert_eq!(record.schema_fingerprint.len(), 12);

        let value: serde_json::Value = serde_json::from_str(&json).expect("valid JSON");
        assert_eq!(value["role"], "student");
        assert_eq!(value["status"], "denied");
        assert_eq!(value["rule"], "teacher_data");
        assert_eq!(value["tables"][0], "teachers");
    }

    #[test]
    fn test_record_without_snapshot() {
        let requester = Requester::teacher(2).expect("valid id");
        let outcome = GuardOutcome::from_verdict(&Verdict::Allow("SELECT 1".to_owned()), vec![]);
        let record = AuditRecord::new(&requester, "SELECT 1", &outcome, None);
        assert_eq!(record.schema_version, 0);
        assert!(record.schema_fingerprint.is_empty());
        assert!(record.rule.is_none());
        record.emit();
    }
}
