//! SurrealDB row schema for audit entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::{AuditEntry, AuditEventType, AuditOutcome, AuditSubject};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Audit entry row in the `audit_entries` table.
///
/// Enums are stored by wire name so the table stays readable from SurrealQL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntryRow {
    /// SurrealDB record ID
    pub id: Option<surrealdb::sql::Thing>,
    pub entry_id: String,
    pub seq: u64,
    #[serde(with = "surreal_datetime")]
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub actor: String,
    pub tenant_id: Option<String>,
    pub assessment_id: Option<String>,
    pub approval_id: Option<String>,
    pub workflow_id: Option<String>,
    pub risk_level: Option<String>,
    pub action: Option<String>,
    pub outcome: String,
    pub details: serde_json::Value,
    pub prev_digest: String,
    pub digest: String,
}

impl From<&AuditEntry> for AuditEntryRow {
    fn from(entry: &AuditEntry) -> Self {
        Self {
            id: None,
            entry_id: entry.entry_id.clone(),
            seq: entry.seq,
            timestamp: entry.timestamp,
            event_type: entry.event_type.as_str().to_string(),
            actor: entry.actor.clone(),
            tenant_id: entry.tenant_id.clone(),
            assessment_id: entry.subject.assessment_id.clone(),
            approval_id: entry.subject.approval_id.clone(),
            workflow_id: entry.subject.workflow_id.clone(),
            risk_level: entry.risk_level.clone(),
            action: entry.action.clone(),
            outcome: entry.outcome.as_str().to_string(),
            details: entry.details.clone(),
            prev_digest: entry.prev_digest.clone(),
            digest: entry.digest.clone(),
        }
    }
}

impl TryFrom<AuditEntryRow> for AuditEntry {
    type Error = StorageError;

    fn try_from(row: AuditEntryRow) -> Result<Self, Self::Error> {
        let event_type =
            AuditEventType::parse(&row.event_type).ok_or_else(|| StorageError::CorruptRow {
                seq: row.seq,
                reason: format!("unknown event type: {}", row.event_type),
            })?;
        let outcome = AuditOutcome::parse(&row.outcome).ok_or_else(|| StorageError::CorruptRow {
            seq: row.seq,
            reason: format!("unknown outcome: {}", row.outcome),
        })?;
        Ok(AuditEntry {
            entry_id: row.entry_id,
            seq: row.seq,
            timestamp: row.timestamp,
            event_type,
            actor: row.actor,
            tenant_id: row.tenant_id,
            subject: AuditSubject {
                assessment_id: row.assessment_id,
                approval_id: row.approval_id,
                workflow_id: row.workflow_id,
            },
            risk_level: row.risk_level,
            action: row.action,
            outcome,
            details: row.details,
            prev_digest: row.prev_digest,
            digest: row.digest,
        })
    }
}
