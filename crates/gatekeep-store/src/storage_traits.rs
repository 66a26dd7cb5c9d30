//! Storage trait definitions for the audit trail
//!
//! `AuditStore` is the only persistence capability the governance core
//! requires for audit evidence:
//! - `append(draft)` assigns the sequence number, timestamp and chain digest
//!   atomically and returns the stored entry.
//! - `query(filter)` returns matching entries ordered by sequence.
//! - Entries are never updated or deleted through this trait.
//!
//! Every entry carries the digest of its predecessor, so any rewrite of
//! history is detectable with [`verify_entries`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Digest used as `prev_digest` of the first entry in a chain.
pub const GENESIS_DIGEST: &str = "0000000000000000000000000000000000000000000000000000000000000000";

// ---------------------------------------------------------------------------
// Audit record model
// ---------------------------------------------------------------------------

/// Kind of governance event recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    RiskAssessed,
    ApprovalRequested,
    DecisionSubmitted,
    ApprovalResolved,
    Escalation,
    Timeout,
    AutoDeny,
    WorkflowStarted,
    WorkflowStageStarted,
    WorkflowStageCompleted,
    WorkflowCompleted,
    WorkflowFailed,
    WorkflowCancelled,
    FilterBlocked,
}

impl AuditEventType {
    pub const ALL: &'static [AuditEventType] = &[
        Self::RiskAssessed,
        Self::ApprovalRequested,
        Self::DecisionSubmitted,
        Self::ApprovalResolved,
        Self::Escalation,
        Self::Timeout,
        Self::AutoDeny,
        Self::WorkflowStarted,
        Self::WorkflowStageStarted,
        Self::WorkflowStageCompleted,
        Self::WorkflowCompleted,
        Self::WorkflowFailed,
        Self::WorkflowCancelled,
        Self::FilterBlocked,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RiskAssessed => "risk_assessed",
            Self::ApprovalRequested => "approval_requested",
            Self::DecisionSubmitted => "decision_submitted",
            Self::ApprovalResolved => "approval_resolved",
            Self::Escalation => "escalation",
            Self::Timeout => "timeout",
            Self::AutoDeny => "auto_deny",
            Self::WorkflowStarted => "workflow_started",
            Self::WorkflowStageStarted => "workflow_stage_started",
            Self::WorkflowStageCompleted => "workflow_stage_completed",
            Self::WorkflowCompleted => "workflow_completed",
            Self::WorkflowFailed => "workflow_failed",
            Self::WorkflowCancelled => "workflow_cancelled",
            Self::FilterBlocked => "filter_blocked",
        }
    }

    /// Parse the snake_case wire name.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The action was allowed or completed.
    Allowed,
    /// The action was blocked, rejected or auto-denied.
    Denied,
    /// The action is waiting on a human decision.
    Pending,
    /// Informational record with no gating effect.
    Recorded,
    /// The action failed.
    Error,
}

impl AuditOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Denied => "denied",
            Self::Pending => "pending",
            Self::Recorded => "recorded",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allowed" => Some(Self::Allowed),
            "denied" => Some(Self::Denied),
            "pending" => Some(Self::Pending),
            "recorded" => Some(Self::Recorded),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Identifiers of the governance objects an entry is about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSubject {
    pub assessment_id: Option<String>,
    pub approval_id: Option<String>,
    pub workflow_id: Option<String>,
}

impl AuditSubject {
    /// Whether any of the subject ids equals `id`.
    pub fn mentions(&self, id: &str) -> bool {
        [&self.assessment_id, &self.approval_id, &self.workflow_id]
            .iter()
            .any(|s| s.as_deref() == Some(id))
    }
}

/// An audit record before it is appended.
///
/// The store assigns `seq`, `timestamp` and the chain digests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditDraft {
    pub event_type: AuditEventType,
    pub actor: String,
    pub tenant_id: Option<String>,
    pub subject: AuditSubject,
    pub risk_level: Option<String>,
    pub action: Option<String>,
    pub outcome: AuditOutcome,
    pub details: serde_json::Value,
}

impl AuditDraft {
    pub fn new(event_type: AuditEventType, actor: impl Into<String>) -> Self {
        Self {
            event_type,
            actor: actor.into(),
            tenant_id: None,
            subject: AuditSubject::default(),
            risk_level: None,
            action: None,
            outcome: AuditOutcome::Recorded,
            details: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn assessment(mut self, id: impl ToString) -> Self {
        self.subject.assessment_id = Some(id.to_string());
        self
    }

    pub fn approval(mut self, id: impl ToString) -> Self {
        self.subject.approval_id = Some(id.to_string());
        self
    }

    pub fn workflow(mut self, id: impl ToString) -> Self {
        self.subject.workflow_id = Some(id.to_string());
        self
    }

    pub fn risk_level(mut self, level: impl ToString) -> Self {
        self.risk_level = Some(level.to_string());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Seal the draft into a chained entry.
    pub fn seal(
        self,
        seq: u64,
        timestamp: DateTime<Utc>,
        prev_digest: impl Into<String>,
    ) -> AuditEntry {
        let mut entry = AuditEntry {
            entry_id: uuid::Uuid::new_v4().to_string(),
            seq,
            timestamp,
            event_type: self.event_type,
            actor: self.actor,
            tenant_id: self.tenant_id,
            subject: self.subject,
            risk_level: self.risk_level,
            action: self.action,
            outcome: self.outcome,
            details: self.details,
            prev_digest: prev_digest.into(),
            digest: String::new(),
        };
        entry.digest = entry.compute_digest();
        entry
    }
}

/// Immutable, hash-chained audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: String,
    /// Monotonic sequence number, starting at 1.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub actor: String,
    pub tenant_id: Option<String>,
    pub subject: AuditSubject,
    pub risk_level: Option<String>,
    pub action: Option<String>,
    pub outcome: AuditOutcome,
    pub details: serde_json::Value,
    /// Digest of the previous entry ([`GENESIS_DIGEST`] for the first).
    pub prev_digest: String,
    /// SHA-256 over `prev_digest` and the entry content.
    pub digest: String,
}

impl AuditEntry {
    /// Compute the chain digest of this entry (excluding the digest field itself).
    pub fn compute_digest(&self) -> String {
        let payload = serde_json::json!({
            "entry_id": self.entry_id,
            "seq": self.seq,
            "timestamp": self.timestamp.to_rfc3339(),
            "event_type": self.event_type,
            "actor": self.actor,
            "tenant_id": self.tenant_id,
            "subject": self.subject,
            "risk_level": self.risk_level,
            "action": self.action,
            "outcome": self.outcome,
            "details": canonical_details(&self.details),
        });
        let mut hasher = Sha256::new();
        hasher.update(self.prev_digest.as_bytes());
        hasher.update(payload.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Recursively sort object keys by UTF-16 code units and collapse
/// integer-valued floats, so a row that went through a backend with its own
/// key order or number model hashes the same as when it was sealed.
fn canonical_details(value: &serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));
            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(v) = map.get(key) {
                    sorted.insert(key.clone(), canonical_details(v));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical_details).collect()),
        Value::Number(n) if !(n.is_i64() || n.is_u64()) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                Value::Number(serde_json::Number::from(f as i64))
            }
            _ => value.clone(),
        },
        other => other.clone(),
    }
}

/// Verify an ordered run of entries forms an unbroken chain from genesis.
pub fn verify_entries(entries: &[AuditEntry]) -> StorageResult<()> {
    let mut expected_prev = GENESIS_DIGEST.to_string();
    for (idx, entry) in entries.iter().enumerate() {
        let expected_seq = idx as u64 + 1;
        if entry.seq != expected_seq {
            return Err(StorageError::ChainBroken {
                seq: entry.seq,
                expected: format!("seq {expected_seq}"),
                actual: format!("seq {}", entry.seq),
            });
        }
        if entry.prev_digest != expected_prev {
            return Err(StorageError::ChainBroken {
                seq: entry.seq,
                expected: expected_prev,
                actual: entry.prev_digest.clone(),
            });
        }
        let recomputed = entry.compute_digest();
        if recomputed != entry.digest {
            return Err(StorageError::ChainBroken {
                seq: entry.seq,
                expected: recomputed,
                actual: entry.digest.clone(),
            });
        }
        expected_prev = entry.digest.clone();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Query filter
// ---------------------------------------------------------------------------

/// Filter for [`AuditStore::query`]. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditQuery {
    pub event_type: Option<AuditEventType>,
    pub actor: Option<String>,
    /// Matches entries whose subject mentions this id.
    pub subject_id: Option<String>,
    pub tenant_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Keep only the first `limit` matches.
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn event_type(mut self, event_type: AuditEventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn subject(mut self, id: impl ToString) -> Self {
        self.subject_id = Some(id.to_string());
        self
    }

    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.event_type.map_or(true, |t| entry.event_type == t)
            && self.actor.as_deref().map_or(true, |a| entry.actor == a)
            && self
                .subject_id
                .as_deref()
                .map_or(true, |id| entry.subject.mentions(id))
            && self
                .tenant_id
                .as_deref()
                .map_or(true, |t| entry.tenant_id.as_deref() == Some(t))
            && self.from.map_or(true, |f| entry.timestamp >= f)
            && self.to.map_or(true, |t| entry.timestamp <= t)
    }

    /// Apply the filter to an ordered slice.
    pub fn apply<'a>(&self, entries: impl IntoIterator<Item = &'a AuditEntry>) -> Vec<AuditEntry> {
        let matching = entries.into_iter().filter(|e| self.matches(e)).cloned();
        match self.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// AuditStore
// ---------------------------------------------------------------------------

/// Append-only audit store.
///
/// Guarantees:
/// - `append` is safe under concurrent writers; sequence numbers are dense
///   and the chain is extended atomically.
/// - `query` may run concurrently with `append` and observes a consistent
///   prefix of the log.
/// - No operation on this trait mutates or removes a stored entry.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append a new entry, returning it sealed with seq, timestamp and digest.
    async fn append(&self, draft: AuditDraft) -> StorageResult<AuditEntry>;

    /// Return entries matching `query`, ordered by sequence.
    async fn query(&self, query: &AuditQuery) -> StorageResult<Vec<AuditEntry>>;

    /// Number of stored entries.
    async fn len(&self) -> StorageResult<u64>;

    /// Whether the store is empty.
    async fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Recompute the whole hash chain.
    async fn verify_chain(&self) -> StorageResult<()> {
        let entries = self.query(&AuditQuery::all()).await?;
        verify_entries(&entries)
    }
}
