//! Append-only audit logger.
//!
//! Wraps an [`AuditStore`] and passes every details payload through the
//! privacy filter before it is persisted. When a payload contained a secret
//! the redacted entry is still stored, followed by a `filter_blocked` entry.

use std::path::Path;
use std::sync::Arc;

use gatekeep_store::{AuditDraft, AuditEntry, AuditEventType, AuditOutcome, AuditQuery, AuditStore};
use serde_json::json;

use super::export::{self, AuditExport, AuditExportReceipt, AuditFormat};
use crate::domain::Result;
use crate::obs;
use crate::privacy::PrivacyFilter;
use crate::risk::RiskAssessment;

#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn AuditStore>,
    filter: Option<Arc<PrivacyFilter>>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("redacting", &self.filter.is_some())
            .finish_non_exhaustive()
    }
}

impl AuditLogger {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            filter: None,
        }
    }

    pub fn with_privacy_filter(mut self, filter: Arc<PrivacyFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Append one entry. Returns the stored (possibly redacted) entry.
    pub async fn log(&self, mut draft: AuditDraft) -> Result<AuditEntry> {
        let mut blocked = None;
        if let Some(filter) = &self.filter {
            let redacted = filter.filter_json(&draft.details);
            if !redacted.detections.is_empty() {
                draft.details = redacted.value;
            }
            if redacted.blocked {
                let categories: Vec<String> = redacted
                    .detections
                    .iter()
                    .map(|d| d.category.clone())
                    .collect();
                blocked = Some((redacted.detections.len(), categories));
            }
        }

        let source = draft.clone();
        let entry = self.store.append(draft).await?;
        tracing::debug!(
            seq = entry.seq,
            event_type = %entry.event_type,
            actor = %entry.actor,
            "audit entry appended"
        );

        if let Some((count, categories)) = blocked {
            obs::emit_privacy_blocked(entry.event_type.as_str(), count);
            let mut marker = AuditDraft::new(AuditEventType::FilterBlocked, source.actor)
                .outcome(AuditOutcome::Denied)
                .details(json!({
                    "source_event": entry.event_type,
                    "source_seq": entry.seq,
                    "detections": count,
                    "categories": categories,
                }));
            marker.subject = source.subject;
            marker.tenant_id = source.tenant_id;
            self.store.append(marker).await?;
        }
        Ok(entry)
    }

    /// Record a `risk_assessed` entry carrying the full factor breakdown.
    pub async fn log_assessment(&self, assessment: &RiskAssessment) -> Result<AuditEntry> {
        let context = assessment.context();
        let outcome = if assessment.requires_approval() {
            AuditOutcome::Pending
        } else {
            AuditOutcome::Allowed
        };
        let mut draft = AuditDraft::new(AuditEventType::RiskAssessed, &context.user_id)
            .assessment(assessment.id())
            .risk_level(assessment.level())
            .action(&assessment.action().action_type)
            .outcome(outcome)
            .details(json!({
                "score": assessment.score(),
                "factors": assessment.factors(),
                "safeguards": assessment.safeguards(),
                "environment": context.environment,
                "workflow_type": context.workflow_type,
                "target": assessment.action().target,
            }));
        draft.tenant_id = context.tenant_id.clone();
        self.log(draft).await
    }

    pub async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>> {
        Ok(self.store.query(query).await?)
    }

    pub async fn len(&self) -> Result<u64> {
        Ok(self.store.len().await?)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.store.is_empty().await?)
    }

    /// Recompute the hash chain over the whole log.
    pub async fn verify_chain(&self) -> Result<()> {
        Ok(self.store.verify_chain().await?)
    }

    pub async fn export(&self, format: AuditFormat) -> Result<AuditExport> {
        let entries = self.store.query(&AuditQuery::all()).await?;
        export::render(&entries, format)
    }

    /// Export the whole log into `dir` with a digest sidecar.
    pub async fn write_export(&self, dir: &Path, format: AuditFormat) -> Result<AuditExportReceipt> {
        let entries = self.store.query(&AuditQuery::all()).await?;
        let rendered = export::render(&entries, format)?;
        export::write_export(dir, format, &rendered, entries.len())
    }
}
