//! Escalation and fail-closed timeout of pending approvals.
//!
//! Each watched request gets one timer task. At the escalation threshold the
//! configured admins are notified; at the full timeout the request is
//! auto-denied. A decision calls [`EscalationService::resolve`], which wins
//! the request's `resolved` flag and wakes the timer so it exits. The timer
//! claims the same flag before firing the timeout, so exactly one of the two
//! paths owns the outcome. The approval repository swap is the second guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use gatekeep_store::{AuditDraft, AuditEventType, AuditOutcome};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{mpsc, Notify};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::notifier::Notifier;
use crate::approval::{ApprovalRequest, ApprovalWorkflow};
use crate::audit::AuditLogger;
use crate::config::ApprovalConfig;
use crate::domain::Result;
use crate::metrics::GovernanceMetrics;
use crate::obs;

/// Resolution reason recorded on auto-denied requests.
pub const TIMEOUT_REASON: &str = "approval timeout, fail-closed";

/// Actor recorded on entries written by the timer.
pub const ESCALATION_ACTOR: &str = "system:escalation";

/// Terminal outcome of a watched request, sent to the workflow engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalResolution {
    pub request_id: String,
    pub approved: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Automatic,
    Manual,
}

impl Trigger {
    fn as_str(self) -> &'static str {
        match self {
            Self::Automatic => "automatic",
            Self::Manual => "manual",
        }
    }
}

struct Watch {
    resolved: Arc<AtomicBool>,
    cancel: Arc<Notify>,
    handle: AbortHandle,
}

pub struct EscalationService {
    approvals: Arc<ApprovalWorkflow>,
    audit: AuditLogger,
    notifier: Arc<dyn Notifier>,
    admins: Vec<String>,
    threshold: f64,
    metrics: Arc<GovernanceMetrics>,
    resolutions: mpsc::UnboundedSender<ApprovalResolution>,
    watches: DashMap<String, Watch>,
}

impl EscalationService {
    pub fn new(
        approvals: Arc<ApprovalWorkflow>,
        audit: AuditLogger,
        notifier: Arc<dyn Notifier>,
        config: &ApprovalConfig,
        metrics: Arc<GovernanceMetrics>,
        resolutions: mpsc::UnboundedSender<ApprovalResolution>,
    ) -> Self {
        Self {
            approvals,
            audit,
            notifier,
            admins: config.admin_approvers.clone(),
            threshold: config.escalation_threshold,
            metrics,
            resolutions,
            watches: DashMap::new(),
        }
    }

    /// Start the escalation timer for a pending request.
    ///
    /// The window is the request's own `expires_at - created_at`.
    pub fn watch(self: &Arc<Self>, request: &ApprovalRequest) {
        if request.status.is_terminal() || self.watches.contains_key(&request.id) {
            return;
        }
        let timeout = (request.expires_at - request.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let escalate_after = timeout.mul_f64(self.threshold);

        let resolved = Arc::new(AtomicBool::new(false));
        let cancel = Arc::new(Notify::new());
        let task = tokio::spawn(Arc::clone(self).run_timer(
            request.id.clone(),
            timeout,
            escalate_after,
            Arc::clone(&resolved),
            Arc::clone(&cancel),
        ));
        self.watches.insert(
            request.id.clone(),
            Watch {
                resolved,
                cancel,
                handle: task.abort_handle(),
            },
        );
        debug!(request_id = %request.id, timeout_ms = timeout.as_millis() as u64, "watching approval");
    }

    /// Mark a request as decided and stop its timer.
    ///
    /// Returns `false` when the request was not watched or the timeout
    /// already claimed it.
    pub fn resolve(&self, request_id: &str) -> bool {
        let Some((_, watch)) = self.watches.remove(request_id) else {
            return false;
        };
        let won = watch
            .resolved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            watch.cancel.notify_one();
        }
        won
    }

    pub fn is_watching(&self, request_id: &str) -> bool {
        self.watches.contains_key(request_id)
    }

    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    /// Escalate by hand, before the threshold is reached.
    ///
    /// Audited like the automatic escalation with `trigger = "manual"`.
    /// `Conflict` if the request is terminal or already escalated.
    pub async fn escalate_approval(&self, request: &ApprovalRequest, reason: &str) -> Result<ApprovalRequest> {
        let now = Utc::now();
        let elapsed = (now - request.created_at).num_milliseconds().max(0);
        let remaining = (request.expires_at - now).num_milliseconds().max(0);
        self.fire_escalation(&request.id, Trigger::Manual, reason, elapsed, remaining)
            .await
    }

    /// Abort every outstanding timer.
    pub fn shutdown(&self) {
        for watch in self.watches.iter() {
            watch.handle.abort();
        }
        self.watches.clear();
    }

    async fn run_timer(
        self: Arc<Self>,
        request_id: String,
        timeout: Duration,
        escalate_after: Duration,
        resolved: Arc<AtomicBool>,
        cancel: Arc<Notify>,
    ) {
        let started = Instant::now();
        let deadline = started + timeout;

        tokio::select! {
            _ = tokio::time::sleep_until(started + escalate_after) => {}
            _ = cancel.notified() => return,
        }
        if !resolved.load(Ordering::Acquire) {
            // Delivery runs beside the timer so a slow notifier cannot push
            // back the deadline.
            let this = Arc::clone(&self);
            let id = request_id.clone();
            let elapsed = escalate_after.as_millis() as i64;
            let remaining = timeout.saturating_sub(escalate_after).as_millis() as i64;
            tokio::spawn(async move {
                if let Err(e) = this
                    .fire_escalation(
                        &id,
                        Trigger::Automatic,
                        "escalation threshold reached",
                        elapsed,
                        remaining,
                    )
                    .await
                {
                    debug!(request_id = %id, error = %e, "automatic escalation skipped");
                }
            });
        }

        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {}
            _ = cancel.notified() => return,
        }
        if resolved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        if let Err(e) = self.fire_timeout(&request_id, timeout).await {
            warn!(request_id = %request_id, error = %e, "approval timeout handling failed");
        }
        self.watches.remove(&request_id);
    }

    async fn fire_escalation(
        &self,
        request_id: &str,
        trigger: Trigger,
        reason: &str,
        elapsed_ms: i64,
        remaining_ms: i64,
    ) -> Result<ApprovalRequest> {
        let request = self.approvals.mark_escalated(request_id).await?;
        let results = self.notifier.notify(&request, &self.admins).await;
        let succeeded = results.iter().filter(|r| r.delivered).count();

        let mut draft = AuditDraft::new(AuditEventType::Escalation, ESCALATION_ACTOR)
            .assessment(request.assessment_id)
            .approval(&request.id)
            .risk_level(request.risk_level)
            .action(&request.action_type)
            .outcome(AuditOutcome::Pending)
            .details(json!({
                "trigger": trigger.as_str(),
                "reason": reason,
                "elapsed_ms": elapsed_ms,
                "remaining_ms": remaining_ms,
                "notified": results.len(),
                "succeeded": succeeded,
                "approvers": self.admins,
            }));
        draft.tenant_id = request.tenant_id.clone();
        self.audit.log(draft).await?;

        self.metrics.inc_escalations();
        obs::emit_escalation_fired(&request.id, trigger.as_str(), results.len(), succeeded);
        Ok(request)
    }

    async fn fire_timeout(&self, request_id: &str, timeout: Duration) -> Result<()> {
        // Conflict here means a decision landed first; nothing to deny.
        let request = match self.approvals.expire(request_id, TIMEOUT_REASON).await {
            Ok(request) => request,
            Err(e) if e.is_conflict() => return Ok(()),
            Err(e) => return Err(e),
        };
        let elapsed_ms = timeout.as_millis() as u64;
        let logged = self.audit_timeout(&request, elapsed_ms).await;

        self.metrics.inc_auto_denials();
        obs::emit_auto_denied(&request.id, elapsed_ms);

        // Sent even when the audit write failed.
        let resolution = ApprovalResolution {
            request_id: request.id.clone(),
            approved: false,
            reason: TIMEOUT_REASON.to_string(),
        };
        if self.resolutions.send(resolution).is_err() {
            warn!(request_id = %request.id, "no listener for approval resolutions");
        }
        logged
    }

    async fn audit_timeout(&self, request: &ApprovalRequest, elapsed_ms: u64) -> Result<()> {
        let mut draft = AuditDraft::new(AuditEventType::Timeout, ESCALATION_ACTOR)
            .assessment(request.assessment_id)
            .approval(&request.id)
            .risk_level(request.risk_level)
            .action(&request.action_type)
            .outcome(AuditOutcome::Denied)
            .details(json!({
                "elapsed_ms": elapsed_ms,
                "timeout_ms": elapsed_ms,
                "approvals": request.approval_count(),
                "required_approvals": request.required_approvals,
            }));
        draft.tenant_id = request.tenant_id.clone();
        self.audit.log(draft).await?;

        let mut draft = AuditDraft::new(AuditEventType::AutoDeny, ESCALATION_ACTOR)
            .assessment(request.assessment_id)
            .approval(&request.id)
            .risk_level(request.risk_level)
            .action(&request.action_type)
            .outcome(AuditOutcome::Denied)
            .details(json!({ "reason": TIMEOUT_REASON }));
        draft.tenant_id = request.tenant_id.clone();
        self.audit.log(draft).await?;
        Ok(())
    }
}
