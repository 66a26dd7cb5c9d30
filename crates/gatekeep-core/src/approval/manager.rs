//! Approval request lifecycle.
//!
//! Every mutation is a read, a pure transition on a copy, and a
//! version-checked swap. A stale swap re-reads and re-validates, so two
//! concurrent approvals can never both pass the quorum check and a duplicate
//! approver is rejected whichever call lands first.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gatekeep_store::{AuditDraft, AuditEventType, AuditOutcome};
use serde_json::json;
use tracing::{debug, warn};

use super::repository::ApprovalRepository;
use super::request::{ApprovalRequest, ApprovalStats, ApprovalStatus, Decision, Verdict};
use crate::audit::AuditLogger;
use crate::domain::{CasOutcome, GovernanceError, Result};
use crate::obs;
use crate::risk::RiskAssessment;

/// Upper bound on swap retries for one mutation.
const MAX_CAS_ATTEMPTS: usize = 64;

/// Resolution reason for a request withdrawn because its creation could not
/// be audited.
pub const REQUEST_AUDIT_FAILED: &str = "request could not be audited";

pub struct ApprovalWorkflow {
    repo: Arc<dyn ApprovalRepository>,
    audit: AuditLogger,
    timeout: chrono::Duration,
}

impl ApprovalWorkflow {
    pub fn new(repo: Arc<dyn ApprovalRepository>, audit: AuditLogger, timeout: Duration) -> Result<Self> {
        let timeout = chrono::Duration::from_std(timeout)
            .map_err(|e| GovernanceError::Config(format!("approval timeout out of range: {e}")))?;
        Ok(Self {
            repo,
            audit,
            timeout,
        })
    }

    pub fn timeout(&self) -> chrono::Duration {
        self.timeout
    }

    /// Open a pending request for `assessment`.
    pub async fn create_request(
        &self,
        assessment: &RiskAssessment,
        summary: &str,
        details: Option<String>,
        artifacts: Vec<String>,
    ) -> Result<ApprovalRequest> {
        if summary.trim().is_empty() {
            return Err(GovernanceError::InvalidInput(
                "approval summary must not be empty".into(),
            ));
        }
        let request = ApprovalRequest::new(
            assessment,
            summary,
            details,
            artifacts,
            Utc::now(),
            self.timeout,
        )?;
        self.repo.insert(request.clone()).await?;
        if let Err(e) = self.audit_requested(&request).await {
            // Never leave an unaudited request pending.
            if let Err(expire_err) = self.expire(&request.id, REQUEST_AUDIT_FAILED).await {
                warn!(request_id = %request.id, error = %expire_err, "could not withdraw unaudited request");
            }
            return Err(e);
        }

        debug!(request_id = %request.id, level = %request.risk_level, "approval requested");
        Ok(request)
    }

    async fn audit_requested(&self, request: &ApprovalRequest) -> Result<()> {
        let mut draft = AuditDraft::new(AuditEventType::ApprovalRequested, &request.requested_by)
            .assessment(request.assessment_id)
            .approval(&request.id)
            .risk_level(request.risk_level)
            .action(&request.action_type)
            .outcome(AuditOutcome::Pending)
            .details(json!({
                "summary": request.summary,
                "required_approvals": request.required_approvals,
                "expires_at": request.expires_at.to_rfc3339(),
                "artifacts": request.artifacts.len(),
            }));
        draft.tenant_id = request.tenant_id.clone();
        self.audit.log(draft).await?;
        Ok(())
    }

    /// Record one approver's verdict.
    ///
    /// `Conflict` (carrying the unchanged request) when the request is no
    /// longer pending, has passed its deadline, already has a decision from
    /// `approver_id`, or was raised by `approver_id`.
    pub async fn submit_decision(
        &self,
        id: &str,
        approver_id: &str,
        verdict: Verdict,
        comment: Option<String>,
    ) -> Result<ApprovalRequest> {
        if approver_id.trim().is_empty() {
            return Err(GovernanceError::InvalidInput(
                "approver id must not be empty".into(),
            ));
        }

        let mut current = self.get(id).await?;
        for _ in 0..MAX_CAS_ATTEMPTS {
            if current.status.is_terminal() {
                let reason = format!("request is already {}", current.status);
                return Err(GovernanceError::approval_conflict(reason, current));
            }
            let now = Utc::now();
            if current.is_expired_at(now) {
                return Err(GovernanceError::approval_conflict(
                    "request has passed its deadline",
                    current,
                ));
            }
            if current.has_decided(approver_id) {
                let reason = format!("{approver_id} has already decided on this request");
                return Err(GovernanceError::approval_conflict(reason, current));
            }
            if !current.is_eligible_approver(approver_id) {
                let reason = format!("{approver_id} requested this approval and cannot decide it");
                return Err(GovernanceError::approval_conflict(reason, current));
            }

            let mut next = current.clone();
            next.decisions
                .push(Decision::new(approver_id, verdict, comment.clone(), now));
            match next.evaluate() {
                ApprovalStatus::Approved => next.resolve(ApprovalStatus::Approved, "quorum reached", now),
                ApprovalStatus::Rejected => {
                    next.resolve(ApprovalStatus::Rejected, format!("rejected by {approver_id}"), now)
                }
                _ => {}
            }

            match self.repo.compare_and_swap(current.version, next).await? {
                CasOutcome::Swapped(stored) => {
                    if let Err(e) = self
                        .audit_decision(&stored, approver_id, verdict, comment.as_deref())
                        .await
                    {
                        warn!(request_id = %stored.id, error = %e, "decision committed but not audited");
                        return Err(GovernanceError::UnauditedDecision {
                            request: Box::new(stored),
                            source: Box::new(e),
                        });
                    }
                    obs::emit_approval_decided(
                        &stored.id,
                        approver_id,
                        verdict.as_str(),
                        stored.status.as_str(),
                    );
                    return Ok(stored);
                }
                CasOutcome::Stale(latest) => {
                    debug!(request_id = %id, "stale approval version, retrying");
                    current = latest;
                }
            }
        }
        Err(GovernanceError::approval_conflict(
            "too much concurrent contention on request",
            current,
        ))
    }

    /// Transition a pending request to `expired`.
    ///
    /// Used for fail-closed timeouts and for withdrawing a request whose
    /// workflow was cancelled. Auditing is left to the caller.
    pub async fn expire(&self, id: &str, reason: &str) -> Result<ApprovalRequest> {
        self.transition(id, |current| {
            let mut next = current.clone();
            next.resolve(ApprovalStatus::Expired, reason, Utc::now());
            Ok(next)
        })
        .await
    }

    /// Flag a pending request as escalated. `Conflict` if it already is.
    pub async fn mark_escalated(&self, id: &str) -> Result<ApprovalRequest> {
        self.transition(id, |current| {
            if current.escalated {
                return Err("request was already escalated".to_string());
            }
            let mut next = current.clone();
            next.escalated = true;
            Ok(next)
        })
        .await
    }

    /// Swap loop for pending-only transitions. `apply` returns the next state
    /// or a conflict reason.
    async fn transition<F>(&self, id: &str, apply: F) -> Result<ApprovalRequest>
    where
        F: Fn(&ApprovalRequest) -> std::result::Result<ApprovalRequest, String>,
    {
        let mut current = self.get(id).await?;
        for _ in 0..MAX_CAS_ATTEMPTS {
            if current.status.is_terminal() {
                let reason = format!("request is already {}", current.status);
                return Err(GovernanceError::approval_conflict(reason, current));
            }
            let next = match apply(&current) {
                Ok(next) => next,
                Err(reason) => return Err(GovernanceError::approval_conflict(reason, current)),
            };
            match self.repo.compare_and_swap(current.version, next).await? {
                CasOutcome::Swapped(stored) => return Ok(stored),
                CasOutcome::Stale(latest) => current = latest,
            }
        }
        Err(GovernanceError::approval_conflict(
            "too much concurrent contention on request",
            current,
        ))
    }

    async fn audit_decision(
        &self,
        request: &ApprovalRequest,
        approver_id: &str,
        verdict: Verdict,
        comment: Option<&str>,
    ) -> Result<()> {
        let outcome = match verdict {
            Verdict::Approved => AuditOutcome::Allowed,
            Verdict::Rejected => AuditOutcome::Denied,
        };
        let mut draft = AuditDraft::new(AuditEventType::DecisionSubmitted, approver_id)
            .assessment(request.assessment_id)
            .approval(&request.id)
            .risk_level(request.risk_level)
            .action(&request.action_type)
            .outcome(outcome)
            .details(json!({
                "verdict": verdict.as_str(),
                "comment": comment,
                "status": request.status,
                "approvals": request.approval_count(),
                "required_approvals": request.required_approvals,
            }));
        draft.tenant_id = request.tenant_id.clone();
        self.audit.log(draft).await?;

        if request.status.is_terminal() {
            let outcome = if request.status.allows_proceed() {
                AuditOutcome::Allowed
            } else {
                AuditOutcome::Denied
            };
            let mut draft = AuditDraft::new(AuditEventType::ApprovalResolved, approver_id)
                .assessment(request.assessment_id)
                .approval(&request.id)
                .risk_level(request.risk_level)
                .action(&request.action_type)
                .outcome(outcome)
                .details(json!({
                    "status": request.status,
                    "reason": request.resolution_reason,
                    "decisions": request.decisions.len(),
                }));
            draft.tenant_id = request.tenant_id.clone();
            self.audit.log(draft).await?;
        }
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<ApprovalRequest> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| GovernanceError::not_found("approval", id))
    }

    /// Requests filtered by status and by approver. An approver matches a
    /// request they decided on or one still awaiting their decision.
    pub async fn list(
        &self,
        status: Option<ApprovalStatus>,
        approver_id: Option<&str>,
    ) -> Result<Vec<ApprovalRequest>> {
        let all = self.repo.list().await?;
        Ok(all
            .into_iter()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .filter(|r| approver_id.map_or(true, |a| r.has_decided(a) || r.awaits(a)))
            .collect())
    }

    /// Pending requests, optionally only those `approver_id` has not yet
    /// decided on.
    pub async fn get_pending(&self, approver_id: Option<&str>) -> Result<Vec<ApprovalRequest>> {
        let all = self.repo.list().await?;
        Ok(all
            .into_iter()
            .filter(|r| r.status == ApprovalStatus::Pending)
            .filter(|r| approver_id.map_or(true, |a| r.awaits(a)))
            .collect())
    }

    pub async fn stats(&self) -> Result<ApprovalStats> {
        let all = self.repo.list().await?;
        Ok(ApprovalStats::from_requests(&all))
    }
}
