//! Approval requests, decisions and the pure quorum rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::risk::{RiskAssessment, RiskLevel};

/// Lifecycle status of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Waiting for the required approvals.
    Pending,
    /// Quorum of approvals reached.
    Approved,
    /// Vetoed by a reviewer.
    Rejected,
    /// Timed out or withdrawn without a decision. Never an implicit allow.
    Expired,
}

impl ApprovalStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn allows_proceed(self) -> bool {
        matches!(self, Self::Approved)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApprovalStatus {
    type Err = crate::domain::GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "expired" => Ok(Self::Expired),
            other => Err(crate::domain::GovernanceError::InvalidInput(format!(
                "unknown approval status: {other}"
            ))),
        }
    }
}

/// One approver's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    Rejected,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for Verdict {
    type Err = crate::domain::GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" | "approve" => Ok(Self::Approved),
            "rejected" | "reject" => Ok(Self::Rejected),
            other => Err(crate::domain::GovernanceError::InvalidInput(format!(
                "unknown verdict: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub approver_id: String,
    pub verdict: Verdict,
    pub comment: Option<String>,
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    pub fn new(
        approver_id: impl Into<String>,
        verdict: Verdict,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            approver_id: approver_id.into(),
            verdict,
            comment,
            decided_at: now,
        }
    }
}

/// A human-approval request raised for one risk assessment.
///
/// Mutates only by appending decisions or transitioning status, always
/// through a version-checked swap in the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: String,
    pub assessment_id: Uuid,
    pub risk_level: RiskLevel,
    pub requested_by: String,
    pub tenant_id: Option<String>,
    pub action_type: String,
    pub summary: String,
    pub details: Option<String>,
    pub artifacts: Vec<String>,
    pub status: ApprovalStatus,
    pub required_approvals: u32,
    pub decisions: Vec<Decision>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Bumped by the repository on every successful swap.
    pub version: u64,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_reason: Option<String>,
    /// Set once admins have been notified.
    pub escalated: bool,
}

impl ApprovalRequest {
    pub fn new(
        assessment: &RiskAssessment,
        summary: impl Into<String>,
        details: Option<String>,
        artifacts: Vec<String>,
        now: DateTime<Utc>,
        timeout: chrono::Duration,
    ) -> crate::domain::Result<Self> {
        let expires_at = now.checked_add_signed(timeout).ok_or_else(|| {
            crate::domain::GovernanceError::InvalidInput(format!(
                "approval timeout of {}s is out of range",
                timeout.num_seconds()
            ))
        })?;
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            assessment_id: assessment.id(),
            risk_level: assessment.level(),
            requested_by: assessment.context().user_id.clone(),
            tenant_id: assessment.context().tenant_id.clone(),
            action_type: assessment.action().action_type.clone(),
            summary: summary.into(),
            details,
            artifacts,
            status: ApprovalStatus::Pending,
            required_approvals: required_approvals_for(assessment.level()),
            decisions: Vec::new(),
            created_at: now,
            expires_at,
            version: 0,
            resolved_at: None,
            resolution_reason: None,
            escalated: false,
        })
    }

    pub fn approval_count(&self) -> u32 {
        self.decisions
            .iter()
            .filter(|d| d.verdict == Verdict::Approved)
            .count() as u32
    }

    pub fn has_decided(&self, approver_id: &str) -> bool {
        self.decisions.iter().any(|d| d.approver_id == approver_id)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Requesters never decide on their own request.
    pub fn is_eligible_approver(&self, approver_id: &str) -> bool {
        approver_id != self.requested_by
    }

    /// Whether `approver_id` could still act on this request.
    pub fn awaits(&self, approver_id: &str) -> bool {
        self.status == ApprovalStatus::Pending
            && self.is_eligible_approver(approver_id)
            && !self.has_decided(approver_id)
    }

    /// Status implied by the current decisions. Any rejection vetoes.
    pub fn evaluate(&self) -> ApprovalStatus {
        if self.status.is_terminal() {
            return self.status;
        }
        if self
            .decisions
            .iter()
            .any(|d| d.verdict == Verdict::Rejected)
        {
            return ApprovalStatus::Rejected;
        }
        if self.approval_count() >= self.required_approvals {
            return ApprovalStatus::Approved;
        }
        ApprovalStatus::Pending
    }

    /// Move to a terminal status.
    pub fn resolve(&mut self, status: ApprovalStatus, reason: impl Into<String>, now: DateTime<Utc>) {
        self.status = status;
        self.resolved_at = Some(now);
        self.resolution_reason = Some(reason.into());
    }
}

/// Critical actions need two distinct approvers; everything else one.
pub fn required_approvals_for(level: RiskLevel) -> u32 {
    match level {
        RiskLevel::Critical => 2,
        _ => 1,
    }
}

/// Read-only aggregate over all requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalStats {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub expired: usize,
    /// Mean time from request creation to each decision. `None` before the
    /// first decision.
    pub mean_decision_latency_ms: Option<f64>,
}

impl ApprovalStats {
    pub fn from_requests<'a>(requests: impl IntoIterator<Item = &'a ApprovalRequest>) -> Self {
        let mut stats = Self::default();
        let mut latency_total = 0i64;
        let mut latency_count = 0u32;
        for r in requests {
            match r.status {
                ApprovalStatus::Pending => stats.pending += 1,
                ApprovalStatus::Approved => stats.approved += 1,
                ApprovalStatus::Rejected => stats.rejected += 1,
                ApprovalStatus::Expired => stats.expired += 1,
            }
            for d in &r.decisions {
                latency_total += (d.decided_at - r.created_at).num_milliseconds();
                latency_count += 1;
            }
        }
        if latency_count > 0 {
            stats.mean_decision_latency_ms = Some(latency_total as f64 / f64::from(latency_count));
        }
        stats
    }

    pub fn total(&self) -> usize {
        self.pending + self.approved + self.rejected + self.expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::{Action, Context, DataClassification, Environment, Impact, RiskAssessor, Scope};

    fn request(critical: bool) -> ApprovalRequest {
        let (env, tier, scope, impact) = if critical {
            (Environment::Production, 4, Scope::SystemWide, Impact::High)
        } else {
            (Environment::Production, 3, Scope::SingleUnit, Impact::High)
        };
        let assessment = RiskAssessor::new()
            .assess(
                &Context::new(env, DataClassification::new(tier).unwrap(), scope, "alice"),
                &Action::new("deploy", "api", false, impact),
            )
            .unwrap();
        ApprovalRequest::new(
            &assessment,
            "ship it",
            None,
            vec![],
            Utc::now(),
            chrono::Duration::seconds(60),
        )
        .unwrap()
    }

    #[test]
    fn test_new_request_is_pending() {
        let r = request(true);
        assert_eq!(r.status, ApprovalStatus::Pending);
        assert_eq!(r.required_approvals, 2);
        assert_eq!(r.version, 0);
        assert_eq!(r.expires_at - r.created_at, chrono::Duration::seconds(60));
    }

    #[test]
    fn test_out_of_range_timeout_is_rejected() {
        let assessment = RiskAssessor::new()
            .assess(
                &Context::new(
                    Environment::Production,
                    DataClassification::new(4).unwrap(),
                    Scope::SystemWide,
                    "alice",
                ),
                &Action::new("deploy", "api", false, Impact::High),
            )
            .unwrap();
        let err = ApprovalRequest::new(
            &assessment,
            "ship it",
            None,
            vec![],
            Utc::now(),
            chrono::Duration::days(1_000_000_000),
        )
        .unwrap_err();
        assert!(matches!(err, crate::domain::GovernanceError::InvalidInput(_)));
    }

    #[test]
    fn test_awaits_excludes_requester_and_deciders() {
        let mut r = request(true);
        assert!(r.awaits("bob"));
        assert!(!r.awaits("alice"));
        r.decisions
            .push(Decision::new("bob", Verdict::Approved, None, Utc::now()));
        assert!(!r.awaits("bob"));
        assert!(r.awaits("carol"));
    }

    #[test]
    fn test_non_critical_needs_one() {
        let r = request(false);
        assert_eq!(r.risk_level, RiskLevel::High);
        assert_eq!(r.required_approvals, 1);
    }

    #[test]
    fn test_quorum_evaluation() {
        let mut r = request(true);
        r.decisions
            .push(Decision::new("bob", Verdict::Approved, None, Utc::now()));
        assert_eq!(r.evaluate(), ApprovalStatus::Pending);
        r.decisions
            .push(Decision::new("carol", Verdict::Approved, None, Utc::now()));
        assert_eq!(r.evaluate(), ApprovalStatus::Approved);
    }

    #[test]
    fn test_rejection_vetoes() {
        let mut r = request(true);
        r.decisions
            .push(Decision::new("bob", Verdict::Approved, None, Utc::now()));
        r.decisions
            .push(Decision::new("carol", Verdict::Rejected, None, Utc::now()));
        assert_eq!(r.evaluate(), ApprovalStatus::Rejected);
    }

    #[test]
    fn test_stats() {
        let mut a = request(false);
        a.decisions.push(Decision::new(
            "bob",
            Verdict::Approved,
            None,
            a.created_at + chrono::Duration::milliseconds(400),
        ));
        a.resolve(ApprovalStatus::Approved, "quorum reached", Utc::now());
        let b = request(false);
        let stats = ApprovalStats::from_requests([&a, &b]);
        assert_eq!(stats.approved, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.total(), 2);
        assert_eq!(stats.mean_decision_latency_ms, Some(400.0));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("expired".parse::<ApprovalStatus>().unwrap(), ApprovalStatus::Expired);
        assert!("maybe".parse::<Verdict>().is_err());
    }
}
