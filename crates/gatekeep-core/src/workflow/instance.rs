//! Workflow instances and their stage results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::risk::RiskLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowStatus {
    Running,
    /// Suspended on a pending approval request; no stage may run.
    AwaitingApproval,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::AwaitingApproval => "awaiting-approval",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = crate::domain::GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "awaiting-approval" | "awaiting_approval" => Ok(Self::AwaitingApproval),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(crate::domain::GovernanceError::InvalidInput(format!(
                "unknown workflow status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
    pub name: String,
    pub status: StageStatus,
    pub tokens_used: u64,
    /// Stage output after redaction.
    pub output: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInstance {
    pub id: String,
    pub workflow_type: String,
    pub input: Value,
    pub user_id: String,
    pub tenant_id: Option<String>,
    pub status: WorkflowStatus,
    /// Results in execution order.
    pub stages: Vec<StageResult>,
    pub tokens_used: u64,
    pub cost: f64,
    pub assessment_id: Uuid,
    pub risk_level: RiskLevel,
    pub approval_request_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    /// Bumped by the repository on every successful swap.
    pub version: u64,
}

impl WorkflowInstance {
    pub fn new(
        workflow_type: impl Into<String>,
        input: Value,
        user_id: impl Into<String>,
        tenant_id: Option<String>,
        assessment_id: Uuid,
        risk_level: RiskLevel,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_type: workflow_type.into(),
            input,
            user_id: user_id.into(),
            tenant_id,
            status: WorkflowStatus::Running,
            stages: Vec::new(),
            tokens_used: 0,
            cost: 0.0,
            assessment_id,
            risk_level,
            approval_request_id: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            failure_reason: None,
            version: 0,
        }
    }

    /// Names of stages that already completed.
    pub fn completed_stages(&self) -> impl Iterator<Item = &str> {
        self.stages
            .iter()
            .filter(|s| s.status == StageStatus::Completed)
            .map(|s| s.name.as_str())
    }

    pub fn has_completed(&self, stage: &str) -> bool {
        self.completed_stages().any(|s| s == stage)
    }

    /// Move to a terminal status.
    pub fn finish(&mut self, status: WorkflowStatus, reason: Option<String>, now: DateTime<Utc>) {
        self.status = status;
        self.failure_reason = reason;
        self.completed_at = Some(now);
        self.updated_at = now;
    }
}

/// Filter for listing instances. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowFilter {
    pub status: Option<WorkflowStatus>,
    pub workflow_type: Option<String>,
    pub user_id: Option<String>,
}

impl WorkflowFilter {
    pub fn status(mut self, status: WorkflowStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn workflow_type(mut self, workflow_type: impl Into<String>) -> Self {
        self.workflow_type = Some(workflow_type.into());
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn matches(&self, instance: &WorkflowInstance) -> bool {
        self.status.map_or(true, |s| instance.status == s)
            && self
                .workflow_type
                .as_deref()
                .map_or(true, |t| instance.workflow_type == t)
            && self.user_id.as_deref().map_or(true, |u| instance.user_id == u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> WorkflowInstance {
        WorkflowInstance::new(
            "docs-refresh",
            Value::Null,
            "alice",
            None,
            Uuid::new_v4(),
            RiskLevel::Low,
            Utc::now(),
        )
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_value(WorkflowStatus::AwaitingApproval).unwrap(),
            "awaiting-approval"
        );
        assert!(WorkflowStatus::Cancelled.is_terminal());
        assert!(!WorkflowStatus::AwaitingApproval.is_terminal());
    }

    #[test]
    fn test_filter() {
        let wf = instance();
        assert!(WorkflowFilter::default().matches(&wf));
        assert!(WorkflowFilter::default().user("alice").matches(&wf));
        assert!(!WorkflowFilter::default().user("bob").matches(&wf));
        assert!(!WorkflowFilter::default()
            .status(WorkflowStatus::Completed)
            .matches(&wf));
        assert!(WorkflowFilter::default()
            .workflow_type("docs-refresh")
            .status(WorkflowStatus::Running)
            .matches(&wf));
    }

    #[test]
    fn test_finish() {
        let mut wf = instance();
        wf.finish(WorkflowStatus::Failed, Some("boom".into()), Utc::now());
        assert!(wf.status.is_terminal());
        assert_eq!(wf.failure_reason.as_deref(), Some("boom"));
        assert!(wf.completed_at.is_some());
    }
}
