//! Gatekeep Core Library
//!
//! Governance and trust enforcement for autonomous agents: risk scoring,
//! human approval with escalation and fail-closed timeouts, sensitive data
//! redaction, a hash-chained audit trail and risk-gated workflows.
//! [`GovernanceService`] wires them together.

pub mod approval;
pub mod audit;
pub mod config;
pub mod domain;
pub mod escalation;
pub mod governance;
pub mod metrics;
pub mod obs;
pub mod privacy;
pub mod risk;
pub mod telemetry;
pub mod workflow;

pub use domain::{CasOutcome, ConflictState, GovernanceError, Result};

pub use risk::{
    Action, Context, DataClassification, Environment, Impact, RiskAssessment, RiskAssessor,
    RiskFactor, RiskLevel, Safeguards, Scope,
};

pub use approval::{
    ApprovalRepository, ApprovalRequest, ApprovalStats, ApprovalStatus, ApprovalWorkflow,
    Decision, MemoryApprovalRepository, Verdict,
};

pub use escalation::{
    ApprovalResolution, EscalationService, LogNotifier, NotificationResult, Notifier,
    RecordingNotifier, TIMEOUT_REASON,
};

pub use privacy::{Detection, FilterResult, PrivacyFilter, PrivacyRule, RuleKind};

pub use audit::{
    verify_export, AuditDraft, AuditEntry, AuditEventType, AuditExport, AuditExportReceipt,
    AuditFormat, AuditLogger, AuditOutcome, AuditQuery, AuditStore,
};

pub use workflow::{
    MemoryWorkflowRepository, SimulatedStageExecutor, StageDefinition, StageExecutor,
    StageOutput, WorkflowDefinition, WorkflowEngine, WorkflowFilter, WorkflowInstance,
    WorkflowRegistry, WorkflowRepository, WorkflowStatus,
};

pub use config::GovernanceConfig;
pub use governance::{GovernanceDeps, GovernanceService};
pub use metrics::{GovernanceMetrics, MetricsSnapshot};
