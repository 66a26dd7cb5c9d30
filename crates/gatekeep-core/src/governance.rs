//! The governance facade.
//!
//! [`GovernanceService`] owns one instance of every component, wired
//! together once at construction. Approval outcomes reach the workflow
//! engine two ways: inline from [`GovernanceService::decide`], and through
//! a resolution channel drained by a background task for timeouts.

use std::path::Path;
use std::sync::Arc;

use gatekeep_store::{AuditEntry, AuditQuery, AuditStore, MemoryAuditStore};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::approval::{
    ApprovalRepository, ApprovalRequest, ApprovalStats, ApprovalStatus, ApprovalWorkflow,
    MemoryApprovalRepository, Verdict,
};
use crate::audit::{AuditExport, AuditExportReceipt, AuditFormat, AuditLogger};
use crate::config::GovernanceConfig;
use crate::domain::{GovernanceError, Result};
use crate::escalation::{ApprovalResolution, EscalationService, LogNotifier, Notifier};
use crate::metrics::{GovernanceMetrics, MetricsSnapshot};
use crate::obs;
use crate::privacy::{FilterResult, PrivacyFilter};
use crate::risk::{Action, Context, RiskAssessment, RiskAssessor};
use crate::workflow::{
    EngineDeps, MemoryWorkflowRepository, SimulatedStageExecutor, StageExecutor, WorkflowEngine,
    WorkflowFilter, WorkflowInstance, WorkflowRegistry, WorkflowRepository,
};

/// Capabilities the service consumes.
pub struct GovernanceDeps {
    pub store: Arc<dyn AuditStore>,
    pub approvals: Arc<dyn ApprovalRepository>,
    pub workflows: Arc<dyn WorkflowRepository>,
    pub notifier: Arc<dyn Notifier>,
    pub executor: Arc<dyn StageExecutor>,
    pub registry: WorkflowRegistry,
}

impl GovernanceDeps {
    /// In-memory storage, log-only notifications, simulated stages and the
    /// built-in workflows.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(MemoryAuditStore::new()),
            approvals: Arc::new(MemoryApprovalRepository::new()),
            workflows: Arc::new(MemoryWorkflowRepository::new()),
            notifier: Arc::new(LogNotifier),
            executor: Arc::new(SimulatedStageExecutor::new()),
            registry: WorkflowRegistry::builtin(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn AuditStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn StageExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_registry(mut self, registry: WorkflowRegistry) -> Self {
        self.registry = registry;
        self
    }
}

pub struct GovernanceService {
    config: GovernanceConfig,
    assessor: Arc<RiskAssessor>,
    privacy: Arc<PrivacyFilter>,
    audit: AuditLogger,
    approvals: Arc<ApprovalWorkflow>,
    escalation: Arc<EscalationService>,
    engine: Arc<WorkflowEngine>,
    metrics: Arc<GovernanceMetrics>,
    dispatcher: AbortHandle,
}

impl GovernanceService {
    /// Validate `config` and wire every component.
    ///
    /// Must be called from within a Tokio runtime: the resolution
    /// dispatcher is spawned here.
    pub fn new(config: GovernanceConfig, deps: GovernanceDeps) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(GovernanceMetrics::new());
        let assessor = Arc::new(RiskAssessor::new());
        let privacy = Arc::new(PrivacyFilter::builder().slo(config.privacy.slo()).build()?);
        let audit = AuditLogger::new(deps.store).with_privacy_filter(Arc::clone(&privacy));
        let approvals = Arc::new(ApprovalWorkflow::new(
            deps.approvals,
            audit.clone(),
            config.approval.timeout(),
        )?);

        let (resolutions_tx, resolutions_rx) = mpsc::unbounded_channel();
        let escalation = Arc::new(EscalationService::new(
            Arc::clone(&approvals),
            audit.clone(),
            deps.notifier,
            &config.approval,
            Arc::clone(&metrics),
            resolutions_tx,
        ));

        let engine = Arc::new(WorkflowEngine::new(
            deps.registry,
            config.workflow.clone(),
            EngineDeps {
                repo: deps.workflows,
                executor: deps.executor,
                assessor: Arc::clone(&assessor),
                approvals: Arc::clone(&approvals),
                escalation: Arc::clone(&escalation),
                audit: audit.clone(),
                privacy: Arc::clone(&privacy),
                metrics: Arc::clone(&metrics),
            },
        ));

        let dispatcher =
            tokio::spawn(dispatch_resolutions(Arc::clone(&engine), resolutions_rx)).abort_handle();

        info!(
            timeout_secs = config.approval.timeout_secs,
            token_budget = config.workflow.token_budget,
            rules = privacy.rules().len(),
            "governance service ready"
        );

        Ok(Self {
            config,
            assessor,
            privacy,
            audit,
            approvals,
            escalation,
            engine,
            metrics,
            dispatcher,
        })
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    // ---- risk ----

    /// Score an action and record a `risk_assessed` entry.
    pub async fn assess(&self, context: &Context, action: &Action) -> Result<RiskAssessment> {
        let assessment = self.assessor.assess(context, action)?;
        self.metrics.inc_assessments();
        self.audit.log_assessment(&assessment).await?;
        obs::emit_risk_assessed(
            &assessment.id().to_string(),
            &context.user_id,
            assessment.score(),
            &assessment.level().to_string(),
        );
        Ok(assessment)
    }

    /// Feed an operation outcome into the user's history factor.
    pub fn record_operation_result(&self, user_id: &str, success: bool) {
        self.assessor.record_operation_result(user_id, success);
    }

    // ---- approvals ----

    /// Assess, open an approval request for the result and start its
    /// escalation timer.
    pub async fn create_approval(
        &self,
        context: &Context,
        action: &Action,
        summary: &str,
        details: Option<String>,
        artifacts: Vec<String>,
    ) -> Result<ApprovalRequest> {
        let assessment = self.assess(context, action).await?;
        let request = self
            .approvals
            .create_request(&assessment, summary, details, artifacts)
            .await?;
        self.metrics.inc_approvals_requested();
        self.escalation.watch(&request);
        Ok(request)
    }

    pub async fn list_approvals(
        &self,
        status: Option<ApprovalStatus>,
        approver_id: Option<&str>,
    ) -> Result<Vec<ApprovalRequest>> {
        self.approvals.list(status, approver_id).await
    }

    pub async fn pending_approvals(&self, approver_id: Option<&str>) -> Result<Vec<ApprovalRequest>> {
        self.approvals.get_pending(approver_id).await
    }

    pub async fn get_approval(&self, id: &str) -> Result<ApprovalRequest> {
        self.approvals.get(id).await
    }

    /// Submit a decision. When it resolves the request the escalation timer
    /// is stopped and a gated workflow is resumed or cancelled before this
    /// returns.
    ///
    /// A committed decision whose audit write failed still stops the timer
    /// and moves the workflow; the `UnauditedDecision` error is returned
    /// afterwards.
    pub async fn decide(
        &self,
        id: &str,
        approver_id: &str,
        verdict: Verdict,
        comment: Option<String>,
    ) -> Result<ApprovalRequest> {
        let (request, audit_failure) = match self
            .approvals
            .submit_decision(id, approver_id, verdict, comment)
            .await
        {
            Ok(request) => (request, None),
            Err(GovernanceError::UnauditedDecision { request, source }) => {
                let committed = (*request).clone();
                (
                    committed,
                    Some(GovernanceError::UnauditedDecision { request, source }),
                )
            }
            Err(e) => return Err(e),
        };
        self.metrics.inc_decisions();

        if request.status.is_terminal() {
            self.escalation.resolve(&request.id);
            match self
                .engine
                .on_approval_decision(&request.id, request.status.allows_proceed())
                .await
            {
                Ok(instance) => {
                    debug!(workflow_id = %instance.id, status = %instance.status, "gated workflow moved")
                }
                Err(GovernanceError::NotFound { .. }) => {}
                Err(e) => {
                    warn!(request_id = %request.id, error = %e, "gated workflow did not follow decision")
                }
            }
        }
        match audit_failure {
            Some(e) => Err(e),
            None => Ok(request),
        }
    }

    /// Escalate a pending request by hand.
    pub async fn escalate_approval(&self, id: &str, reason: &str) -> Result<ApprovalRequest> {
        let request = self.approvals.get(id).await?;
        self.escalation.escalate_approval(&request, reason).await
    }

    pub async fn approval_stats(&self) -> Result<ApprovalStats> {
        self.approvals.stats().await
    }

    // ---- workflows ----

    pub async fn start_workflow(&self, workflow_type: &str, input: Value, user_id: &str) -> Result<WorkflowInstance> {
        self.engine.start(workflow_type, input, user_id).await
    }

    pub async fn list_workflows(&self, filter: &WorkflowFilter) -> Result<Vec<WorkflowInstance>> {
        self.engine.list(filter).await
    }

    pub async fn get_workflow(&self, id: &str) -> Result<WorkflowInstance> {
        self.engine.get(id).await
    }

    pub async fn cancel_workflow(&self, id: &str, user_id: &str) -> Result<WorkflowInstance> {
        self.engine.cancel(id, user_id).await
    }

    /// Registered workflow type names, sorted.
    pub fn workflow_types(&self) -> Vec<String> {
        self.engine
            .registry()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    // ---- privacy ----

    pub fn filter_text(&self, text: &str) -> FilterResult {
        let result = self.privacy.filter(text);
        self.metrics.add_redactions(result.detections.len() as u64);
        if result.blocked {
            self.metrics.inc_blocked_filters();
            obs::emit_privacy_blocked("filter_text", result.detections.len());
        }
        result
    }

    // ---- audit ----

    pub async fn query_audit(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>> {
        self.audit.query(query).await
    }

    pub async fn export_audit(&self, format: AuditFormat) -> Result<AuditExport> {
        self.audit.export(format).await
    }

    pub async fn write_audit_export(&self, dir: &Path, format: AuditFormat) -> Result<AuditExportReceipt> {
        self.audit.write_export(dir, format).await
    }

    pub async fn verify_audit_chain(&self) -> Result<()> {
        self.audit.verify_chain().await
    }

    // ---- metrics ----

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn flush_metrics(&self) {
        self.metrics.flush();
    }
}

impl Drop for GovernanceService {
    fn drop(&mut self) {
        self.dispatcher.abort();
        self.escalation.shutdown();
    }
}

async fn dispatch_resolutions(
    engine: Arc<WorkflowEngine>,
    mut resolutions: mpsc::UnboundedReceiver<ApprovalResolution>,
) {
    while let Some(resolution) = resolutions.recv().await {
        match engine
            .on_approval_decision(&resolution.request_id, resolution.approved)
            .await
        {
            Ok(instance) => debug!(
                workflow_id = %instance.id,
                status = %instance.status,
                reason = %resolution.reason,
                "workflow followed approval resolution"
            ),
            // Standalone approval with no workflow behind it.
            Err(GovernanceError::NotFound { .. }) => {}
            Err(e) => warn!(
                request_id = %resolution.request_id,
                error = %e,
                "failed to apply approval resolution"
            ),
        }
    }
}
