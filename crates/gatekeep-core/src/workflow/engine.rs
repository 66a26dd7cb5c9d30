//! Workflow orchestration.
//!
//! A run is assessed before anything executes. When the assessment demands
//! approval the instance is stored already `awaiting-approval` and linked to
//! its request, so no stage can run until a decision arrives through
//! [`WorkflowEngine::on_approval_decision`]. Stage progress is committed with
//! a version-checked swap; a swap that loses to a cancellation stops the run.

use std::sync::Arc;

use chrono::Utc;
use gatekeep_store::{AuditDraft, AuditEventType, AuditOutcome};
use serde_json::{json, Value};
use tracing::{debug, info, warn, Instrument};

use super::definition::{StageDefinition, WorkflowDefinition, WorkflowRegistry};
use super::executor::StageExecutor;
use super::instance::{StageResult, StageStatus, WorkflowFilter, WorkflowInstance, WorkflowStatus};
use super::repository::WorkflowRepository;
use crate::approval::ApprovalWorkflow;
use crate::audit::AuditLogger;
use crate::config::WorkflowConfig;
use crate::domain::{CasOutcome, GovernanceError, Result};
use crate::escalation::EscalationService;
use crate::metrics::GovernanceMetrics;
use crate::obs;
use crate::privacy::PrivacyFilter;
use crate::risk::RiskAssessor;

const MAX_CAS_ATTEMPTS: usize = 64;

/// Actor recorded when an approval outcome moves an instance.
pub const APPROVAL_ACTOR: &str = "system:approval";

/// Collaborators the engine drives.
pub struct EngineDeps {
    pub repo: Arc<dyn WorkflowRepository>,
    pub executor: Arc<dyn StageExecutor>,
    pub assessor: Arc<RiskAssessor>,
    pub approvals: Arc<ApprovalWorkflow>,
    pub escalation: Arc<EscalationService>,
    pub audit: AuditLogger,
    pub privacy: Arc<PrivacyFilter>,
    pub metrics: Arc<GovernanceMetrics>,
}

pub struct WorkflowEngine {
    registry: WorkflowRegistry,
    config: WorkflowConfig,
    repo: Arc<dyn WorkflowRepository>,
    executor: Arc<dyn StageExecutor>,
    assessor: Arc<RiskAssessor>,
    approvals: Arc<ApprovalWorkflow>,
    escalation: Arc<EscalationService>,
    audit: AuditLogger,
    privacy: Arc<PrivacyFilter>,
    metrics: Arc<GovernanceMetrics>,
}

/// How a run of stages ended.
enum RunEnd {
    Completed,
    Failed { stage: Option<String>, reason: String },
}

impl WorkflowEngine {
    pub fn new(registry: WorkflowRegistry, config: WorkflowConfig, deps: EngineDeps) -> Self {
        Self {
            registry,
            config,
            repo: deps.repo,
            executor: deps.executor,
            assessor: deps.assessor,
            approvals: deps.approvals,
            escalation: deps.escalation,
            audit: deps.audit,
            privacy: deps.privacy,
            metrics: deps.metrics,
        }
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    /// Start a run of `workflow_type`.
    ///
    /// Returns the instance as it stands when control comes back: either
    /// `awaiting-approval`, or terminal after every stage ran (or one failed).
    pub async fn start(&self, workflow_type: &str, input: Value, user_id: &str) -> Result<WorkflowInstance> {
        if user_id.trim().is_empty() {
            return Err(GovernanceError::InvalidInput(
                "user id must not be empty".into(),
            ));
        }
        let definition = self.registry.get(workflow_type).ok_or_else(|| {
            GovernanceError::InvalidInput(format!("unknown workflow type: {workflow_type}"))
        })?;
        let (context, action) = definition.effective_risk(&input, user_id)?;

        let assessment = self.assessor.assess(&context, &action)?;
        self.metrics.inc_assessments();
        self.audit.log_assessment(&assessment).await?;
        obs::emit_risk_assessed(
            &assessment.id().to_string(),
            user_id,
            assessment.score(),
            &assessment.level().to_string(),
        );

        let mut instance = WorkflowInstance::new(
            &definition.name,
            input,
            user_id,
            context.tenant_id.clone(),
            assessment.id(),
            assessment.level(),
            Utc::now(),
        );

        let gate = if assessment.requires_approval() {
            let stages: Vec<String> = definition.stages.iter().map(|s| s.name.clone()).collect();
            let request = self
                .approvals
                .create_request(
                    &assessment,
                    &format!("{} requested by {}", definition.name, user_id),
                    Some(definition.description.clone()),
                    stages,
                )
                .await?;
            self.metrics.inc_approvals_requested();
            self.escalation.watch(&request);
            instance.status = WorkflowStatus::AwaitingApproval;
            instance.approval_request_id = Some(request.id.clone());
            Some(request)
        } else {
            None
        };

        if let Err(e) = self.repo.insert(instance.clone()).await {
            if let Some(request) = &gate {
                self.withdraw_request(&request.id, "workflow could not be stored")
                    .await;
            }
            return Err(e);
        }
        let started = self
            .audit
            .log(
                self.draft(AuditEventType::WorkflowStarted, user_id, &instance)
                    .outcome(if gate.is_some() {
                        AuditOutcome::Pending
                    } else {
                        AuditOutcome::Allowed
                    })
                    .details(json!({
                        "workflow_type": instance.workflow_type,
                        "stages": definition.stages.len(),
                        "score": assessment.score(),
                        "status": instance.status,
                    })),
            )
            .await;
        if let Err(e) = started {
            self.abandon(&instance.id, &e).await;
            if let Some(request) = &gate {
                self.withdraw_request(&request.id, "workflow start could not be audited")
                    .await;
            }
            return Err(e);
        }

        if let Some(request) = gate {
            info!(
                workflow_id = %instance.id,
                request_id = %request.id,
                level = %assessment.level(),
                "workflow awaiting approval"
            );
            return Ok(instance);
        }

        self.run(instance, definition).await
    }

    /// Resume (`approved`) or cancel (`!approved`) the instance gated on
    /// `request_id`.
    pub async fn on_approval_decision(&self, request_id: &str, approved: bool) -> Result<WorkflowInstance> {
        let instance = self
            .repo
            .find_by_approval(request_id)
            .await?
            .ok_or_else(|| GovernanceError::not_found("workflow", request_id))?;

        if !approved {
            let reason = match self.approvals.get(request_id).await {
                Ok(request) => request
                    .resolution_reason
                    .unwrap_or_else(|| format!("approval {}", request.status)),
                Err(_) => "request unavailable".to_string(),
            };
            let reason = format!("approval denied: {reason}");
            let cancelled = self
                .transition(&instance.id, |current| {
                    if current.status != WorkflowStatus::AwaitingApproval {
                        return Err(format!("workflow is {}, not awaiting approval", current.status));
                    }
                    let mut next = current.clone();
                    next.finish(WorkflowStatus::Cancelled, Some(reason.clone()), Utc::now());
                    Ok(next)
                })
                .await?;
            self.audit
                .log(
                    self.draft(AuditEventType::WorkflowCancelled, APPROVAL_ACTOR, &cancelled)
                        .outcome(AuditOutcome::Denied)
                        .details(json!({ "reason": cancelled.failure_reason })),
                )
                .await?;
            info!(workflow_id = %cancelled.id, request_id = %request_id, "workflow cancelled by approval outcome");
            return Ok(cancelled);
        }

        let resumed = self
            .transition(&instance.id, |current| {
                if current.status != WorkflowStatus::AwaitingApproval {
                    return Err(format!("workflow is {}, not awaiting approval", current.status));
                }
                let mut next = current.clone();
                next.status = WorkflowStatus::Running;
                next.updated_at = Utc::now();
                Ok(next)
            })
            .await?;
        let Some(definition) = self.registry.get(&resumed.workflow_type) else {
            let e = GovernanceError::Internal(format!(
                "workflow type {} is no longer registered",
                resumed.workflow_type
            ));
            self.abandon(&resumed.id, &e).await;
            return Err(e);
        };
        info!(workflow_id = %resumed.id, request_id = %request_id, "workflow resumed after approval");
        self.run(resumed, definition).await
    }

    /// Cancel a running or waiting instance. `Conflict` if already terminal.
    pub async fn cancel(&self, id: &str, user_id: &str) -> Result<WorkflowInstance> {
        if user_id.trim().is_empty() {
            return Err(GovernanceError::InvalidInput(
                "user id must not be empty".into(),
            ));
        }
        let reason = format!("cancelled by {user_id}");
        let cancelled = self
            .transition(id, |current| {
                let mut next = current.clone();
                next.finish(WorkflowStatus::Cancelled, Some(reason.clone()), Utc::now());
                Ok(next)
            })
            .await?;

        if let Some(request_id) = &cancelled.approval_request_id {
            self.escalation.resolve(request_id);
            match self.approvals.expire(request_id, "workflow cancelled").await {
                Ok(_) => {}
                Err(e) if e.is_conflict() => {}
                Err(e) => return Err(e),
            }
        }

        self.audit
            .log(
                self.draft(AuditEventType::WorkflowCancelled, user_id, &cancelled)
                    .outcome(AuditOutcome::Recorded)
                    .details(json!({ "reason": cancelled.failure_reason })),
            )
            .await?;
        info!(workflow_id = %cancelled.id, user_id = %user_id, "workflow cancelled");
        Ok(cancelled)
    }

    pub async fn get(&self, id: &str) -> Result<WorkflowInstance> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| GovernanceError::not_found("workflow", id))
    }

    pub async fn list(&self, filter: &WorkflowFilter) -> Result<Vec<WorkflowInstance>> {
        self.repo.list(filter).await
    }

    /// Run the remaining stages. Any error that escapes mid-run fails the
    /// instance before it is returned, so no run is left `running`.
    async fn run(&self, instance: WorkflowInstance, definition: &WorkflowDefinition) -> Result<WorkflowInstance> {
        let span = obs::workflow_span(&instance.id, &instance.workflow_type);
        let id = instance.id.clone();
        match self.run_stages(instance, definition).instrument(span).await {
            Ok(done) => Ok(done),
            Err(e) => {
                self.abandon(&id, &e).await;
                Err(e)
            }
        }
    }

    /// Move a non-terminal instance to `failed` after `error` cut its run
    /// short. Already-terminal instances are left alone.
    async fn abandon(&self, id: &str, error: &GovernanceError) {
        let reason = format!("run aborted: {error}");
        let failed = self
            .transition(id, |current| {
                let mut next = current.clone();
                next.finish(WorkflowStatus::Failed, Some(reason.clone()), Utc::now());
                Ok(next)
            })
            .await;
        match failed {
            Ok(instance) => {
                warn!(workflow_id = %id, error = %error, "workflow failed after internal error");
                self.assessor.record_operation_result(&instance.user_id, false);
                let logged = self
                    .audit
                    .log(
                        self.draft(AuditEventType::WorkflowFailed, &instance.user_id, &instance)
                            .outcome(AuditOutcome::Error)
                            .details(json!({ "reason": instance.failure_reason })),
                    )
                    .await;
                if let Err(e) = logged {
                    debug!(workflow_id = %id, error = %e, "failure of aborted run not audited");
                }
            }
            Err(e) if e.is_conflict() => {}
            Err(e) => warn!(workflow_id = %id, error = %e, "could not fail aborted workflow"),
        }
    }

    /// Stop the timer of a request whose workflow never got going and close
    /// the request.
    async fn withdraw_request(&self, request_id: &str, reason: &str) {
        self.escalation.resolve(request_id);
        match self.approvals.expire(request_id, reason).await {
            Ok(_) => {}
            Err(e) if e.is_conflict() => {}
            Err(e) => warn!(request_id = %request_id, error = %e, "could not withdraw approval request"),
        }
    }

    async fn run_stages(
        &self,
        mut instance: WorkflowInstance,
        definition: &WorkflowDefinition,
    ) -> Result<WorkflowInstance> {
        let mut end = RunEnd::Completed;
        for stage in &definition.stages {
            if instance.has_completed(&stage.name) {
                continue;
            }
            let projected = instance.tokens_used.saturating_add(stage.token_cost);
            if projected > self.config.token_budget {
                end = RunEnd::Failed {
                    stage: Some(stage.name.clone()),
                    reason: format!(
                        "token budget exceeded: stage {} needs {} tokens, {} of {} used",
                        stage.name, stage.token_cost, instance.tokens_used, self.config.token_budget
                    ),
                };
                break;
            }

            self.audit
                .log(
                    self.draft(AuditEventType::WorkflowStageStarted, &instance.user_id, &instance)
                        .outcome(AuditOutcome::Recorded)
                        .details(json!({
                            "stage": stage.name,
                            "token_cost": stage.token_cost,
                            "side_effects": stage.side_effects,
                        })),
                )
                .await?;

            let (result, failure) = self.execute_stage(&instance, stage).await;
            let tokens = result.tokens_used;
            let success = result.status == StageStatus::Completed;

            let mut next = instance.clone();
            next.tokens_used = next.tokens_used.saturating_add(tokens);
            next.cost = self.cost_of(next.tokens_used);
            next.updated_at = result.completed_at;
            next.stages.push(result);
            instance = match self.commit(&instance, next).await? {
                Some(stored) => stored,
                None => return self.get(&instance.id).await,
            };

            obs::emit_workflow_stage(&instance.id, &stage.name, tokens, success);
            self.audit
                .log(
                    self.draft(AuditEventType::WorkflowStageCompleted, &instance.user_id, &instance)
                        .outcome(if success {
                            AuditOutcome::Allowed
                        } else {
                            AuditOutcome::Error
                        })
                        .details(json!({
                            "stage": stage.name,
                            "tokens_used": tokens,
                            "total_tokens": instance.tokens_used,
                            "success": success,
                        })),
                )
                .await?;

            if let Some(reason) = failure {
                end = RunEnd::Failed {
                    stage: Some(stage.name.clone()),
                    reason,
                };
                break;
            }
            if instance.tokens_used > self.config.token_budget {
                end = RunEnd::Failed {
                    stage: Some(stage.name.clone()),
                    reason: format!(
                        "token budget exceeded: {} of {} used",
                        instance.tokens_used, self.config.token_budget
                    ),
                };
                break;
            }
        }
        self.finish_run(instance, end).await
    }

    /// Execute one stage, redacting its output. The second value is the
    /// failure reason when the stage must fail the run.
    async fn execute_stage(
        &self,
        instance: &WorkflowInstance,
        stage: &StageDefinition,
    ) -> (StageResult, Option<String>) {
        let started_at = Utc::now();
        let outcome = self.executor.execute(instance, stage).await;
        let completed_at = Utc::now();

        let output = match outcome {
            Ok(output) => output,
            Err(e) => {
                let reason = self.privacy.filter(&format!("stage {} failed: {e}", stage.name)).filtered;
                return (
                    StageResult {
                        name: stage.name.clone(),
                        status: StageStatus::Failed,
                        tokens_used: 0,
                        output: None,
                        error: Some(reason.clone()),
                        started_at,
                        completed_at,
                    },
                    Some(reason),
                );
            }
        };

        let mut failure = None;
        let redacted = output.output.map(|text| {
            let result = self.privacy.filter(&text);
            self.metrics.add_redactions(result.detections.len() as u64);
            if result.blocked {
                self.metrics.inc_blocked_filters();
                obs::emit_privacy_blocked(&stage.name, result.detections.len());
                failure = Some(format!("stage {} output contained secrets", stage.name));
            }
            result.filtered
        });

        let status = if failure.is_some() {
            StageStatus::Failed
        } else {
            StageStatus::Completed
        };
        (
            StageResult {
                name: stage.name.clone(),
                status,
                tokens_used: output.tokens_used,
                output: redacted,
                error: failure.clone(),
                started_at,
                completed_at,
            },
            failure,
        )
    }

    async fn finish_run(&self, instance: WorkflowInstance, end: RunEnd) -> Result<WorkflowInstance> {
        let now = Utc::now();
        let mut next = instance.clone();
        let (event, outcome, details, success) = match &end {
            RunEnd::Completed => {
                next.finish(WorkflowStatus::Completed, None, now);
                (
                    AuditEventType::WorkflowCompleted,
                    AuditOutcome::Allowed,
                    json!({
                        "stages": next.stages.len(),
                        "tokens_used": next.tokens_used,
                        "cost": next.cost,
                    }),
                    true,
                )
            }
            RunEnd::Failed { stage, reason } => {
                next.finish(WorkflowStatus::Failed, Some(reason.clone()), now);
                (
                    AuditEventType::WorkflowFailed,
                    AuditOutcome::Error,
                    json!({
                        "stage": stage,
                        "reason": reason,
                        "tokens_used": next.tokens_used,
                    }),
                    false,
                )
            }
        };

        let Some(stored) = self.commit(&instance, next).await? else {
            return self.get(&instance.id).await;
        };
        self.assessor.record_operation_result(&stored.user_id, success);
        self.audit
            .log(
                self.draft(event, &stored.user_id, &stored)
                    .outcome(outcome)
                    .details(details),
            )
            .await?;
        debug!(workflow_id = %stored.id, status = %stored.status, "workflow run finished");
        Ok(stored)
    }

    /// Swap in `next`. `None` when the instance was moved to a terminal
    /// status by someone else, which ends the run.
    async fn commit(&self, current: &WorkflowInstance, next: WorkflowInstance) -> Result<Option<WorkflowInstance>> {
        match self.repo.compare_and_swap(current.version, next).await? {
            CasOutcome::Swapped(stored) => Ok(Some(stored)),
            CasOutcome::Stale(latest) if latest.status.is_terminal() => {
                debug!(workflow_id = %latest.id, status = %latest.status, "run stopped by concurrent change");
                Ok(None)
            }
            CasOutcome::Stale(latest) => Err(GovernanceError::workflow_conflict(
                "workflow changed during a run",
                latest,
            )),
        }
    }

    /// Swap loop for transitions out of a non-terminal status. `apply`
    /// returns the next state or a conflict reason.
    async fn transition<F>(&self, id: &str, apply: F) -> Result<WorkflowInstance>
    where
        F: Fn(&WorkflowInstance) -> std::result::Result<WorkflowInstance, String>,
    {
        let mut current = self.get(id).await?;
        for _ in 0..MAX_CAS_ATTEMPTS {
            if current.status.is_terminal() {
                let reason = format!("workflow is already {}", current.status);
                return Err(GovernanceError::workflow_conflict(reason, current));
            }
            let next = match apply(&current) {
                Ok(next) => next,
                Err(reason) => return Err(GovernanceError::workflow_conflict(reason, current)),
            };
            match self.repo.compare_and_swap(current.version, next).await? {
                CasOutcome::Swapped(stored) => return Ok(stored),
                CasOutcome::Stale(latest) => current = latest,
            }
        }
        Err(GovernanceError::workflow_conflict(
            "too much concurrent contention on workflow",
            current,
        ))
    }

    fn cost_of(&self, tokens: u64) -> f64 {
        tokens as f64 / 1000.0 * self.config.cost_per_1k_tokens
    }

    fn draft(&self, event: AuditEventType, actor: &str, instance: &WorkflowInstance) -> AuditDraft {
        let mut draft = AuditDraft::new(event, actor)
            .workflow(&instance.id)
            .assessment(instance.assessment_id)
            .risk_level(instance.risk_level)
            .action(&instance.workflow_type);
        if let Some(request_id) = &instance.approval_request_id {
            draft = draft.approval(request_id);
        }
        draft.tenant_id = instance.tenant_id.clone();
        draft
    }
}
