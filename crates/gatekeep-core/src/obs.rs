//! Structured observability hooks for governance decisions.
//!
//! Each `emit_*` function writes one `info!` (or `warn!`) event carrying an
//! `event = "<domain>.<verb>"` field so log pipelines can filter on it.
//! [`workflow_span`] tags everything logged while a workflow runs.

use tracing::{info, warn};

/// Span tagging everything logged while a workflow instance runs.
///
/// Attach with `tracing::Instrument` so it stays valid across awaits:
///
/// ```ignore
/// engine.run(instance).instrument(workflow_span("wf-123", "deploy-service")).await
/// ```
pub fn workflow_span(workflow_id: &str, workflow_type: &str) -> tracing::Span {
    tracing::info_span!(
        "gatekeep.workflow",
        workflow_id = %workflow_id,
        workflow_type = %workflow_type
    )
}

pub fn emit_risk_assessed(assessment_id: &str, user_id: &str, score: u8, level: &str) {
    info!(
        event = "risk.assessed",
        assessment_id = %assessment_id,
        user_id = %user_id,
        score = score,
        level = %level,
    );
}

/// Emit event: a decision was accepted. `status` is the request status after it.
pub fn emit_approval_decided(request_id: &str, approver_id: &str, verdict: &str, status: &str) {
    info!(
        event = "approval.decided",
        request_id = %request_id,
        approver_id = %approver_id,
        verdict = %verdict,
        status = %status,
    );
}

pub fn emit_escalation_fired(request_id: &str, trigger: &str, notified: usize, succeeded: usize) {
    info!(
        event = "escalation.fired",
        request_id = %request_id,
        trigger = %trigger,
        notified = notified,
        succeeded = succeeded,
    );
}

/// Emit event: fail-closed denial at hard timeout (warning level).
pub fn emit_auto_denied(request_id: &str, elapsed_ms: u64) {
    warn!(
        event = "approval.auto_denied",
        request_id = %request_id,
        elapsed_ms = elapsed_ms,
    );
}

pub fn emit_workflow_stage(workflow_id: &str, stage: &str, tokens: u64, success: bool) {
    info!(
        event = "workflow.stage",
        workflow_id = %workflow_id,
        stage = %stage,
        tokens = tokens,
        success = success,
    );
}

/// Emit event: secret detected in text (warning level).
pub fn emit_privacy_blocked(source: &str, detections: usize) {
    warn!(event = "privacy.blocked", source = %source, detections = detections);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_span_create() {
        let span = workflow_span("wf-1", "docs-refresh");
        let _entered = span.enter();
        emit_workflow_stage("wf-1", "draft", 10, true);
    }
}
