//! Behaviour when the audit store rejects writes mid-operation.
//!
//! Nothing may be left pending or running with no way to finish.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gatekeep_core::approval::{ApprovalStatus, Verdict, REQUEST_AUDIT_FAILED};
use gatekeep_core::audit::{AuditEventType, AuditQuery};
use gatekeep_core::risk::{Action, Context, DataClassification, Environment, Impact, Scope};
use gatekeep_core::workflow::{WorkflowFilter, WorkflowStatus};
use gatekeep_core::{GovernanceConfig, GovernanceDeps, GovernanceError, GovernanceService};
use gatekeep_store::{
    AuditDraft, AuditEntry, AuditStore, MemoryAuditStore, StorageError, StorageResult,
};
use serde_json::Value;

/// Rejects appends of one chosen event type.
#[derive(Default)]
struct RejectingStore {
    inner: MemoryAuditStore,
    rejected: Mutex<Option<AuditEventType>>,
}

impl RejectingStore {
    fn reject(&self, event_type: AuditEventType) {
        *self.rejected.lock().unwrap() = Some(event_type);
    }
}

#[async_trait]
impl AuditStore for RejectingStore {
    async fn append(&self, draft: AuditDraft) -> StorageResult<AuditEntry> {
        if *self.rejected.lock().unwrap() == Some(draft.event_type) {
            return Err(StorageError::Backend("audit volume offline".into()));
        }
        self.inner.append(draft).await
    }

    async fn query(&self, query: &AuditQuery) -> StorageResult<Vec<AuditEntry>> {
        self.inner.query(query).await
    }

    async fn len(&self) -> StorageResult<u64> {
        self.inner.len().await
    }
}

fn service(store: &Arc<RejectingStore>) -> GovernanceService {
    let store: Arc<dyn AuditStore> = Arc::clone(store) as Arc<dyn AuditStore>;
    GovernanceService::new(
        GovernanceConfig::default(),
        GovernanceDeps::in_memory().with_store(store),
    )
    .unwrap()
}

async fn count(svc: &GovernanceService, kind: AuditEventType) -> usize {
    svc.query_audit(&AuditQuery::all().event_type(kind))
        .await
        .unwrap()
        .len()
}

#[tokio::test(start_paused = true)]
async fn unaudited_start_fails_workflow_and_withdraws_request() {
    let store = Arc::new(RejectingStore::default());
    store.reject(AuditEventType::WorkflowStarted);
    let svc = service(&store);

    let err = svc
        .start_workflow("deploy-service", Value::Null, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::Storage(_)));

    let runs = svc.list_workflows(&WorkflowFilter::default()).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, WorkflowStatus::Failed);
    assert!(runs[0]
        .failure_reason
        .as_deref()
        .unwrap()
        .starts_with("run aborted"));

    let requests = svc.list_approvals(None, None).await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].status, ApprovalStatus::Expired);
    assert!(svc.pending_approvals(None).await.unwrap().is_empty());

    // The withdrawn request's timer never fires.
    tokio::time::sleep(Duration::from_secs(2 * 3600)).await;
    assert_eq!(count(&svc, AuditEventType::AutoDeny).await, 0);
    assert_eq!(count(&svc, AuditEventType::Escalation).await, 0);
}

#[tokio::test]
async fn unaudited_request_is_not_left_pending() {
    let store = Arc::new(RejectingStore::default());
    store.reject(AuditEventType::ApprovalRequested);
    let svc = service(&store);

    let context = Context::new(
        Environment::Production,
        DataClassification::CONFIDENTIAL,
        Scope::MultipleUnits,
        "alice",
    );
    let action = Action::new("deploy", "billing", false, Impact::High);
    svc.create_approval(&context, &action, "ship billing", None, vec![])
        .await
        .unwrap_err();

    let requests = svc.list_approvals(None, None).await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].status, ApprovalStatus::Expired);
    assert_eq!(
        requests[0].resolution_reason.as_deref(),
        Some(REQUEST_AUDIT_FAILED)
    );
}

#[tokio::test]
async fn committed_decision_moves_workflow_despite_audit_failure() {
    let store = Arc::new(RejectingStore::default());
    let svc = service(&store);
    let wf = svc
        .start_workflow("deploy-service", Value::Null, "alice")
        .await
        .unwrap();
    let request_id = wf.approval_request_id.clone().unwrap();

    store.reject(AuditEventType::DecisionSubmitted);
    let err = svc
        .decide(&request_id, "bob", Verdict::Approved, None)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 500);
    match err {
        GovernanceError::UnauditedDecision { request, .. } => {
            assert_eq!(request.status, ApprovalStatus::Approved);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(approval_status(&svc, &request_id).await, ApprovalStatus::Approved);

    let done = svc.get_workflow(&wf.id).await.unwrap();
    assert_eq!(done.status, WorkflowStatus::Completed);
    assert_eq!(done.stages.len(), 4);
}

async fn approval_status(svc: &GovernanceService, request_id: &str) -> ApprovalStatus {
    svc.get_approval(request_id).await.unwrap().status
}

#[tokio::test]
async fn audit_failure_mid_run_fails_the_instance() {
    let store = Arc::new(RejectingStore::default());
    store.reject(AuditEventType::WorkflowStageCompleted);
    let svc = service(&store);

    svc.start_workflow("docs-refresh", Value::Null, "alice")
        .await
        .unwrap_err();

    let runs = svc.list_workflows(&WorkflowFilter::default()).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, WorkflowStatus::Failed);
    assert!(runs[0].completed_at.is_some());
    assert_eq!(runs[0].stages.len(), 1);
    assert_eq!(count(&svc, AuditEventType::WorkflowFailed).await, 1);
}
