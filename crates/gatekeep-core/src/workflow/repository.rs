//! Persistence seam for workflow instances.

use async_trait::async_trait;
use dashmap::DashMap;

use super::instance::{WorkflowFilter, WorkflowInstance};
use crate::domain::{CasOutcome, GovernanceError, Result};

/// Workflow instance storage.
///
/// Same swap contract as the approval repository: `compare_and_swap`
/// replaces the stored instance iff its version equals `expected_version`.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn insert(&self, instance: WorkflowInstance) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<WorkflowInstance>>;

    /// Matching instances, oldest first.
    async fn list(&self, filter: &WorkflowFilter) -> Result<Vec<WorkflowInstance>>;

    /// The instance gated on `request_id`, if any.
    async fn find_by_approval(&self, request_id: &str) -> Result<Option<WorkflowInstance>>;

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        next: WorkflowInstance,
    ) -> Result<CasOutcome<WorkflowInstance>>;
}

#[derive(Debug, Default)]
pub struct MemoryWorkflowRepository {
    instances: DashMap<String, WorkflowInstance>,
    /// approval request id -> workflow id
    by_approval: DashMap<String, String>,
}

impl MemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn index(&self, instance: &WorkflowInstance) {
        if let Some(request_id) = &instance.approval_request_id {
            self.by_approval
                .insert(request_id.clone(), instance.id.clone());
        }
    }
}

#[async_trait]
impl WorkflowRepository for MemoryWorkflowRepository {
    async fn insert(&self, instance: WorkflowInstance) -> Result<()> {
        if self.instances.contains_key(&instance.id) {
            return Err(GovernanceError::Conflict {
                reason: format!("workflow id {} already exists", instance.id),
                current: crate::domain::ConflictState::None,
            });
        }
        self.index(&instance);
        self.instances.insert(instance.id.clone(), instance);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<WorkflowInstance>> {
        Ok(self.instances.get(id).map(|i| i.value().clone()))
    }

    async fn list(&self, filter: &WorkflowFilter) -> Result<Vec<WorkflowInstance>> {
        let mut matching: Vec<WorkflowInstance> = self
            .instances
            .iter()
            .filter(|i| filter.matches(i.value()))
            .map(|i| i.value().clone())
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matching)
    }

    async fn find_by_approval(&self, request_id: &str) -> Result<Option<WorkflowInstance>> {
        let Some(workflow_id) = self.by_approval.get(request_id).map(|w| w.value().clone()) else {
            return Ok(None);
        };
        self.get(&workflow_id).await
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        mut next: WorkflowInstance,
    ) -> Result<CasOutcome<WorkflowInstance>> {
        {
            let mut stored = self
                .instances
                .get_mut(&next.id)
                .ok_or_else(|| GovernanceError::not_found("workflow", &next.id))?;
            if stored.version != expected_version {
                return Ok(CasOutcome::Stale(stored.clone()));
            }
            next.version = expected_version + 1;
            *stored = next.clone();
        }
        self.index(&next);
        Ok(CasOutcome::Swapped(next))
    }
}
