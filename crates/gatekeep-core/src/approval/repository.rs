//! Persistence seam for approval requests.

use async_trait::async_trait;
use dashmap::DashMap;

use super::request::ApprovalRequest;
use crate::domain::{CasOutcome, GovernanceError, Result};

/// Approval request storage.
///
/// `compare_and_swap` is the only mutation after `insert`: it replaces the
/// stored request iff its version still equals `expected_version`, and the
/// stored copy gets `expected_version + 1`.
#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    /// Fails with `Conflict` when the id already exists.
    async fn insert(&self, request: ApprovalRequest) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<ApprovalRequest>>;

    /// All requests, oldest first.
    async fn list(&self) -> Result<Vec<ApprovalRequest>>;

    /// Fails with `NotFound` for an unknown id.
    async fn compare_and_swap(
        &self,
        expected_version: u64,
        next: ApprovalRequest,
    ) -> Result<CasOutcome<ApprovalRequest>>;
}

#[derive(Debug, Default)]
pub struct MemoryApprovalRepository {
    requests: DashMap<String, ApprovalRequest>,
}

impl MemoryApprovalRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApprovalRepository for MemoryApprovalRepository {
    async fn insert(&self, request: ApprovalRequest) -> Result<()> {
        match self.requests.entry(request.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => Err(
                GovernanceError::approval_conflict("approval id already exists", existing.get().clone()),
            ),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(request);
                Ok(())
            }
        }
    }

    async fn get(&self, id: &str) -> Result<Option<ApprovalRequest>> {
        Ok(self.requests.get(id).map(|r| r.value().clone()))
    }

    async fn list(&self) -> Result<Vec<ApprovalRequest>> {
        let mut all: Vec<ApprovalRequest> =
            self.requests.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        mut next: ApprovalRequest,
    ) -> Result<CasOutcome<ApprovalRequest>> {
        let mut stored = self
            .requests
            .get_mut(&next.id)
            .ok_or_else(|| GovernanceError::not_found("approval", &next.id))?;
        if stored.version != expected_version {
            return Ok(CasOutcome::Stale(stored.clone()));
        }
        next.version = expected_version + 1;
        *stored = next.clone();
        Ok(CasOutcome::Swapped(next))
    }
}
