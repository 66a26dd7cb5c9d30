//! In-memory audit store
//!
//! `MemoryAuditStore` keeps the chain in a `Vec` behind a `tokio::sync::RwLock`.
//! Appends take the write lock, so sequence numbers and digests are assigned
//! atomically; queries take the read lock and see a consistent prefix.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::storage_traits::*;

/// In-memory append-only audit store.
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every entry.
    ///
    /// Test isolation only: nothing in the governance service calls this.
    pub async fn reset(&self) {
        self.entries.write().await.clear();
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, draft: AuditDraft) -> StorageResult<AuditEntry> {
        let mut entries = self.entries.write().await;
        let prev = entries
            .last()
            .map(|e| e.digest.clone())
            .unwrap_or_else(|| GENESIS_DIGEST.to_string());
        let entry = draft.seal(entries.len() as u64 + 1, Utc::now(), prev);
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn query(&self, query: &AuditQuery) -> StorageResult<Vec<AuditEntry>> {
        let entries = self.entries.read().await;
        Ok(query.apply(entries.iter()))
    }

    async fn len(&self) -> StorageResult<u64> {
        Ok(self.entries.read().await.len() as u64)
    }
}
