//! SurrealDB-backed AuditStore implementation
//!
//! Uses `schema::AuditEntryRow` for persistence, converting to/from
//! `storage_traits::AuditEntry` at the boundary. The chain head (last seq and
//! digest) is cached behind a mutex so appends from one process are
//! serialized; the unique `seq` index rejects a second writer racing on the
//! same database.

use async_trait::async_trait;
use chrono::Utc;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::migrations;
use crate::schema::AuditEntryRow;
use crate::storage_traits::{
    AuditDraft, AuditEntry, AuditQuery, AuditStore, StorageResult, GENESIS_DIGEST,
};

#[derive(Debug)]
struct ChainHead {
    seq: u64,
    digest: String,
}

/// SurrealDB-backed implementation of [`AuditStore`].
pub struct SurrealAuditStore {
    db: Surreal<Any>,
    head: Mutex<ChainHead>,
}

impl SurrealAuditStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `gatekeep/audit`, and runs `init_schema`.
    pub async fn in_memory() -> StorageResult<Self> {
        Self::connect("mem://").await
    }

    /// Connect to any SurrealDB endpoint (`mem://`, `surrealkv://path`, `ws://host`).
    pub async fn connect(url: &str) -> StorageResult<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to connect to {url}: {e}")))?;

        db.use_ns("gatekeep")
            .use_db("audit")
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;

        let head = Self::load_head(&db).await?;
        info!(url = %url, seq = head.seq, "SurrealAuditStore connected");
        Ok(Self {
            db,
            head: Mutex::new(head),
        })
    }

    /// Create from the `GATEKEEP_AUDIT_DB` environment variable, falling back
    /// to local persistence in `.gatekeep/audit`.
    pub async fn from_env() -> StorageResult<Self> {
        if let Ok(url) = std::env::var("GATEKEEP_AUDIT_DB") {
            return Self::connect(&url).await;
        }
        let path = ".gatekeep/audit";
        std::fs::create_dir_all(path).map_err(|e| {
            StorageError::Connection(format!(
                "Failed to create database directory {}: {}",
                path, e
            ))
        })?;
        Self::connect(&format!("surrealkv://{path}")).await
    }

    // -- private helpers -----------------------------------------------------

    async fn load_head(db: &Surreal<Any>) -> StorageResult<ChainHead> {
        let mut res = db
            .query("SELECT * FROM audit_entries ORDER BY seq DESC LIMIT 1")
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let rows: Vec<AuditEntryRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(match rows.into_iter().next() {
            Some(row) => ChainHead {
                seq: row.seq,
                digest: row.digest,
            },
            None => ChainHead {
                seq: 0,
                digest: GENESIS_DIGEST.to_string(),
            },
        })
    }
}

#[async_trait]
impl AuditStore for SurrealAuditStore {
    async fn append(&self, draft: AuditDraft) -> StorageResult<AuditEntry> {
        let mut head = self.head.lock().await;
        let entry = draft.seal(head.seq + 1, Utc::now(), head.digest.clone());

        debug!(seq = entry.seq, event_type = %entry.event_type, "appending audit entry");

        let _created: Option<AuditEntryRow> = self
            .db
            .create("audit_entries")
            .content(AuditEntryRow::from(&entry))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        head.seq = entry.seq;
        head.digest = entry.digest.clone();
        Ok(entry)
    }

    async fn query(&self, query: &AuditQuery) -> StorageResult<Vec<AuditEntry>> {
        let mut conditions = Vec::new();
        if query.event_type.is_some() {
            conditions.push("event_type = $event_type");
        }
        if query.actor.is_some() {
            conditions.push("actor = $actor");
        }
        if query.subject_id.is_some() {
            conditions.push(
                "(assessment_id = $subject OR approval_id = $subject OR workflow_id = $subject)",
            );
        }
        if query.tenant_id.is_some() {
            conditions.push("tenant_id = $tenant");
        }
        if query.from.is_some() {
            conditions.push("timestamp >= <datetime> $from");
        }
        if query.to.is_some() {
            conditions.push("timestamp <= <datetime> $to");
        }

        let mut sql = String::from("SELECT * FROM audit_entries");
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY seq ASC");
        if query.limit.is_some() {
            sql.push_str(" LIMIT $limit");
        }

        let mut request = self.db.query(sql);
        if let Some(event_type) = query.event_type {
            request = request.bind(("event_type", event_type.as_str().to_string()));
        }
        if let Some(actor) = &query.actor {
            request = request.bind(("actor", actor.clone()));
        }
        if let Some(subject) = &query.subject_id {
            request = request.bind(("subject", subject.clone()));
        }
        if let Some(tenant) = &query.tenant_id {
            request = request.bind(("tenant", tenant.clone()));
        }
        if let Some(from) = query.from {
            request = request.bind(("from", from.to_rfc3339()));
        }
        if let Some(to) = query.to {
            request = request.bind(("to", to.to_rfc3339()));
        }
        if let Some(limit) = query.limit {
            request = request.bind(("limit", limit as u64));
        }

        let mut res = request
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let rows: Vec<AuditEntryRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let entries = rows
            .into_iter()
            .map(AuditEntry::try_from)
            .collect::<StorageResult<Vec<_>>>()?;
        // The WHERE clause is a prefilter; `apply` has the final say.
        Ok(query.apply(entries.iter()))
    }

    async fn len(&self) -> StorageResult<u64> {
        Ok(self.head.lock().await.seq)
    }
}
