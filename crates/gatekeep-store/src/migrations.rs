//! SurrealDB schema initialization for the audit trail.

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::storage_traits::StorageResult;

/// Initialize the audit tables. Idempotent.
pub async fn init_schema(db: &Surreal<Any>) -> StorageResult<()> {
    info!("Initializing gatekeep audit schema");
    init_audit_entries_table(db).await?;
    Ok(())
}

/// Initialize `audit_entries`.
///
/// Schema:
/// ```text
/// TABLE audit_entries {
///   entry_id:     STRING (unique)
///   seq:          INT (unique, chain order)
///   timestamp:    DATETIME (indexed)
///   event_type:   STRING (indexed)
///   actor:        STRING (indexed)
///   approval_id:  STRING?
///   workflow_id:  STRING?
///   details:      OBJECT
///   prev_digest:  STRING
///   digest:       STRING (unique)
/// }
/// ```
///
/// Rows can be created and read but never updated or deleted.
async fn init_audit_entries_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing audit_entries table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS audit_entries
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_audit_entry_id ON TABLE audit_entries COLUMNS entry_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_audit_seq ON TABLE audit_entries COLUMNS seq UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_audit_digest ON TABLE audit_entries COLUMNS digest UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_audit_timestamp ON TABLE audit_entries COLUMNS timestamp;
        DEFINE INDEX IF NOT EXISTS idx_audit_event_type ON TABLE audit_entries COLUMNS event_type;
        DEFINE INDEX IF NOT EXISTS idx_audit_actor ON TABLE audit_entries COLUMNS actor;
    "#;

    db.query(sql)
        .await
        .and_then(|response| response.check())
        .map_err(|e| StorageError::SchemaSetup(format!("audit_entries: {e}")))?;
    Ok(())
}
