//! Gatekeep-Store: append-only audit persistence
//!
//! This crate is the persistence layer of the governance core. It owns the
//! audit record schema and the guarantees every backend must honour.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: append-only writes, ordered queries, tamper evidence.
//!
//! ## Key Components
//!
//! - `AuditStore`: backend-agnostic append/query trait
//! - `AuditEntry`: immutable, hash-chained audit record
//! - `MemoryAuditStore`: in-process backend (default, and test support)
//! - `SurrealAuditStore`: SurrealDB backend (`mem://`, `surrealkv://`, remote)

mod error;
pub mod memory;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_audit;

pub use error::StorageError;
pub use memory::MemoryAuditStore;
pub use storage_traits::{
    verify_entries, AuditDraft, AuditEntry, AuditEventType, AuditOutcome, AuditQuery, AuditStore,
    AuditSubject, StorageResult, GENESIS_DIGEST,
};
pub use surreal_audit::SurrealAuditStore;
