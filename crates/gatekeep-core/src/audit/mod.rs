//! Audit trail: the redacting logger and compliance export.

pub mod export;
pub mod logger;

pub use export::{verify_export, AuditExport, AuditExportReceipt, AuditFormat};
pub use logger::AuditLogger;

pub use gatekeep_store::{
    AuditDraft, AuditEntry, AuditEventType, AuditOutcome, AuditQuery, AuditStore, AuditSubject,
};
