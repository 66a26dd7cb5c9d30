//! Human approval of high-risk actions.
//!
//! - `request`: `ApprovalRequest`, `Decision` and the quorum rules
//! - `repository`: storage seam with a version-checked swap
//! - `manager`: `ApprovalWorkflow`, the audited lifecycle on top

pub mod manager;
pub mod repository;
pub mod request;

pub use manager::{ApprovalWorkflow, REQUEST_AUDIT_FAILED};
pub use repository::{ApprovalRepository, MemoryApprovalRepository};
pub use request::{
    required_approvals_for, ApprovalRequest, ApprovalStats, ApprovalStatus, Decision, Verdict,
};
