//! Escalation of slow approvals and fail-closed timeouts.

pub mod notifier;
pub mod service;

pub use notifier::{LogNotifier, NotificationResult, Notifier, RecordingNotifier, SentNotice};
pub use service::{ApprovalResolution, EscalationService, ESCALATION_ACTOR, TIMEOUT_REASON};
