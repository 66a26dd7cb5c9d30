//! Delivery of escalation notices to human approvers.
//!
//! Transport is external; the core only depends on the [`Notifier`] seam.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::approval::ApprovalRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationResult {
    pub approver_id: String,
    pub delivered: bool,
    pub error: Option<String>,
}

impl NotificationResult {
    pub fn delivered(approver_id: impl Into<String>) -> Self {
        Self {
            approver_id: approver_id.into(),
            delivered: true,
            error: None,
        }
    }

    pub fn failed(approver_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            approver_id: approver_id.into(),
            delivered: false,
            error: Some(error.into()),
        }
    }
}

/// Sends an escalation notice about `request` to each of `approvers`.
///
/// Implementations report per-approver delivery instead of failing the call.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, request: &ApprovalRequest, approvers: &[String]) -> Vec<NotificationResult>;
}

/// Writes notices to the tracing log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, request: &ApprovalRequest, approvers: &[String]) -> Vec<NotificationResult> {
        approvers
            .iter()
            .map(|approver| {
                tracing::warn!(
                    request_id = %request.id,
                    approver = %approver,
                    level = %request.risk_level,
                    expires_at = %request.expires_at,
                    "approval escalated"
                );
                NotificationResult::delivered(approver)
            })
            .collect()
    }
}

/// One captured `notify` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotice {
    pub request_id: String,
    pub approvers: Vec<String>,
}

/// Test support: records every call and fails delivery to chosen approvers.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotice>>,
    unreachable: HashSet<String>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliveries to these approvers report failure.
    pub fn with_unreachable<I, S>(approvers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sent: Mutex::default(),
            unreachable: approvers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn sent(&self) -> Vec<SentNotice> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, request: &ApprovalRequest, approvers: &[String]) -> Vec<NotificationResult> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentNotice {
                request_id: request.id.clone(),
                approvers: approvers.to_vec(),
            });
        approvers
            .iter()
            .map(|a| {
                if self.unreachable.contains(a) {
                    NotificationResult::failed(a, "unreachable")
                } else {
                    NotificationResult::delivered(a)
                }
            })
            .collect()
    }
}
