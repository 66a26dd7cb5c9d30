//! Atomic counters for governance activity.
//!
//! Counters are bumped silently at the call site. [`GovernanceMetrics::flush`]
//! emits the current values as a single `tracing::info!` event. The service
//! owns one instance; there is no process-wide singleton.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct GovernanceMetrics {
    assessments: AtomicU64,
    approvals_requested: AtomicU64,
    decisions: AtomicU64,
    escalations: AtomicU64,
    auto_denials: AtomicU64,
    redactions: AtomicU64,
    blocked_filters: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub assessments: u64,
    pub approvals_requested: u64,
    pub decisions: u64,
    pub escalations: u64,
    pub auto_denials: u64,
    pub redactions: u64,
    pub blocked_filters: u64,
}

impl GovernanceMetrics {
    pub const fn new() -> Self {
        Self {
            assessments: AtomicU64::new(0),
            approvals_requested: AtomicU64::new(0),
            decisions: AtomicU64::new(0),
            escalations: AtomicU64::new(0),
            auto_denials: AtomicU64::new(0),
            redactions: AtomicU64::new(0),
            blocked_filters: AtomicU64::new(0),
        }
    }

    pub fn inc_assessments(&self) {
        self.assessments.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "assessments", "counter incremented");
    }

    pub fn inc_approvals_requested(&self) {
        self.approvals_requested.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "approvals_requested", "counter incremented");
    }

    pub fn inc_decisions(&self) {
        self.decisions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "decisions", "counter incremented");
    }

    pub fn inc_escalations(&self) {
        self.escalations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "escalations", "counter incremented");
    }

    pub fn inc_auto_denials(&self) {
        self.auto_denials.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "auto_denials", "counter incremented");
    }

    /// Add `n` redacted spans.
    pub fn add_redactions(&self, n: u64) {
        if n > 0 {
            self.redactions.fetch_add(n, Ordering::Relaxed);
            tracing::trace!(metric = "redactions", n, "counter incremented");
        }
    }

    pub fn inc_blocked_filters(&self) {
        self.blocked_filters.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "blocked_filters", "counter incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            assessments: self.assessments.load(Ordering::Relaxed),
            approvals_requested: self.approvals_requested.load(Ordering::Relaxed),
            decisions: self.decisions.load(Ordering::Relaxed),
            escalations: self.escalations.load(Ordering::Relaxed),
            auto_denials: self.auto_denials.load(Ordering::Relaxed),
            redactions: self.redactions.load(Ordering::Relaxed),
            blocked_filters: self.blocked_filters.load(Ordering::Relaxed),
        }
    }

    /// Emit all current values as one `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            assessments = s.assessments,
            approvals_requested = s.approvals_requested,
            decisions = s.decisions,
            escalations = s.escalations,
            auto_denials = s.auto_denials,
            redactions = s.redactions,
            blocked_filters = s.blocked_filters,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = GovernanceMetrics::new();
        m.inc_assessments();
        m.inc_assessments();
        m.inc_escalations();
        m.add_redactions(3);
        m.add_redactions(0);
        let s = m.snapshot();
        assert_eq!(s.assessments, 2);
        assert_eq!(s.escalations, 1);
        assert_eq!(s.redactions, 3);
        assert_eq!(s.auto_denials, 0);
    }

    #[test]
    fn instances_are_independent() {
        let a = GovernanceMetrics::new();
        let b = GovernanceMetrics::new();
        a.inc_decisions();
        assert_eq!(b.snapshot().decisions, 0);
        a.flush();
    }
}
