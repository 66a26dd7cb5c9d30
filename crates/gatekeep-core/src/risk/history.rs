//! Per-user operation outcome history feeding the history risk factor.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcomes kept per user; older ones fall out of the window.
pub const HISTORY_WINDOW: usize = 10;

/// Contribution of the most recent failure.
const FAILURE_WEIGHT: f64 = 25.0;

/// Each step back in time scales a failure's contribution by this factor.
const RECENCY_DECAY: f64 = 0.85;

/// One recorded outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOutcome {
    pub success: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Bounded outcome history per user.
///
/// Guarded by a `std::sync::RwLock`; the assessor is synchronous and never
/// holds the lock across an await point.
#[derive(Debug, Default)]
pub struct OperationHistory {
    users: RwLock<HashMap<String, VecDeque<OperationOutcome>>>,
}

impl OperationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, user_id: &str, success: bool) {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        let outcomes = users.entry(user_id.to_string()).or_default();
        outcomes.push_front(OperationOutcome {
            success,
            recorded_at: Utc::now(),
        });
        outcomes.truncate(HISTORY_WINDOW);
    }

    /// History factor (0–100) for `user_id`.
    ///
    /// Failure at position `i` (0 = newest) contributes `25 * 0.85^i`; the sum
    /// is rounded and capped at 100. No history yields 0.
    pub fn factor(&self, user_id: &str) -> u8 {
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        let Some(outcomes) = users.get(user_id) else {
            return 0;
        };
        let raw: f64 = outcomes
            .iter()
            .enumerate()
            .filter(|(_, o)| !o.success)
            .map(|(i, _)| FAILURE_WEIGHT * RECENCY_DECAY.powi(i as i32))
            .sum();
        raw.round().min(100.0) as u8
    }

    /// Recent outcomes for `user_id`, newest first.
    pub fn outcomes(&self, user_id: &str) -> Vec<OperationOutcome> {
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        users
            .get(user_id)
            .map(|o| o.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Forget one user's history, or everyone's when `user_id` is `None`.
    pub fn clear(&self, user_id: Option<&str>) {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        match user_id {
            Some(id) => {
                users.remove(id);
            }
            None => users.clear(),
        }
    }
}
