//! Risk levels and the safeguards each level mandates.

use serde::{Deserialize, Serialize};

/// Discrete risk level derived from the aggregate score.
///
/// Higher levels require more stringent safeguards before the action runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Score 0–25: proceed, logged only.
    Low,
    /// Score 26–50: automated tests must pass.
    Medium,
    /// Score 51–75: tests, review and one human approval.
    High,
    /// Score above 75: two approvals, rollback plan and extra checks.
    Critical,
}

impl RiskLevel {
    /// Map an aggregate score onto a level.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=25 => Self::Low,
            26..=50 => Self::Medium,
            51..=75 => Self::High,
            _ => Self::Critical,
        }
    }

    /// Whether this level requires at least one human approval.
    pub fn requires_approval(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }

    /// Number of distinct approvals needed at this level.
    pub fn required_approvers(self) -> u32 {
        match self {
            Self::Low | Self::Medium => 0,
            Self::High => 1,
            Self::Critical => 2,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Controls that must be in place before an action may proceed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Safeguards {
    pub tests_required: bool,
    pub review_required: bool,
    pub approval_required: bool,
    pub rollback_plan_required: bool,
    pub required_approvers: u32,
    pub additional_checks: Vec<String>,
}

impl Safeguards {
    /// Safeguards mandated for `level`.
    pub fn for_level(level: RiskLevel) -> Self {
        let mut safeguards = Self {
            tests_required: false,
            review_required: false,
            approval_required: level.requires_approval(),
            rollback_plan_required: false,
            required_approvers: level.required_approvers(),
            additional_checks: Vec::new(),
        };
        if level >= RiskLevel::Medium {
            safeguards.tests_required = true;
        }
        if level >= RiskLevel::High {
            safeguards.review_required = true;
        }
        if level == RiskLevel::Critical {
            safeguards.rollback_plan_required = true;
            safeguards.additional_checks = vec![
                "security review of the change".to_string(),
                "staged rollout with health monitoring".to_string(),
            ];
        }
        safeguards
    }

    /// Whether these safeguards demand at least everything `other` demands.
    pub fn covers(&self, other: &Safeguards) -> bool {
        (self.tests_required || !other.tests_required)
            && (self.review_required || !other.review_required)
            && (self.approval_required || !other.approval_required)
            && (self.rollback_plan_required || !other.rollback_plan_required)
            && self.required_approvers >= other.required_approvers
            && other
                .additional_checks
                .iter()
                .all(|c| self.additional_checks.contains(c))
    }

    /// True when nothing is required.
    pub fn is_empty(&self) -> bool {
        !self.tests_required
            && !self.review_required
            && !self.approval_required
            && !self.rollback_plan_required
            && self.additional_checks.is_empty()
    }
}
