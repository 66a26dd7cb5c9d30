//! Context-aware risk scoring (CARS).
//!
//! Six weighted factors, each scored 0–100, are combined into an aggregate
//! score which maps onto a [`RiskLevel`] and its [`Safeguards`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::context::{Action, Context, DataClassification, Environment, Impact, Scope};
use super::history::OperationHistory;
use super::level::{RiskLevel, Safeguards};
use crate::domain::Result;

pub const WEIGHT_DATA_SENSITIVITY: f64 = 0.25;
pub const WEIGHT_ENVIRONMENT: f64 = 0.20;
pub const WEIGHT_SCOPE: f64 = 0.15;
pub const WEIGHT_REVERSIBILITY: f64 = 0.15;
pub const WEIGHT_IMPACT: f64 = 0.15;
pub const WEIGHT_HISTORY: f64 = 0.10;

/// One named input to the aggregate score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    /// 0–100.
    pub value: u8,
    pub weight: f64,
}

impl RiskFactor {
    fn new(name: &str, value: u8, weight: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
            weight,
        }
    }

    pub fn contribution(&self) -> f64 {
        f64::from(self.value) * self.weight
    }
}

/// Result of one assessment. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    id: Uuid,
    timestamp: DateTime<Utc>,
    context: Context,
    action: Action,
    factors: Vec<RiskFactor>,
    score: u8,
    level: RiskLevel,
    safeguards: Safeguards,
}

impl RiskAssessment {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    /// Factors in fixed order: data_sensitivity, environment, scope,
    /// reversibility, impact, history.
    pub fn factors(&self) -> &[RiskFactor] {
        &self.factors
    }

    pub fn factor(&self, name: &str) -> Option<&RiskFactor> {
        self.factors.iter().find(|f| f.name == name)
    }

    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn level(&self) -> RiskLevel {
        self.level
    }

    pub fn safeguards(&self) -> &Safeguards {
        &self.safeguards
    }

    pub fn requires_approval(&self) -> bool {
        self.safeguards.approval_required
    }
}

pub fn data_sensitivity_value(classification: DataClassification) -> u8 {
    match classification.tier() {
        1 => 0,
        2 => 25,
        3 => 50,
        _ => 100,
    }
}

pub fn environment_value(environment: Environment) -> u8 {
    match environment {
        Environment::Development => 0,
        Environment::Staging => 40,
        Environment::Production => 100,
    }
}

pub fn scope_value(scope: Scope) -> u8 {
    match scope {
        Scope::SingleUnit => 20,
        Scope::MultipleUnits => 50,
        Scope::SystemWide => 100,
    }
}

pub fn reversibility_value(reversible: bool) -> u8 {
    if reversible {
        0
    } else {
        100
    }
}

pub fn impact_value(impact: Impact) -> u8 {
    match impact {
        Impact::Low => 20,
        Impact::Medium => 50,
        Impact::High => 100,
    }
}

/// Scores `(Context, Action)` pairs against the acting user's history.
#[derive(Debug, Default)]
pub struct RiskAssessor {
    history: OperationHistory,
}

impl RiskAssessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assess an action. Input is validated before anything is computed.
    pub fn assess(&self, context: &Context, action: &Action) -> Result<RiskAssessment> {
        context.validate()?;
        action.validate()?;

        let factors = vec![
            RiskFactor::new(
                "data_sensitivity",
                data_sensitivity_value(context.data_classification),
                WEIGHT_DATA_SENSITIVITY,
            ),
            RiskFactor::new(
                "environment",
                environment_value(context.environment),
                WEIGHT_ENVIRONMENT,
            ),
            RiskFactor::new("scope", scope_value(context.scope), WEIGHT_SCOPE),
            RiskFactor::new(
                "reversibility",
                reversibility_value(action.reversible),
                WEIGHT_REVERSIBILITY,
            ),
            RiskFactor::new("impact", impact_value(action.estimated_impact), WEIGHT_IMPACT),
            RiskFactor::new(
                "history",
                self.history.factor(&context.user_id),
                WEIGHT_HISTORY,
            ),
        ];

        let raw: f64 = factors.iter().map(RiskFactor::contribution).sum();
        let score = raw.round().clamp(0.0, 100.0) as u8;
        let level = RiskLevel::from_score(score);

        Ok(RiskAssessment {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            context: context.clone(),
            action: action.clone(),
            factors,
            score,
            level,
            safeguards: Safeguards::for_level(level),
        })
    }

    pub fn record_operation_result(&self, user_id: &str, success: bool) {
        self.history.record(user_id, success);
    }

    /// Drop recorded history for one user, or for all users.
    pub fn clear_history(&self, user_id: Option<&str>) {
        self.history.clear(user_id);
    }

    pub fn history_factor(&self, user_id: &str) -> u8 {
        self.history.factor(user_id)
    }
}
