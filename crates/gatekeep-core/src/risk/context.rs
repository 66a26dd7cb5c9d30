//! Risk assessment inputs: who is acting, where, and what they want to do.

use serde::{Deserialize, Serialize};

use crate::domain::{GovernanceError, Result};

/// Deployment environment the action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Environment {
    #[serde(rename = "development", alias = "dev")]
    Development,
    #[serde(rename = "staging")]
    Staging,
    #[serde(rename = "production", alias = "prod")]
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Staging => write!(f, "staging"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Data classification tier, 1 (public) through 4 (restricted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DataClassification(u8);

impl DataClassification {
    pub const PUBLIC: Self = Self(1);
    pub const INTERNAL: Self = Self(2);
    pub const CONFIDENTIAL: Self = Self(3);
    pub const RESTRICTED: Self = Self(4);

    pub fn new(tier: u8) -> Result<Self> {
        if (1..=4).contains(&tier) {
            Ok(Self(tier))
        } else {
            Err(GovernanceError::InvalidInput(format!(
                "data classification tier must be 1-4, got {tier}"
            )))
        }
    }

    pub fn tier(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for DataClassification {
    type Error = GovernanceError;

    fn try_from(tier: u8) -> Result<Self> {
        Self::new(tier)
    }
}

impl From<DataClassification> for u8 {
    fn from(c: DataClassification) -> Self {
        c.0
    }
}

/// Blast radius of the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    #[serde(alias = "single_unit")]
    SingleUnit,
    #[serde(alias = "multiple_units")]
    MultipleUnits,
    #[serde(alias = "system_wide")]
    SystemWide,
}

/// Estimated impact of the action if it goes wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Low,
    Medium,
    High,
}

/// Who is acting and in which setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    pub environment: Environment,
    pub data_classification: DataClassification,
    pub scope: Scope,
    pub user_id: String,
    #[serde(default)]
    pub workflow_type: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

impl Context {
    pub fn new(
        environment: Environment,
        data_classification: DataClassification,
        scope: Scope,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            environment,
            data_classification,
            scope,
            user_id: user_id.into(),
            workflow_type: None,
            tenant_id: None,
        }
    }

    pub fn with_workflow_type(mut self, workflow_type: impl Into<String>) -> Self {
        self.workflow_type = Some(workflow_type.into());
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(GovernanceError::InvalidInput(
                "context.userId must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// The privileged action being requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: String,
    pub target: String,
    pub reversible: bool,
    pub estimated_impact: Impact,
}

impl Action {
    pub fn new(
        action_type: impl Into<String>,
        target: impl Into<String>,
        reversible: bool,
        estimated_impact: Impact,
    ) -> Self {
        Self {
            action_type: action_type.into(),
            target: target.into(),
            reversible,
            estimated_impact,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.action_type.trim().is_empty() {
            return Err(GovernanceError::InvalidInput(
                "action.type must not be empty".into(),
            ));
        }
        Ok(())
    }
}
