//! Named workflow definitions and the registry they are looked up in.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{GovernanceError, Result};
use crate::risk::{Action, Context, DataClassification, Environment, Impact, Scope};

/// One step of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    /// Declared token cost, checked against the budget before the stage runs.
    pub token_cost: u64,
    pub side_effects: bool,
}

impl StageDefinition {
    pub fn new(name: impl Into<String>, token_cost: u64, side_effects: bool) -> Self {
        Self {
            name: name.into(),
            token_cost,
            side_effects,
        }
    }
}

/// Risk profile a workflow runs under unless its input overrides it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskTemplate {
    pub environment: Environment,
    pub data_classification: DataClassification,
    pub scope: Scope,
    pub action_type: String,
    pub target: String,
    pub reversible: bool,
    pub estimated_impact: Impact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub description: String,
    pub stages: Vec<StageDefinition>,
    pub risk: RiskTemplate,
}

/// Input keys that may override the risk template.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RiskOverrides {
    environment: Option<Environment>,
    data_classification: Option<DataClassification>,
    scope: Option<Scope>,
    reversible: Option<bool>,
    estimated_impact: Option<Impact>,
    target: Option<String>,
    tenant_id: Option<String>,
}

impl WorkflowDefinition {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(GovernanceError::InvalidInput(
                "workflow name must not be empty".into(),
            ));
        }
        if self.stages.is_empty() {
            return Err(GovernanceError::InvalidInput(format!(
                "workflow {} has no stages",
                self.name
            )));
        }
        for (i, stage) in self.stages.iter().enumerate() {
            if self.stages[..i].iter().any(|s| s.name == stage.name) {
                return Err(GovernanceError::InvalidInput(format!(
                    "workflow {} repeats stage {}",
                    self.name, stage.name
                )));
            }
        }
        Ok(())
    }

    pub fn total_token_cost(&self) -> u64 {
        self.stages.iter().map(|s| s.token_cost).sum()
    }

    /// Effective `(Context, Action)` for a run of this workflow.
    ///
    /// `input` must be a JSON object (or null). Recognised keys override the
    /// template; unknown keys are ignored. A malformed override is
    /// `InvalidInput`.
    pub fn effective_risk(&self, input: &Value, user_id: &str) -> Result<(Context, Action)> {
        let overrides = match input {
            Value::Null => RiskOverrides::default(),
            Value::Object(_) => serde_json::from_value(input.clone()).map_err(|e| {
                GovernanceError::InvalidInput(format!("workflow input: {e}"))
            })?,
            _ => {
                return Err(GovernanceError::InvalidInput(
                    "workflow input must be a JSON object".into(),
                ))
            }
        };
        let t = &self.risk;
        let mut context = Context::new(
            overrides.environment.unwrap_or(t.environment),
            overrides.data_classification.unwrap_or(t.data_classification),
            overrides.scope.unwrap_or(t.scope),
            user_id,
        )
        .with_workflow_type(&self.name);
        if let Some(tenant) = overrides.tenant_id {
            context = context.with_tenant(tenant);
        }
        let action = Action::new(
            &t.action_type,
            overrides.target.unwrap_or_else(|| t.target.clone()),
            overrides.reversible.unwrap_or(t.reversible),
            overrides.estimated_impact.unwrap_or(t.estimated_impact),
        );
        Ok((context, action))
    }
}

/// Lookup table of workflow definitions by name.
#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    definitions: HashMap<String, WorkflowDefinition>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in workflows.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for def in builtin_definitions() {
            registry.definitions.insert(def.name.clone(), def);
        }
        registry
    }

    /// Add or replace a definition.
    pub fn register(&mut self, definition: WorkflowDefinition) -> Result<()> {
        definition.validate()?;
        self.definitions.insert(definition.name.clone(), definition);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&WorkflowDefinition> {
        self.definitions.get(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn builtin_definitions() -> Vec<WorkflowDefinition> {
    vec![
        WorkflowDefinition {
            name: "design-to-code".into(),
            description: "Turn an approved design into components, tests and a pull request".into(),
            stages: vec![
                StageDefinition::new("parse_design", 2_000, false),
                StageDefinition::new("generate_components", 8_000, true),
                StageDefinition::new("write_tests", 4_000, true),
                StageDefinition::new("open_pull_request", 1_000, true),
            ],
            risk: RiskTemplate {
                environment: Environment::Staging,
                data_classification: DataClassification::INTERNAL,
                scope: Scope::MultipleUnits,
                action_type: "generate_code".into(),
                target: "repository".into(),
                reversible: true,
                estimated_impact: Impact::Medium,
            },
        },
        WorkflowDefinition {
            name: "deploy-service".into(),
            description: "Build, test and roll out a service to production".into(),
            stages: vec![
                StageDefinition::new("build", 3_000, false),
                StageDefinition::new("run_tests", 2_000, false),
                StageDefinition::new("deploy", 1_500, true),
                StageDefinition::new("verify_health", 500, false),
            ],
            risk: RiskTemplate {
                environment: Environment::Production,
                data_classification: DataClassification::CONFIDENTIAL,
                scope: Scope::MultipleUnits,
                action_type: "deploy".into(),
                target: "service".into(),
                reversible: false,
                estimated_impact: Impact::High,
            },
        },
        WorkflowDefinition {
            name: "data-export".into(),
            description: "Export a restricted dataset to an external recipient".into(),
            stages: vec![
                StageDefinition::new("select_dataset", 500, false),
                StageDefinition::new("redact_fields", 1_500, false),
                StageDefinition::new("package", 1_000, true),
                StageDefinition::new("deliver", 500, true),
            ],
            risk: RiskTemplate {
                environment: Environment::Production,
                data_classification: DataClassification::RESTRICTED,
                scope: Scope::SystemWide,
                action_type: "export_data".into(),
                target: "dataset".into(),
                reversible: false,
                estimated_impact: Impact::High,
            },
        },
        WorkflowDefinition {
            name: "docs-refresh".into(),
            description: "Regenerate developer documentation from recent changes".into(),
            stages: vec![
                StageDefinition::new("collect_changes", 1_000, false),
                StageDefinition::new("draft_docs", 3_000, false),
                StageDefinition::new("publish_docs", 500, true),
            ],
            risk: RiskTemplate {
                environment: Environment::Development,
                data_classification: DataClassification::PUBLIC,
                scope: Scope::SingleUnit,
                action_type: "update_docs".into(),
                target: "docs".into(),
                reversible: true,
                estimated_impact: Impact::Low,
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtins_are_valid() {
        let registry = WorkflowRegistry::builtin();
        assert_eq!(
            registry.names(),
            ["data-export", "deploy-service", "design-to-code", "docs-refresh"]
        );
        for name in registry.names() {
            registry.get(name).unwrap().validate().unwrap();
        }
    }

    #[test]
    fn test_overrides_apply() {
        let registry = WorkflowRegistry::builtin();
        let def = registry.get("docs-refresh").unwrap();
        let (ctx, action) = def
            .effective_risk(
                &json!({"environment": "production", "dataClassification": 3, "target": "handbook"}),
                "alice",
            )
            .unwrap();
        assert_eq!(ctx.environment, Environment::Production);
        assert_eq!(ctx.data_classification, DataClassification::CONFIDENTIAL);
        assert_eq!(ctx.scope, Scope::SingleUnit);
        assert_eq!(ctx.workflow_type.as_deref(), Some("docs-refresh"));
        assert_eq!(action.target, "handbook");
        assert_eq!(action.action_type, "update_docs");
    }

    #[test]
    fn test_bad_overrides_rejected() {
        let registry = WorkflowRegistry::builtin();
        let def = registry.get("docs-refresh").unwrap();
        assert!(def
            .effective_risk(&json!({"dataClassification": 7}), "alice")
            .is_err());
        assert!(def.effective_risk(&json!([1, 2]), "alice").is_err());
        assert!(def.effective_risk(&Value::Null, "alice").is_ok());
    }

    #[test]
    fn test_register_rejects_duplicate_stages() {
        let mut registry = WorkflowRegistry::new();
        let def = WorkflowDefinition {
            name: "dup".into(),
            description: String::new(),
            stages: vec![
                StageDefinition::new("a", 1, false),
                StageDefinition::new("a", 1, false),
            ],
            risk: WorkflowRegistry::builtin().get("docs-refresh").unwrap().risk.clone(),
        };
        assert!(registry.register(def).is_err());
    }
}
