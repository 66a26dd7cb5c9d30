//! Service configuration.
//!
//! Loaded from TOML, then overridden by `GATEKEEP_*` environment variables,
//! then validated. Every section and field has a default, so an empty file
//! is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{GovernanceError, Result};
use crate::telemetry::parse_level;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub approval: ApprovalConfig,
    pub workflow: WorkflowConfig,
    pub privacy: PrivacyConfig,
    pub telemetry: TelemetryConfig,
}

/// Longest accepted approval timeout (one year).
pub const MAX_APPROVAL_TIMEOUT_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Hard timeout after which a pending request is auto-denied.
    pub timeout_secs: u64,
    /// Fraction of the timeout at which admins are notified.
    pub escalation_threshold: f64,
    pub admin_approvers: Vec<String>,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 3600,
            escalation_threshold: 0.75,
            admin_approvers: vec!["admin".to_string()],
        }
    }
}

impl ApprovalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Cumulative token ceiling per workflow instance.
    pub token_budget: u64,
    pub cost_per_1k_tokens: f64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            token_budget: 100_000,
            cost_per_1k_tokens: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyConfig {
    pub slo_ms: u64,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self { slo_ms: 50 }
    }
}

impl PrivacyConfig {
    pub fn slo(&self) -> Duration {
        Duration::from_millis(self.slo_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub json: bool,
    pub level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            json: false,
            level: "info".to_string(),
        }
    }
}

impl GovernanceConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| GovernanceError::Config(e.to_string()))
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Apply `GATEKEEP_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("GATEKEEP_APPROVAL_TIMEOUT_SECS") {
            self.approval.timeout_secs = parse_var("GATEKEEP_APPROVAL_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("GATEKEEP_ESCALATION_THRESHOLD") {
            self.approval.escalation_threshold = parse_var("GATEKEEP_ESCALATION_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("GATEKEEP_ADMIN_APPROVERS") {
            self.approval.admin_approvers = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = lookup("GATEKEEP_TOKEN_BUDGET") {
            self.workflow.token_budget = parse_var("GATEKEEP_TOKEN_BUDGET", &v)?;
        }
        if let Some(v) = lookup("GATEKEEP_COST_PER_1K_TOKENS") {
            self.workflow.cost_per_1k_tokens = parse_var("GATEKEEP_COST_PER_1K_TOKENS", &v)?;
        }
        if let Some(v) = lookup("GATEKEEP_PRIVACY_SLO_MS") {
            self.privacy.slo_ms = parse_var("GATEKEEP_PRIVACY_SLO_MS", &v)?;
        }
        if let Some(v) = lookup("GATEKEEP_LOG_JSON") {
            self.telemetry.json = parse_var("GATEKEEP_LOG_JSON", &v)?;
        }
        if let Some(v) = lookup("GATEKEEP_LOG_LEVEL") {
            self.telemetry.level = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.approval.timeout_secs == 0 {
            return Err(GovernanceError::Config(
                "approval.timeout_secs must be positive".into(),
            ));
        }
        if self.approval.timeout_secs > MAX_APPROVAL_TIMEOUT_SECS {
            return Err(GovernanceError::Config(format!(
                "approval.timeout_secs must be at most {MAX_APPROVAL_TIMEOUT_SECS}, got {}",
                self.approval.timeout_secs
            )));
        }
        let t = self.approval.escalation_threshold;
        if !(t > 0.0 && t < 1.0) {
            return Err(GovernanceError::Config(format!(
                "approval.escalation_threshold must be in (0, 1), got {t}"
            )));
        }
        if self.workflow.token_budget == 0 {
            return Err(GovernanceError::Config(
                "workflow.token_budget must be positive".into(),
            ));
        }
        let c = self.workflow.cost_per_1k_tokens;
        if !c.is_finite() || c < 0.0 {
            return Err(GovernanceError::Config(format!(
                "workflow.cost_per_1k_tokens must be a non-negative number, got {c}"
            )));
        }
        if self.privacy.slo_ms == 0 {
            return Err(GovernanceError::Config(
                "privacy.slo_ms must be positive".into(),
            ));
        }
        parse_level(&self.telemetry.level)?;
        Ok(())
    }

    /// Read, override and validate in one step.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_toml_file(p)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| GovernanceError::Config(format!("{key}: cannot parse {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_validate() {
        let c = GovernanceConfig::default();
        c.validate().unwrap();
        assert_eq!(c.approval.escalation_threshold, 0.75);
        assert_eq!(c.privacy.slo(), Duration::from_millis(50));
    }

    #[test]
    fn test_partial_toml() {
        let c = GovernanceConfig::from_toml_str(
            r#"
            [approval]
            timeout_secs = 120
            admin_approvers = ["ops", "sec"]

            [telemetry]
            json = true
            "#,
        )
        .unwrap();
        assert_eq!(c.approval.timeout(), Duration::from_secs(120));
        assert_eq!(c.approval.admin_approvers, ["ops", "sec"]);
        assert_eq!(c.approval.escalation_threshold, 0.75);
        assert!(c.telemetry.json);
        assert_eq!(c.workflow.token_budget, 100_000);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("GATEKEEP_APPROVAL_TIMEOUT_SECS", "30"),
            ("GATEKEEP_ADMIN_APPROVERS", "a, b,,c"),
            ("GATEKEEP_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();
        let mut c = GovernanceConfig::default();
        c.apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(c.approval.timeout_secs, 30);
        assert_eq!(c.approval.admin_approvers, ["a", "b", "c"]);
        assert_eq!(c.telemetry.level, "debug");
    }

    #[test]
    fn test_bad_override_is_config_error() {
        let mut c = GovernanceConfig::default();
        let err = c
            .apply_overrides(|k| (k == "GATEKEEP_TOKEN_BUDGET").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, GovernanceError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut c = GovernanceConfig::default();
        c.approval.escalation_threshold = 1.0;
        assert!(c.validate().is_err());

        let mut c = GovernanceConfig::default();
        c.workflow.token_budget = 0;
        assert!(c.validate().is_err());

        let mut c = GovernanceConfig::default();
        c.telemetry.level = "verbose".into();
        assert!(c.validate().is_err());

        let mut c = GovernanceConfig::default();
        c.approval.timeout_secs = u64::MAX;
        assert!(matches!(c.validate(), Err(GovernanceError::Config(_))));
        c.approval.timeout_secs = MAX_APPROVAL_TIMEOUT_SECS;
        c.validate().unwrap();
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gatekeep.toml");
        std::fs::write(&path, "[workflow]\ntoken_budget = 500\n").unwrap();
        let c = GovernanceConfig::from_toml_file(&path).unwrap();
        assert_eq!(c.workflow.token_budget, 500);
    }
}
