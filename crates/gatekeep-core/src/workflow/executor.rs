//! Stage execution seam.

use std::collections::HashSet;

use async_trait::async_trait;

use super::definition::StageDefinition;
use super::instance::WorkflowInstance;
use crate::domain::{GovernanceError, Result};

/// What a stage produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutput {
    pub tokens_used: u64,
    /// Agent-visible text; redacted before it is stored.
    pub output: Option<String>,
}

/// Runs one stage of a workflow instance.
///
/// An `Err` fails the whole instance.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    async fn execute(&self, instance: &WorkflowInstance, stage: &StageDefinition) -> Result<StageOutput>;
}

/// Consumes each stage's declared token cost and produces a short summary.
#[derive(Debug, Default, Clone)]
pub struct SimulatedStageExecutor {
    failing: HashSet<String>,
    outputs: Vec<(String, String)>,
}

impl SimulatedStageExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `stage` fail with an internal error.
    pub fn failing_on(mut self, stage: impl Into<String>) -> Self {
        self.failing.insert(stage.into());
        self
    }

    /// Emit `output` from `stage` instead of the default summary.
    pub fn with_output(mut self, stage: impl Into<String>, output: impl Into<String>) -> Self {
        self.outputs.push((stage.into(), output.into()));
        self
    }
}

#[async_trait]
impl StageExecutor for SimulatedStageExecutor {
    async fn execute(&self, instance: &WorkflowInstance, stage: &StageDefinition) -> Result<StageOutput> {
        if self.failing.contains(&stage.name) {
            return Err(GovernanceError::Internal(format!(
                "stage {} failed",
                stage.name
            )));
        }
        let output = self
            .outputs
            .iter()
            .find(|(name, _)| *name == stage.name)
            .map(|(_, out)| out.clone())
            .unwrap_or_else(|| {
                format!(
                    "{} finished for {} ({} tokens)",
                    stage.name, instance.workflow_type, stage.token_cost
                )
            });
        Ok(StageOutput {
            tokens_used: stage.token_cost,
            output: Some(output),
        })
    }
}
