//! Error taxonomy for the governance core.

use gatekeep_store::StorageError;

use crate::approval::ApprovalRequest;
use crate::workflow::WorkflowInstance;

/// State returned unchanged alongside a [`GovernanceError::Conflict`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictState {
    Approval(Box<ApprovalRequest>),
    Workflow(Box<WorkflowInstance>),
    None,
}

/// Governance core errors.
#[derive(Debug, thiserror::Error)]
pub enum GovernanceError {
    /// Malformed or out-of-range input. Raised before any side effect.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Stale or duplicate decision, or an invalid state transition.
    #[error("conflict: {reason}")]
    Conflict {
        reason: String,
        current: ConflictState,
    },

    /// A decision was committed but its audit record could not be written.
    /// Carries the stored request so callers can still act on the outcome.
    #[error("decision committed without audit record: {source}")]
    UnauditedDecision {
        request: Box<ApprovalRequest>,
        #[source]
        source: Box<GovernanceError>,
    },

    /// Unexpected failure in a stage or rule evaluation.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GovernanceError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn approval_conflict(reason: impl Into<String>, request: ApprovalRequest) -> Self {
        Self::Conflict {
            reason: reason.into(),
            current: ConflictState::Approval(Box::new(request)),
        }
    }

    pub fn workflow_conflict(reason: impl Into<String>, instance: WorkflowInstance) -> Self {
        Self::Conflict {
            reason: reason.into(),
            current: ConflictState::Workflow(Box::new(instance)),
        }
    }

    /// HTTP-style status code for boundary callers.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) | Self::Config(_) => 400,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::UnauditedDecision { .. }
            | Self::Internal(_)
            | Self::Storage(_)
            | Self::Serialization(_)
            | Self::Io(_) => 500,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Result type for governance operations.
pub type Result<T> = std::result::Result<T, GovernanceError>;
