//! Multi-stage workflows gated on risk and approval.
//!
//! - `definition`: stage lists and risk templates, plus the built-in registry
//! - `instance`: `WorkflowInstance` and its stage results
//! - `executor`: the `StageExecutor` seam
//! - `repository`: storage seam with a version-checked swap
//! - `engine`: `WorkflowEngine`, which drives a run end to end

pub mod definition;
pub mod engine;
pub mod executor;
pub mod instance;
pub mod repository;

pub use definition::{RiskTemplate, StageDefinition, WorkflowDefinition, WorkflowRegistry};
pub use engine::{EngineDeps, WorkflowEngine, APPROVAL_ACTOR};
pub use executor::{SimulatedStageExecutor, StageExecutor, StageOutput};
pub use instance::{StageResult, StageStatus, WorkflowFilter, WorkflowInstance, WorkflowStatus};
pub use repository::{MemoryWorkflowRepository, WorkflowRepository};
