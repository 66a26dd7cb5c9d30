//! Risk assessment.
//!
//! - `context`: inputs (`Context`, `Action`)
//! - `level`: `RiskLevel` and the `Safeguards` each level mandates
//! - `history`: per-user outcome history behind the history factor
//! - `assessor`: the weighted scorer

pub mod assessor;
pub mod context;
pub mod history;
pub mod level;

pub use assessor::{RiskAssessment, RiskAssessor, RiskFactor};
pub use context::{Action, Context, DataClassification, Environment, Impact, Scope};
pub use history::{OperationHistory, OperationOutcome, HISTORY_WINDOW};
pub use level::{RiskLevel, Safeguards};
