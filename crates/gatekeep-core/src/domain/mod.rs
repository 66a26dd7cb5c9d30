//! Domain-level shared types.
//!
//! - `GovernanceError`: the error taxonomy every component reports through
//! - `CasOutcome`: result of a versioned repository swap
//! - `Result`: crate-wide result alias

pub mod cas;
pub mod error;

pub use cas::CasOutcome;
pub use error::{ConflictState, GovernanceError, Result};
