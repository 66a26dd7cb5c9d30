//! Sensitive data redaction.
//!
//! - `rule`: detection rules and validators, plus the built-in rule sets
//! - `filter`: the single-pass scanner and its builder

pub mod filter;
pub mod rule;

pub use filter::{
    Detection, FilterResult, JsonFilterResult, PrivacyFilter, PrivacyFilterBuilder, DEFAULT_SLO,
};
pub use rule::{PrivacyRule, RuleKind, Validator};
