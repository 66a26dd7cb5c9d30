//! Detection rules for the privacy filter.
//!
//! Rules are plain data: a compiled matcher plus the metadata needed to
//! build a replacement token. The scanning loop in [`super::filter`] never
//! special-cases a rule.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{GovernanceError, Result};

/// Whether a match is personal data or a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Pii,
    /// Any secret match blocks further processing.
    Secret,
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pii => write!(f, "pii"),
            Self::Secret => write!(f, "secret"),
        }
    }
}

/// Post-match check that rejects regex hits which are not real values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Validator {
    /// Card number checksum.
    Luhn,
    /// US SSN area/group/serial ranges.
    Ssn,
}

impl Validator {
    pub fn check(self, candidate: &str) -> bool {
        match self {
            Self::Luhn => luhn_valid(candidate),
            Self::Ssn => ssn_valid(candidate),
        }
    }
}

fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

fn ssn_valid(candidate: &str) -> bool {
    let parts: Vec<&str> = candidate.split('-').collect();
    let [area, group, serial] = parts.as_slice() else {
        return false;
    };
    !(*area == "000" || *area == "666" || area.starts_with('9') || *group == "00" || *serial == "0000")
}

/// A single detection rule.
#[derive(Debug, Clone)]
pub struct PrivacyRule {
    pub name: String,
    pub pattern: Regex,
    /// Upper-case category used in the replacement token, e.g. `EMAIL`.
    pub category: String,
    pub kind: RuleKind,
    /// 0–100.
    pub severity: u8,
    pub validator: Option<Validator>,
}

impl PrivacyRule {
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        category: impl Into<String>,
        kind: RuleKind,
        severity: u8,
    ) -> Result<Self> {
        let name = name.into();
        let category = category.into().to_ascii_uppercase();
        if category.is_empty() || !category.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(GovernanceError::InvalidInput(format!(
                "rule {name}: category must be non-empty [A-Z0-9_]"
            )));
        }
        if severity > 100 {
            return Err(GovernanceError::InvalidInput(format!(
                "rule {name}: severity must be 0-100, got {severity}"
            )));
        }
        let pattern = Regex::new(pattern).map_err(|e| {
            GovernanceError::InvalidInput(format!("rule {name}: invalid pattern: {e}"))
        })?;
        Ok(Self {
            name,
            pattern,
            category,
            kind,
            severity,
            validator: None,
        })
    }

    pub fn secret(
        name: impl Into<String>,
        pattern: &str,
        category: impl Into<String>,
        severity: u8,
    ) -> Result<Self> {
        Self::new(name, pattern, category, RuleKind::Secret, severity)
    }

    pub fn pii(
        name: impl Into<String>,
        pattern: &str,
        category: impl Into<String>,
        severity: u8,
    ) -> Result<Self> {
        Self::new(name, pattern, category, RuleKind::Pii, severity)
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Replacement token for the `n`th match of this category in one call.
    pub fn token(&self, n: usize) -> String {
        format!("[REDACTED_{}_{}]", self.category, n)
    }

    /// Whether a regex hit passes the optional validator.
    pub fn accepts(&self, candidate: &str) -> bool {
        self.validator.map_or(true, |v| v.check(candidate))
    }

    /// Any accepted match in `text`.
    pub fn is_match(&self, text: &str) -> bool {
        self.pattern
            .find_iter(text)
            .any(|m| self.accepted_span(m.as_str()).is_some())
    }

    /// Byte range of `hit` to redact, relative to the hit.
    ///
    /// A greedy hit can swallow neighbouring digit groups and then fail its
    /// validator. In that case the longest sub-span that starts and ends on a
    /// group boundary, matches the whole pattern and passes the validator is
    /// used instead; the leftmost wins a tie.
    pub fn accepted_span(&self, hit: &str) -> Option<(usize, usize)> {
        if self.accepts(hit) {
            return Some((0, hit.len()));
        }
        let bytes = hit.as_bytes();
        let is_sep = |b: u8| !b.is_ascii_alphanumeric();
        let starts: Vec<usize> = (0..bytes.len())
            .filter(|&i| !is_sep(bytes[i]) && (i == 0 || is_sep(bytes[i - 1])))
            .collect();
        let ends: Vec<usize> = (1..=bytes.len())
            .filter(|&i| !is_sep(bytes[i - 1]) && (i == bytes.len() || is_sep(bytes[i])))
            .collect();

        let mut best: Option<(usize, usize)> = None;
        for &start in &starts {
            for &end in ends.iter().filter(|&&end| end > start) {
                if (start, end) == (0, hit.len()) {
                    continue;
                }
                if best.map_or(false, |(s, e)| e - s >= end - start) {
                    continue;
                }
                let window = &hit[start..end];
                if self.matches_whole(window) && self.accepts(window) {
                    best = Some((start, end));
                }
            }
        }
        best
    }

    fn matches_whole(&self, window: &str) -> bool {
        self.pattern
            .find(window)
            .map_or(false, |m| m.start() == 0 && m.end() == window.len())
    }
}

/// Built-in credential rules, in priority order.
pub fn builtin_secret_rules() -> Result<Vec<PrivacyRule>> {
    Ok(vec![
        PrivacyRule::secret(
            "pem_private_key",
            r"-----BEGIN (?:[A-Z]+ )*PRIVATE KEY-----[\s\S]*?-----END (?:[A-Z]+ )*PRIVATE KEY-----",
            "PRIVATE_KEY",
            100,
        )?,
        PrivacyRule::secret(
            "aws_access_key_id",
            r"\b(?:AKIA|ASIA|AGPA|AIDA|AROA|ANPA|ANVA|AIPA)[0-9A-Z]{16}\b",
            "AWS_KEY",
            100,
        )?,
        PrivacyRule::secret(
            "aws_secret_access_key",
            r#"(?i)aws_?secret_?access_?key\s*[:=]\s*["']?[A-Za-z0-9/+=]{40}["']?"#,
            "AWS_SECRET",
            100,
        )?,
        PrivacyRule::secret(
            "github_token",
            r"\b(?:gh[pousr]_[A-Za-z0-9]{36,255}|github_pat_[A-Za-z0-9_]{22,255})\b",
            "GITHUB_TOKEN",
            95,
        )?,
        PrivacyRule::secret(
            "llm_api_key",
            r"\bsk-(?:ant-|proj-)?[A-Za-z0-9_-]{20,}",
            "API_KEY",
            95,
        )?,
        PrivacyRule::secret(
            "slack_token",
            r"\bxox[abprs]-[A-Za-z0-9-]{10,}",
            "SLACK_TOKEN",
            90,
        )?,
        PrivacyRule::secret(
            "jwt",
            r"\beyJ[A-Za-z0-9_-]{8,}\.eyJ[A-Za-z0-9_-]{8,}\.[A-Za-z0-9_-]{8,}",
            "JWT",
            90,
        )?,
        PrivacyRule::secret(
            "bearer_token",
            r"(?i)\bbearer\s+[A-Za-z0-9._~+/-]{20,}=*",
            "BEARER_TOKEN",
            90,
        )?,
        PrivacyRule::secret(
            "connection_url",
            r"\b[A-Za-z][A-Za-z0-9+.-]*://[^\s:/@]+:[^\s@/]+@[^\s/]+",
            "CONNECTION_STRING",
            90,
        )?,
        PrivacyRule::secret(
            "password_assignment",
            r#"(?i)\b(?:password|passwd|pwd|secret|api_key|apikey|token)\s*[:=]\s*["']?[^\s"',;]{6,}["']?"#,
            "PASSWORD",
            85,
        )?,
    ])
}

/// Built-in personal data rules, in priority order.
pub fn builtin_pii_rules() -> Result<Vec<PrivacyRule>> {
    Ok(vec![
        PrivacyRule::pii(
            "email",
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            "EMAIL",
            60,
        )?,
        PrivacyRule::pii("us_ssn", r"\b\d{3}-\d{2}-\d{4}\b", "SSN", 90)?
            .with_validator(Validator::Ssn),
        PrivacyRule::pii(
            "credit_card",
            r"\b(?:\d[ -]?){12,18}\d\b",
            "CREDIT_CARD",
            90,
        )?
        .with_validator(Validator::Luhn),
        PrivacyRule::pii(
            "phone",
            r"(?:\+?1[ .-]?)?(?:\(\d{3}\)|\b[2-9]\d{2})[ .-]?\d{3}[ .-]\d{4}\b",
            "PHONE",
            50,
        )?,
        PrivacyRule::pii(
            "ipv4",
            r"\b(?:(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\b",
            "IP_ADDRESS",
            30,
        )?,
    ])
}
