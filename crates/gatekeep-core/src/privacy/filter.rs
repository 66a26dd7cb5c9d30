//! Single-pass PII and secret redaction.
//!
//! Every rule is matched against the original text in priority order. A
//! match overlapping a span already claimed by an earlier rule is dropped, so
//! a broad late rule can never preempt a narrower secret. Replacement tokens
//! are numbered per category in text order; counters live only for the
//! duration of one call.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::rule::{builtin_pii_rules, builtin_secret_rules, PrivacyRule, RuleKind};
use crate::domain::Result;

/// Default latency objective for a single call.
pub const DEFAULT_SLO: Duration = Duration::from_millis(50);

/// One redacted span. The matched value itself is never retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub rule: String,
    pub category: String,
    pub kind: RuleKind,
    pub severity: u8,
    /// Byte offsets into the input.
    pub start: usize,
    pub end: usize,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterResult {
    pub filtered: String,
    pub detections: Vec<Detection>,
    /// True iff at least one secret matched.
    pub blocked: bool,
    pub processing_time_ms: f64,
}

impl FilterResult {
    pub fn count(&self, kind: RuleKind) -> usize {
        self.detections.iter().filter(|d| d.kind == kind).count()
    }
}

/// Result of redacting every string leaf in a JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonFilterResult {
    pub value: serde_json::Value,
    pub detections: Vec<Detection>,
    pub blocked: bool,
}

struct Claim<'r> {
    start: usize,
    end: usize,
    rule: &'r PrivacyRule,
}

/// Immutable after construction; safe to share across tasks.
#[derive(Debug, Clone)]
pub struct PrivacyFilter {
    rules: Vec<PrivacyRule>,
    slo: Duration,
}

impl PrivacyFilter {
    /// Filter with the built-in rule set.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> PrivacyFilterBuilder {
        PrivacyFilterBuilder::default()
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[PrivacyRule] {
        &self.rules
    }

    pub fn slo(&self) -> Duration {
        self.slo
    }

    pub fn filter(&self, text: &str) -> FilterResult {
        let started = Instant::now();
        let mut counters = HashMap::new();
        let (filtered, detections) = self.redact(text, &mut counters);
        let elapsed = started.elapsed();
        if elapsed > self.slo {
            warn!(
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                slo_ms = self.slo.as_millis() as u64,
                input_len = text.len(),
                "privacy filter exceeded latency objective"
            );
        }
        let blocked = detections.iter().any(|d| d.kind == RuleKind::Secret);
        FilterResult {
            filtered,
            detections,
            blocked,
            processing_time_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }

    /// Redact every string leaf of `value`. Object keys are left untouched.
    /// Token numbering is shared across the whole value.
    pub fn filter_json(&self, value: &serde_json::Value) -> JsonFilterResult {
        let mut counters = HashMap::new();
        let mut detections = Vec::new();
        let value = self.redact_value(value, &mut counters, &mut detections);
        let blocked = detections.iter().any(|d| d.kind == RuleKind::Secret);
        JsonFilterResult {
            value,
            detections,
            blocked,
        }
    }

    pub fn contains_secrets(&self, text: &str) -> bool {
        self.any_match(text, RuleKind::Secret)
    }

    pub fn contains_pii(&self, text: &str) -> bool {
        self.any_match(text, RuleKind::Pii)
    }

    fn any_match(&self, text: &str, kind: RuleKind) -> bool {
        self.rules
            .iter()
            .filter(|r| r.kind == kind)
            .any(|r| r.is_match(text))
    }

    fn redact_value(
        &self,
        value: &serde_json::Value,
        counters: &mut HashMap<String, usize>,
        detections: &mut Vec<Detection>,
    ) -> serde_json::Value {
        use serde_json::Value;
        match value {
            Value::String(s) => {
                let (filtered, found) = self.redact(s, counters);
                detections.extend(found);
                Value::String(filtered)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.redact_value(v, counters, detections))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.redact_value(v, counters, detections)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn redact(
        &self,
        text: &str,
        counters: &mut HashMap<String, usize>,
    ) -> (String, Vec<Detection>) {
        let mut claims: Vec<Claim<'_>> = Vec::new();
        for rule in &self.rules {
            for m in rule.pattern.find_iter(text) {
                if m.is_empty() {
                    continue;
                }
                let Some((from, to)) = rule.accepted_span(m.as_str()) else {
                    continue;
                };
                let (start, end) = (m.start() + from, m.start() + to);
                let overlaps = claims.iter().any(|c| start < c.end && c.start < end);
                if !overlaps {
                    claims.push(Claim { start, end, rule });
                }
            }
        }
        if claims.is_empty() {
            return (text.to_string(), Vec::new());
        }
        claims.sort_by_key(|c| c.start);

        let mut filtered = String::with_capacity(text.len());
        let mut detections = Vec::with_capacity(claims.len());
        let mut cursor = 0;
        for claim in claims {
            let n = counters.entry(claim.rule.category.clone()).or_insert(0);
            *n += 1;
            let token = claim.rule.token(*n);
            filtered.push_str(&text[cursor..claim.start]);
            filtered.push_str(&token);
            cursor = claim.end;
            detections.push(Detection {
                rule: claim.rule.name.clone(),
                category: claim.rule.category.clone(),
                kind: claim.rule.kind,
                severity: claim.rule.severity,
                start: claim.start,
                end: claim.end,
                token,
            });
        }
        filtered.push_str(&text[cursor..]);
        (filtered, detections)
    }
}

/// Builder for [`PrivacyFilter`].
///
/// Final order: custom secrets, built-in secrets, built-in PII, custom PII.
#[derive(Debug)]
pub struct PrivacyFilterBuilder {
    custom_secrets: Vec<PrivacyRule>,
    custom_pii: Vec<PrivacyRule>,
    include_builtins: bool,
    slo: Duration,
}

impl Default for PrivacyFilterBuilder {
    fn default() -> Self {
        Self {
            custom_secrets: Vec::new(),
            custom_pii: Vec::new(),
            include_builtins: true,
            slo: DEFAULT_SLO,
        }
    }
}

impl PrivacyFilterBuilder {
    /// Add a rule, routed by its kind.
    pub fn rule(mut self, rule: PrivacyRule) -> Self {
        match rule.kind {
            RuleKind::Secret => self.custom_secrets.push(rule),
            RuleKind::Pii => self.custom_pii.push(rule),
        }
        self
    }

    pub fn without_builtins(mut self) -> Self {
        self.include_builtins = false;
        self
    }

    pub fn slo(mut self, slo: Duration) -> Self {
        self.slo = slo;
        self
    }

    pub fn build(self) -> Result<PrivacyFilter> {
        let mut rules = self.custom_secrets;
        if self.include_builtins {
            rules.extend(builtin_secret_rules()?);
            rules.extend(builtin_pii_rules()?);
        }
        rules.extend(self.custom_pii);
        Ok(PrivacyFilter {
            rules,
            slo: self.slo,
        })
    }
}
