//! Compliance export of the audit trail.
//!
//! Exports are written next to a `.digest` sidecar holding the SHA-256 of the
//! file, so a copy can be checked for tampering after it leaves the system.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use gatekeep_store::AuditEntry;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{GovernanceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditFormat {
    Json,
    Csv,
}

impl AuditFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl std::str::FromStr for AuditFormat {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(GovernanceError::InvalidInput(format!(
                "unknown export format: {other}"
            ))),
        }
    }
}

/// Rendered export ready to hand to a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditExport {
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Receipt for an export written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditExportReceipt {
    pub path: PathBuf,
    pub digest: String,
    pub entry_count: usize,
    pub format: AuditFormat,
    pub exported_at: DateTime<Utc>,
}

const CSV_HEADER: [&str; 15] = [
    "seq",
    "entry_id",
    "timestamp",
    "event_type",
    "actor",
    "tenant_id",
    "assessment_id",
    "approval_id",
    "workflow_id",
    "risk_level",
    "action",
    "outcome",
    "details",
    "prev_digest",
    "digest",
];

pub fn render(entries: &[AuditEntry], format: AuditFormat) -> Result<AuditExport> {
    let bytes = match format {
        AuditFormat::Json => serde_json::to_vec_pretty(entries)?,
        AuditFormat::Csv => render_csv(entries).into_bytes(),
    };
    Ok(AuditExport {
        content_type: format.content_type(),
        bytes,
    })
}

fn render_csv(entries: &[AuditEntry]) -> String {
    let mut out = String::new();
    push_row(&mut out, CSV_HEADER.iter().map(|h| h.to_string()));
    for e in entries {
        push_row(
            &mut out,
            [
                e.seq.to_string(),
                e.entry_id.clone(),
                e.timestamp.to_rfc3339(),
                e.event_type.as_str().to_string(),
                e.actor.clone(),
                e.tenant_id.clone().unwrap_or_default(),
                e.subject.assessment_id.clone().unwrap_or_default(),
                e.subject.approval_id.clone().unwrap_or_default(),
                e.subject.workflow_id.clone().unwrap_or_default(),
                e.risk_level.clone().unwrap_or_default(),
                e.action.clone().unwrap_or_default(),
                e.outcome.as_str().to_string(),
                e.details.to_string(),
                e.prev_digest.clone(),
                e.digest.clone(),
            ],
        );
    }
    out
}

fn push_row(out: &mut String, fields: impl IntoIterator<Item = String>) {
    let mut first = true;
    for field in fields {
        if !first {
            out.push(',');
        }
        first = false;
        out.push_str(&csv_field(&field));
    }
    out.push_str("\r\n");
}

/// RFC 4180 quoting: wrap in quotes when needed, double embedded quotes.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn digest_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".digest");
    PathBuf::from(name)
}

/// Write `export` into `dir` with a digest sidecar.
pub fn write_export(
    dir: &Path,
    format: AuditFormat,
    export: &AuditExport,
    entry_count: usize,
) -> Result<AuditExportReceipt> {
    std::fs::create_dir_all(dir)?;
    let exported_at = Utc::now();
    let filename = format!(
        "audit-export-{}.{}",
        exported_at.format("%Y%m%dT%H%M%S%3fZ"),
        format.extension()
    );
    let path = dir.join(filename);
    let digest = sha256_hex(&export.bytes);
    std::fs::write(&path, &export.bytes)?;
    std::fs::write(digest_path(&path), digest.as_bytes())?;
    tracing::info!(path = %path.display(), entries = entry_count, "audit export written");
    Ok(AuditExportReceipt {
        path,
        digest,
        entry_count,
        format,
        exported_at,
    })
}

/// Check an export against its sidecar. `false` when the sidecar is missing
/// or the digest differs.
pub fn verify_export(path: &Path) -> Result<bool> {
    let sidecar = digest_path(path);
    if !sidecar.exists() {
        return Ok(false);
    }
    let data = std::fs::read(path)?;
    let expected = std::fs::read_to_string(&sidecar)?;
    Ok(expected.trim() == sha256_hex(&data))
}
