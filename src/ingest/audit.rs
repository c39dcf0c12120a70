use crate::ingest::util::now_epoch_secs;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

pub const AUDIT_FILE: &str = "audit.log";

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub at_epoch_secs: u64,
    pub phase: String,
    pub status: String,
    pub message: String,
}

/// Append one JSON line to `{logs_dir}/audit.log`.
pub fn append_event(logs_dir: &Path, phase: &str, status: &str, message: &str) -> Result<()> {
    fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create {}", logs_dir.display()))?;
    let event = AuditEvent {
        at_epoch_secs: now_epoch_secs()?,
        phase: phase.to_string(),
        status: status.to_string(),
        message: message.to_string(),
    };

    let line = format!("{}\n", serde_json::to_string(&event)?);
    let path = logs_dir.join(AUDIT_FILE);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Audit writes never fail an ingestion; losing a line is only logged.
pub fn record(logs_dir: &Path, phase: &str, status: &str, message: &str) {
    if let Err(err) = append_event(logs_dir, phase, status, message) {
        tracing::warn!(phase, error = %format!("{err:#}"), "audit append failed");
    }
}
