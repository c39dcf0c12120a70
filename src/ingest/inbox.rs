use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::ingest::capture::Headers;
use crate::ingest::orchestrator::{IngestOutcome, IngestionContext};

pub const PROCESSED_DIR: &str = "processed";
pub const REJECTED_DIR: &str = "rejected";

/// A delivery dropped into the inbox by the host's front door.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub subpath: String,
    #[serde(default)]
    pub headers: BTreeMap<String, Value>,
    pub body: Value,
}

impl Envelope {
    fn header_map(&self) -> Headers {
        self.headers
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect()
    }

    /// String bodies are passed through verbatim so malformed JSON is still
    /// seen (and rejected) by ingestion.
    fn body_bytes(&self) -> Result<Vec<u8>> {
        match &self.body {
            Value::String(raw) => Ok(raw.clone().into_bytes()),
            other => Ok(serde_json::to_vec(other)?),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InboxEvent {
    pub file_path: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct InboxOutcome {
    pub inbox_dir: String,
    pub detected_files: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub events: Vec<InboxEvent>,
}

fn collect_envelopes(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let entries = fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
        if path.is_file() && is_json {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    if from == to {
        return Ok(());
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    match fs::rename(from, to) {
        Ok(_) => Ok(()),
        Err(rename_err) if rename_err.kind() == ErrorKind::CrossesDevices => {
            fs::copy(from, to).with_context(|| {
                format!("failed to copy {} to {}", from.display(), to.display())
            })?;
            fs::remove_file(from).with_context(|| format!("failed to remove {}", from.display()))?;
            Ok(())
        }
        Err(rename_err) => Err(rename_err)
            .with_context(|| format!("failed to move {} to {}", from.display(), to.display())),
    }
}

fn read_envelope(path: &Path) -> Result<Envelope> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse envelope {}", path.display()))
}

fn settle(inbox_dir: &Path, file: &Path, bucket: &str) -> Result<()> {
    let Some(name) = file.file_name() else {
        return Ok(());
    };
    move_file(file, &inbox_dir.join(bucket).join(name))
}

/// Ingest every envelope currently in the inbox, then move each to
/// `processed/` (accepted or benign) or `rejected/`.
pub fn process(ctx: &IngestionContext, inbox_dir: &Path) -> Result<InboxOutcome> {
    fs::create_dir_all(inbox_dir)
        .with_context(|| format!("failed to create inbox {}", inbox_dir.display()))?;
    let mut out = InboxOutcome {
        inbox_dir: inbox_dir.display().to_string(),
        ..InboxOutcome::default()
    };

    for file in collect_envelopes(inbox_dir)? {
        out.detected_files += 1;
        let key = file.display().to_string();

        let outcome = read_envelope(&file).and_then(|envelope| {
            let body = envelope.body_bytes()?;
            Ok(ctx.ingest(&envelope.subpath, &body, &envelope.header_map()))
        });
        let (bucket, status, message) = match outcome {
            Ok(outcome) => {
                let keep = match &outcome {
                    IngestOutcome::Accepted { .. } => true,
                    IngestOutcome::Rejected(reason) => reason.is_benign(),
                };
                if keep {
                    (PROCESSED_DIR, "accepted", outcome.summary())
                } else {
                    (REJECTED_DIR, "rejected", outcome.summary())
                }
            }
            Err(err) => (REJECTED_DIR, "unreadable", format!("{err:#}")),
        };
        if bucket == PROCESSED_DIR {
            out.accepted += 1;
        } else {
            out.rejected += 1;
        }

        if let Err(err) = settle(inbox_dir, &file, bucket) {
            tracing::warn!(file = %key, error = %format!("{err:#}"), "failed to settle inbox file");
        }
        out.events.push(InboxEvent {
            file_path: key,
            status: status.to_string(),
            message,
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::config::IngestConfig;
    use crate::ingest::paths::StorePaths;
    use serde_json::json;
    use tempfile::tempdir;

    fn drop_envelope(dir: &Path, name: &str, value: &Value) {
        fs::create_dir_all(dir).expect("inbox");
        fs::write(dir.join(name), serde_json::to_vec(value).expect("encode")).expect("write");
    }

    #[test]
    fn envelopes_are_ingested_and_settled() {
        let tmp = tempdir().expect("tempdir");
        let paths = StorePaths::under(tmp.path());
        let mut cfg = IngestConfig::default();
        cfg.capture.enabled = false;
        let ctx = IngestionContext::with_file_shaper(cfg, paths.clone()).expect("context");

        drop_envelope(
            &paths.inbox_dir,
            "001.json",
            &json!({
                "subpath": "ps5/17287266/week/reg/3/schedules",
                "headers": {"content-type": "application/json"},
                "body": {"gameScheduleInfoList": [{"seasonIndex": 2, "weekIndex": 3}]}
            }),
        );
        drop_envelope(
            &paths.inbox_dir,
            "002.json",
            &json!({"subpath": "ps5/17287266/schedules", "body": "{truncated"}),
        );
        fs::write(paths.inbox_dir.join("003.json"), "not an envelope").expect("junk");
        fs::write(paths.inbox_dir.join("notes.txt"), "ignored").expect("txt");

        let out = process(&ctx, &paths.inbox_dir).expect("process");
        assert_eq!(out.detected_files, 3);
        assert_eq!(out.accepted, 1);
        assert_eq!(out.rejected, 2);
        assert!(paths.inbox_dir.join(PROCESSED_DIR).join("001.json").exists());
        assert!(paths.inbox_dir.join(REJECTED_DIR).join("002.json").exists());
        assert!(paths.inbox_dir.join(REJECTED_DIR).join("003.json").exists());
        assert!(paths.inbox_dir.join("notes.txt").exists());
        assert!(
            ctx.store()
                .league_dir("17287266")
                .join("season_3/week_3/schedules.json")
                .exists()
        );

        let again = process(&ctx, &paths.inbox_dir).expect("second pass");
        assert_eq!(again.detected_files, 0);
    }
}
