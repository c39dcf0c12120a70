use anyhow::Result;
use std::path::PathBuf;

use crate::commands::{CommandReport, open_runtime};
use crate::ingest::capture::read_log;
use crate::ingest::orchestrator::REPLAY_HEADERS;

#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Capture log to replay; defaults to the live capture file.
    pub capture: Option<PathBuf>,
}

pub fn run(opts: &ReplayOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("replay");
    let Some(runtime) = open_runtime(&mut report)? else {
        return Ok(report);
    };

    let source = opts
        .capture
        .clone()
        .unwrap_or_else(|| runtime.paths.capture_file.clone());
    if !source.is_file() {
        report.issue(format!("capture log not found: {}", source.display()));
        return Ok(report);
    }
    let log = read_log(&source)?;
    report.detail(format!("capture={}", source.display()));
    report.detail(format!("blocks.parsed={}", log.deliveries.len()));
    report.detail(format!("blocks.skipped={}", log.skipped));

    let mut accepted = 0usize;
    let mut rejected = 0usize;
    for delivery in &log.deliveries {
        let mut headers = delivery.headers.clone();
        headers.insert(REPLAY_HEADERS[0].to_string(), "true".to_string());
        let outcome = runtime
            .ctx
            .ingest(&delivery.hint, delivery.body.as_bytes(), &headers);
        if outcome.is_accepted() {
            accepted += 1;
        } else {
            rejected += 1;
        }
        report.detail(format!("replay.{}={}", delivery.hint, outcome.summary()));
    }
    report.detail(format!("replay.accepted={accepted}"));
    report.detail(format!("replay.rejected={rejected}"));

    let summary = runtime.ctx.shutdown();
    report.flush_summary(&summary);
    Ok(report)
}
