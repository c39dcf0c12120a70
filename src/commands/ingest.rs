use anyhow::{Context, Result};
use std::fs;
use std::io::Read;
use std::path::PathBuf;

use crate::commands::{CommandReport, open_runtime};
use crate::ingest::capture::Headers;
use crate::ingest::orchestrator::{IngestOutcome, REPLAY_HEADERS};

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Document to ingest; `None` or `-` reads stdin.
    pub file: Option<PathBuf>,
    pub hint: String,
    pub replay: bool,
    /// Leave roster chunks buffered instead of flushing before exit.
    pub no_flush: bool,
}

fn read_body(file: Option<&PathBuf>) -> Result<Vec<u8>> {
    match file {
        Some(path) if path.as_os_str() != "-" => {
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))
        }
        _ => {
            let mut body = Vec::new();
            std::io::stdin()
                .read_to_end(&mut body)
                .context("failed to read document from stdin")?;
            Ok(body)
        }
    }
}

pub fn run(opts: &IngestOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("ingest");
    let Some(runtime) = open_runtime(&mut report)? else {
        return Ok(report);
    };

    let body = read_body(opts.file.as_ref())?;
    let mut headers = Headers::new();
    if opts.replay {
        headers.insert(REPLAY_HEADERS[0].to_string(), "true".to_string());
    }

    let outcome = runtime.ctx.ingest(&opts.hint, &body, &headers);
    report.detail(format!("hint={}", opts.hint));
    report.detail(format!("replay={}", opts.replay));
    match &outcome {
        IngestOutcome::Accepted { .. } => report.detail(outcome.summary()),
        IngestOutcome::Rejected(reason) if reason.is_benign() => report.detail(outcome.summary()),
        IngestOutcome::Rejected(_) => report.issue(outcome.summary()),
    }

    if opts.no_flush {
        for league in runtime.ctx.rosters().pending_leagues() {
            report.detail(format!(
                "roster_pending.league={} players={}",
                league,
                runtime.ctx.rosters().pending_count(&league)
            ));
        }
    } else {
        let summary = runtime.ctx.shutdown();
        report.flush_summary(&summary);
    }

    Ok(report)
}
