pub mod ingest;
pub mod location;
pub mod rebuild_rosters;
pub mod replay;
pub mod status;
pub mod watch;

use serde::Serialize;

use crate::error::IngestErrorCode;
use crate::ingest::accumulator::FlushSummary;
use crate::ingest::config::{IngestConfig, load_config};
use crate::ingest::orchestrator::IngestionContext;
use crate::ingest::paths::{StorePaths, resolve_paths};

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    pub fn coded_issue(&mut self, code: IngestErrorCode, text: impl AsRef<str>) {
        self.issue(format!("{} {}", code.as_str(), text.as_ref()));
    }

    pub fn flush_summary(&mut self, summary: &FlushSummary) {
        for flushed in &summary.reports {
            self.detail(format!(
                "roster_flush.league={} flushed={} total={} unchanged={} path={}",
                flushed.league_id,
                flushed.flushed,
                flushed.total,
                flushed.unchanged,
                flushed.path.display()
            ));
        }
        for (league, error) in &summary.failures {
            self.coded_issue(
                IngestErrorCode::E006FlushFailed,
                format!("roster flush failed for league {league}: {error}"),
            );
        }
    }
}

/// Paths, validated config and a ready ingestion context.
pub struct Runtime {
    pub paths: StorePaths,
    pub cfg: IngestConfig,
    pub ctx: IngestionContext,
}

/// Build the runtime or record why it could not be built.
pub fn open_runtime(report: &mut CommandReport) -> anyhow::Result<Option<Runtime>> {
    let paths = resolve_paths()?;
    let cfg = match load_config() {
        Ok(cfg) => cfg,
        Err(err) => {
            report.coded_issue(IngestErrorCode::E005ConfigInvalid, format!("{err:#}"));
            return Ok(None);
        }
    };
    let ctx = IngestionContext::with_file_shaper(cfg.clone(), paths.clone())?;
    Ok(Some(Runtime { paths, cfg, ctx }))
}
