use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use fs2::FileExt;
use serde_json::json;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::commands::{CommandReport, Runtime, open_runtime};
use crate::error::IngestErrorCode;
use crate::ingest::inbox::{self, InboxOutcome};

#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub once: bool,
    pub daemon: bool,
}

/// Exclusive daemon lock; released when the file handle drops.
fn acquire_lock(path: &Path) -> Result<Option<File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    if file.try_lock_exclusive().is_err() {
        return Ok(None);
    }

    let payload = json!({
        "pid": std::process::id(),
        "build_uuid": env!("BUILD_UUID"),
        "start_time": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    });
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(serde_json::to_string(&payload)?.as_bytes())?;
    file.sync_all()?;
    Ok(Some(file))
}

fn report_cycle(report: &mut CommandReport, cycle: &InboxOutcome) {
    report.detail(format!("inbox.dir={}", cycle.inbox_dir));
    report.detail(format!("inbox.detected_files={}", cycle.detected_files));
    report.detail(format!("inbox.accepted={}", cycle.accepted));
    report.detail(format!("inbox.rejected={}", cycle.rejected));
    for event in &cycle.events {
        report.detail(format!(
            "inbox.event={} status={} message={}",
            event.file_path, event.status, event.message
        ));
    }
}

fn run_daemon(runtime: &Runtime, report: &mut CommandReport) -> Result<()> {
    let lock_path = runtime.paths.lock_file();
    let Some(_lock) = acquire_lock(&lock_path)? else {
        report.coded_issue(
            IngestErrorCode::E001Locked,
            format!("another watcher holds {}", lock_path.display()),
        );
        return Ok(());
    };

    let poll = Duration::from_millis(runtime.cfg.watch.poll_interval_ms);
    tracing::info!(
        inbox = %runtime.paths.inbox_dir.display(),
        poll_ms = runtime.cfg.watch.poll_interval_ms,
        "inbox watcher started"
    );
    loop {
        match inbox::process(&runtime.ctx, &runtime.paths.inbox_dir) {
            Ok(cycle) if cycle.detected_files > 0 => tracing::info!(
                detected = cycle.detected_files,
                accepted = cycle.accepted,
                rejected = cycle.rejected,
                "inbox cycle"
            ),
            Ok(_) => {}
            Err(err) => tracing::warn!(
                code = IngestErrorCode::E003InboxUnreadable.as_str(),
                error = %format!("{err:#}"),
                "inbox cycle failed"
            ),
        }
        thread::sleep(poll);
    }
}

pub fn run(opts: &WatchOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("watch");

    if opts.once == opts.daemon {
        report.issue("invalid flags: use exactly one of --once or --daemon");
        return Ok(report);
    }
    let Some(runtime) = open_runtime(&mut report)? else {
        return Ok(report);
    };

    if opts.daemon {
        run_daemon(&runtime, &mut report)?;
        return Ok(report);
    }

    match inbox::process(&runtime.ctx, &runtime.paths.inbox_dir) {
        Ok(cycle) => report_cycle(&mut report, &cycle),
        Err(err) => report.coded_issue(IngestErrorCode::E003InboxUnreadable, format!("{err:#}")),
    }
    let summary = runtime.ctx.shutdown();
    report.flush_summary(&summary);
    Ok(report)
}
