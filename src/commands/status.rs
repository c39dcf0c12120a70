use anyhow::Result;
use fs2::FileExt;
use serde_json::Value;
use std::env;
use std::fs::{self, OpenOptions};
use std::path::Path;

use crate::commands::CommandReport;
use crate::error::IngestErrorCode;
use crate::ingest::config::{is_league_id, load_config, resolve_config_path};
use crate::ingest::paths::resolve_paths;
use crate::ingest::pointer::LeagueContext;
use crate::ingest::store::Store;
use crate::ingest::util::pid_alive;

include!(concat!(env!("OUT_DIR"), "/franchise_env_allowlist.rs"));

fn check_store_writable(root: &Path, report: &mut CommandReport) {
    if !root.exists() {
        report.detail("store.root=missing (created on first write)");
        return;
    }
    match tempfile::Builder::new().prefix(".status.").tempfile_in(root) {
        Ok(_) => report.detail("store.writable=ok"),
        Err(err) => report.coded_issue(
            IngestErrorCode::E004StoreUnwritable,
            format!("{} is not writable: {err}", root.display()),
        ),
    }
}

fn lock_is_held(path: &Path) -> bool {
    let Ok(file) = OpenOptions::new().read(true).write(true).open(path) else {
        return false;
    };
    match file.try_lock_exclusive() {
        Ok(()) => {
            let _ = FileExt::unlock(&file);
            false
        }
        Err(_) => true,
    }
}

fn check_daemon_lock(path: &Path, report: &mut CommandReport) {
    if !path.exists() {
        report.detail("daemon.lock=not_found (watcher likely not running)");
        return;
    }
    let payload = match fs::read_to_string(path)
        .map_err(|err| err.to_string())
        .and_then(|raw| serde_json::from_str::<Value>(&raw).map_err(|err| err.to_string()))
    {
        Ok(payload) => payload,
        Err(err) => {
            report.issue(format!("daemon.lock=unreadable ({err})"));
            return;
        }
    };

    let held = lock_is_held(path);
    report.detail(format!("daemon.lock=found held={held}"));
    if let Some(started) = payload.get("start_time").and_then(Value::as_str) {
        report.detail(format!("daemon.start_time={started}"));
    }
    if let Some(pid) = payload.get("pid").and_then(Value::as_u64) {
        let alive = u32::try_from(pid).map(pid_alive).unwrap_or(false);
        report.detail(format!("daemon.pid={pid} alive={alive}"));
    }
    if !held {
        return;
    }
    if let Some(lock_build) = payload.get("build_uuid").and_then(Value::as_str) {
        let current = env!("BUILD_UUID");
        if lock_build == current {
            report.detail("daemon.build_match=ok");
        } else {
            report.coded_issue(
                IngestErrorCode::E002StaleBuild,
                format!("watcher runs build {lock_build}, current build is {current}"),
            );
        }
    }
}

fn report_leagues(root: &Path, report: &mut CommandReport) -> Result<()> {
    if !root.is_dir() {
        return Ok(());
    }
    let store = Store::new(root);
    let context = LeagueContext::default();
    let mut leagues = fs::read_dir(root)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| is_league_id(name))
        .collect::<Vec<_>>();
    leagues.sort();
    for league in leagues {
        match context.current_location(&store, &league) {
            Ok(Some(pointer)) => report.detail(format!(
                "league.{league}=season_{} week_{}",
                pointer.season, pointer.week
            )),
            Ok(None) => report.detail(format!("league.{league}=no week data")),
            Err(err) => report.issue(format!("league.{league}=unreadable ({err:#})")),
        }
    }
    Ok(())
}

pub fn run() -> Result<CommandReport> {
    let mut report = CommandReport::new("status");
    let paths = resolve_paths()?;

    report.detail(format!("build_uuid={}", env!("BUILD_UUID")));
    report.detail(format!("root={}", paths.root.display()));
    report.detail(format!("inbox_dir={}", paths.inbox_dir.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
    report.detail(format!("capture_file={}", paths.capture_file.display()));
    match resolve_config_path() {
        Some(path) => report.detail(format!(
            "config_path={} exists={}",
            path.display(),
            path.is_file()
        )),
        None => report.detail("config_path=unresolved"),
    }

    match load_config() {
        Ok(cfg) => {
            report.detail(format!("roster.debounce_ms={}", cfg.roster.debounce_ms));
            report.detail(format!(
                "league.fallback_id={}",
                cfg.league.fallback_id.as_deref().unwrap_or("none")
            ));
            report.detail(format!("capture.enabled={}", cfg.capture.enabled));
            report.detail(format!("capture.max_bytes={}", cfg.capture.max_bytes));
            report.detail(format!("watch.poll_interval_ms={}", cfg.watch.poll_interval_ms));
        }
        Err(err) => report.coded_issue(IngestErrorCode::E005ConfigInvalid, format!("{err:#}")),
    }

    for key in GENERATED_FRANCHISE_ENV_ALLOWLIST {
        if env::var_os(key).is_some() {
            report.detail(format!("env.{key}=set"));
        }
    }

    check_store_writable(&paths.root, &mut report);
    check_daemon_lock(&paths.lock_file(), &mut report);
    report_leagues(&paths.root, &mut report)?;
    Ok(report)
}
