use anyhow::Result;

use crate::commands::CommandReport;
use crate::ingest::audit;
use crate::ingest::config::is_league_id;
use crate::ingest::paths::resolve_paths;
use crate::ingest::roster::{AGGREGATE_FILE, BY_TEAM_DIR, collect_team_snapshots, render_aggregate};
use crate::ingest::store::{Store, write_document};

/// Rebuild a league's roster aggregate solely from its per-team snapshots.
pub fn run(league_id: &str) -> Result<CommandReport> {
    let mut report = CommandReport::new("rebuild-rosters");
    if !is_league_id(league_id) {
        report.issue(format!("invalid league id `{league_id}`: expected 6-12 digits"));
        return Ok(report);
    }

    let paths = resolve_paths()?;
    let global_dir = Store::new(&paths.root).global_dir(league_id);
    let by_team_dir = global_dir.join(BY_TEAM_DIR);
    if !by_team_dir.is_dir() {
        report.issue(format!("no team snapshots at {}", by_team_dir.display()));
        return Ok(report);
    }

    let (players, teams) = collect_team_snapshots(&by_team_dir)?;
    let written = write_document(&global_dir.join(AGGREGATE_FILE), &render_aggregate(&players))?;
    report.detail(format!("teams.read={teams}"));
    report.detail(format!("players={}", players.len()));
    report.detail(format!(
        "aggregate={} bytes={} unchanged={}",
        written.path.display(),
        written.bytes,
        written.unchanged
    ));
    audit::record(
        &paths.logs_dir,
        "rebuild_rosters",
        "ok",
        &format!("league={league_id} teams={teams} players={}", players.len()),
    );
    Ok(report)
}
