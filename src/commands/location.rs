use anyhow::Result;

use crate::commands::CommandReport;
use crate::ingest::config::is_league_id;
use crate::ingest::location::postseason_label;
use crate::ingest::paths::resolve_paths;
use crate::ingest::pointer::{DefaultPointer, LeagueContext, load_persisted, scan_latest};
use crate::ingest::store::Store;

fn describe(pointer: &DefaultPointer) -> String {
    let label = pointer
        .week
        .number()
        .and_then(postseason_label)
        .map(|label| format!(" ({label})"))
        .unwrap_or_default();
    format!("season_{} week_{}{label}", pointer.season, pointer.week)
}

pub fn run(league_id: &str) -> Result<CommandReport> {
    let mut report = CommandReport::new("location");
    if !is_league_id(league_id) {
        report.issue(format!("invalid league id `{league_id}`: expected 6-12 digits"));
        return Ok(report);
    }

    let store = Store::new(resolve_paths()?.root);
    report.detail(format!("league={league_id}"));
    match LeagueContext::default().current_location(&store, league_id)? {
        Some(pointer) => report.detail(format!("current={}", describe(&pointer))),
        None => {
            report.issue(format!("no week data stored for league {league_id}"));
            return Ok(report);
        }
    }
    if let Some(pinned) = load_persisted(&store, league_id)? {
        report.detail(format!("pointer.persisted={}", describe(&pinned)));
    }
    if let Some(latest) = scan_latest(&store, league_id)? {
        report.detail(format!("pointer.scanned={}", describe(&latest)));
    }
    Ok(report)
}
