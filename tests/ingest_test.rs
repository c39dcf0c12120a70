use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const LEAGUE: &str = "17287266";

fn franchise(home: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("franchise-ingest");
    cmd.current_dir(home)
        .env("HOME", home)
        .env("FRANCHISE_HOME", home)
        .env("FRANCHISE_ROOT", home.join("uploads"))
        .env("FRANCHISE_CONFIG_PATH", home.join("ingest.toml"))
        .env("FRANCHISE_CAPTURE_ENABLED", "false")
        .env("FRANCHISE_LOG", "warn")
        .env_remove("FRANCHISE_INBOX_DIR")
        .env_remove("FRANCHISE_LOGS_DIR")
        .env_remove("FRANCHISE_FALLBACK_LEAGUE_ID");
    cmd
}

fn read_json(path: &Path) -> Value {
    let raw = fs::read_to_string(path).expect("read json file");
    serde_json::from_str(&raw).expect("parse json file")
}

fn write_doc(path: &Path, value: &Value) {
    fs::write(path, serde_json::to_vec(value).expect("encode")).expect("write doc");
}

#[test]
fn schedule_lands_in_resolved_week_and_sets_pointer() {
    let tmp = tempdir().expect("tempdir");
    let doc = tmp.path().join("schedule.json");
    write_doc(
        &doc,
        &json!({"gameScheduleInfoList": [{"homeTeamId": 1, "awayTeamId": 2, "weekIndex": 3, "seasonIndex": 2}]}),
    );

    franchise(tmp.path())
        .arg("ingest")
        .arg(&doc)
        .arg("--hint")
        .arg("ps5/17287266/schedules/week/reg/3")
        .assert()
        .success()
        .stdout(predicate::str::contains("schedule -> 17287266/season_3/week_3"));

    let league_dir = tmp.path().join("uploads").join(LEAGUE);
    assert!(league_dir.join("season_3/week_3/schedules.json").exists());
    assert_eq!(
        read_json(&league_dir.join("default_week.json")),
        json!({"season": 3, "week": 3})
    );

    franchise(tmp.path())
        .arg("location")
        .arg(LEAGUE)
        .assert()
        .success()
        .stdout(predicate::str::contains("current=season_3 week_3"));
}

#[test]
fn undatable_stats_are_rejected_without_writing() {
    let tmp = tempdir().expect("tempdir");
    franchise(tmp.path())
        .arg("ingest")
        .arg("--hint")
        .arg("ps5/17287266/passing")
        .write_stdin(r#"{"playerPassingStatInfoList":[{"rosterId":1}]}"#)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("unresolvable_season"));

    assert!(!tmp.path().join("uploads").join(LEAGUE).exists());
}

#[test]
fn upstream_failure_is_benign() {
    let tmp = tempdir().expect("tempdir");
    franchise(tmp.path())
        .arg("ingest")
        .arg("--hint")
        .arg("ps5/17287266/team/5/roster")
        .write_stdin(r#"{"success":false,"rosterInfoList":[]}"#)
        .assert()
        .success()
        .stdout(predicate::str::contains("upstream_failure"));
}

#[test]
fn roster_chunks_accumulate_across_flushes_and_rebuild() {
    let tmp = tempdir().expect("tempdir");
    for (team, id) in [(5, "A1"), (9, "B2")] {
        franchise(tmp.path())
            .arg("ingest")
            .arg("--hint")
            .arg(format!("ps5/17287266/team/{team}/roster"))
            .write_stdin(
                json!({"teamId": team, "rosterInfoList": [{"rosterId": id, "teamId": team}]})
                    .to_string(),
            )
            .assert()
            .success()
            .stdout(predicate::str::contains("roster_flush.league=17287266"));
    }

    let global = tmp.path().join("uploads").join(LEAGUE).join("season_global/week_global");
    let aggregate = read_json(&global.join("parsed_rosters.json"));
    assert_eq!(aggregate["meta"]["count"], 2);
    assert!(global.join("rosters_by_team/5.json").exists());
    assert!(global.join("rosters_by_team/9.json").exists());

    fs::remove_file(global.join("parsed_rosters.json")).expect("remove aggregate");
    franchise(tmp.path())
        .arg("rebuild-rosters")
        .arg(LEAGUE)
        .assert()
        .success()
        .stdout(predicate::str::contains("players=2"));
    assert_eq!(read_json(&global.join("parsed_rosters.json"))["meta"]["count"], 2);
}

#[test]
fn invalid_config_reports_code() {
    let tmp = tempdir().expect("tempdir");
    franchise(tmp.path())
        .env("FRANCHISE_ROSTER_DEBOUNCE_MS", "0")
        .arg("ingest")
        .arg("--hint")
        .arg("ps5/17287266/standings")
        .write_stdin("{}")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("E005_CONFIG_INVALID"));
}

#[test]
fn location_rejects_bad_league_id() {
    let tmp = tempdir().expect("tempdir");
    franchise(tmp.path())
        .arg("location")
        .arg("abc")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("invalid league id"));
}

#[test]
fn status_reports_build_and_paths_as_json() {
    let tmp = tempdir().expect("tempdir");
    let out = franchise(tmp.path())
        .env("FRANCHISE_CAPTURE_MAX_BYTES", "4096")
        .arg("status")
        .arg("--json")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: Value = serde_json::from_slice(&out).expect("json report");
    assert_eq!(report["command"], "status");
    assert_eq!(report["ok"], true);
    let details = report["details"].as_array().expect("details");
    assert!(details.iter().any(|d| d.as_str().is_some_and(|s| s.starts_with("build_uuid="))));
    assert!(details.iter().any(|d| d == "env.FRANCHISE_ROOT=set"));
    assert!(details.iter().any(|d| d == "env.FRANCHISE_CAPTURE_MAX_BYTES=set"));
    assert!(details.iter().any(|d| d == "capture.max_bytes=4096"));
}

#[test]
fn payload_ids_cannot_leave_the_store() {
    let tmp = tempdir().expect("tempdir");
    let outside = tmp.path().join("escaped");
    franchise(tmp.path())
        .arg("ingest")
        .arg("--hint")
        .arg("ps5/17287266/schedules")
        .write_stdin(
            json!({"leagueId": outside.display().to_string(), "seasonIndex": 0, "weekIndex": 1, "gameScheduleInfoList": []})
                .to_string(),
        )
        .assert()
        .success()
        .stdout(predicate::str::contains("schedule -> 17287266/season_1/week_1"));
    assert!(!outside.exists());

    franchise(tmp.path())
        .arg("ingest")
        .arg("--hint")
        .arg("ps5/schedules")
        .write_stdin(r#"{"leagueId":"../dotdot","seasonIndex":0,"weekIndex":1,"gameScheduleInfoList":[]}"#)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("unresolvable_league"));
    assert!(!tmp.path().join("dotdot").exists());

    franchise(tmp.path())
        .arg("ingest")
        .arg("--hint")
        .arg("ps5/17287266/team/5/roster")
        .write_stdin(r#"{"rosterInfoList":[{"rosterId":"X","teamId":"../../../../pwn"}]}"#)
        .assert()
        .success();
    assert!(!tmp.path().join("uploads").join("pwn.json").exists());
    assert!(!tmp.path().join("pwn.json").exists());
}

#[test]
fn extreme_season_index_is_rejected_not_fatal() {
    let tmp = tempdir().expect("tempdir");
    franchise(tmp.path())
        .arg("ingest")
        .arg("--hint")
        .arg("ps5/17287266/schedules")
        .write_stdin(r#"{"seasonIndex":9223372036854775807,"weekIndex":1,"gameScheduleInfoList":[]}"#)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("unresolvable_season"));
}
