use predicates::prelude::*;
use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const LEAGUE: &str = "17287266";

fn franchise(home: &Path, capture: bool) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("franchise-ingest");
    cmd.current_dir(home)
        .env("HOME", home)
        .env("FRANCHISE_HOME", home)
        .env("FRANCHISE_ROOT", home.join("uploads"))
        .env("FRANCHISE_CONFIG_PATH", home.join("ingest.toml"))
        .env("FRANCHISE_CAPTURE_ENABLED", if capture { "true" } else { "false" })
        .env("FRANCHISE_LOG", "warn")
        .env_remove("FRANCHISE_INBOX_DIR")
        .env_remove("FRANCHISE_LOGS_DIR");
    cmd
}

#[test]
fn replay_rebuilds_store_from_capture_log() {
    let tmp = tempdir().expect("tempdir");
    franchise(tmp.path(), true)
        .arg("ingest")
        .arg("--hint")
        .arg("ps5/17287266/week/reg/4/schedules")
        .write_stdin(r#"{"gameScheduleInfoList":[{"seasonIndex":1,"weekIndex":4}]}"#)
        .assert()
        .success();
    franchise(tmp.path(), true)
        .arg("ingest")
        .arg("--hint")
        .arg("ps5/17287266/standings")
        .write_stdin(r#"{"teamStandingInfoList":[{"teamId":5,"totalWins":4}]}"#)
        .assert()
        .success();

    let uploads = tmp.path().join("uploads");
    let capture = uploads.join("webhook_debug.log");
    let captured = fs::read_to_string(&capture).expect("capture log");
    assert_eq!(captured.matches("===== NEW WEBHOOK:").count(), 2);

    fs::remove_dir_all(uploads.join(LEAGUE)).expect("wipe league");
    franchise(tmp.path(), true)
        .arg("replay")
        .assert()
        .success()
        .stdout(predicate::str::contains("replay.accepted=2"));

    assert!(uploads.join(LEAGUE).join("season_2/week_4/schedules.json").exists());
    assert!(
        uploads
            .join(LEAGUE)
            .join("season_global/week_global/parsed_standings.json")
            .exists()
    );
    assert_eq!(fs::read_to_string(&capture).expect("capture log"), captured);
}

#[test]
fn watch_once_settles_inbox_envelopes() {
    let tmp = tempdir().expect("tempdir");
    let inbox = tmp.path().join("uploads").join("_inbox");
    fs::create_dir_all(&inbox).expect("inbox");
    fs::write(
        inbox.join("0001.json"),
        json!({
            "subpath": "ps5/17287266/leagueteams",
            "headers": {"x-simulated": "true"},
            "body": {"teamInfoList": [{"teamId": 5, "abbrName": "CHI", "calendarYear": 2027}]}
        })
        .to_string(),
    )
    .expect("envelope");
    fs::write(
        inbox.join("0002.json"),
        json!({"subpath": "ps5/passing", "body": {"playerPassingStatInfoList": []}}).to_string(),
    )
    .expect("envelope");

    franchise(tmp.path(), false)
        .arg("watch")
        .arg("--once")
        .assert()
        .success()
        .stdout(predicate::str::contains("inbox.accepted=1"))
        .stdout(predicate::str::contains("inbox.rejected=1"));

    assert!(inbox.join("processed/0001.json").exists());
    assert!(inbox.join("rejected/0002.json").exists());
    let team_map = tmp.path().join("uploads").join(LEAGUE).join("team_map.json");
    let raw = fs::read_to_string(team_map).expect("team map");
    assert!(raw.contains("\"abbr\": \"CHI\""));
}

#[test]
fn watch_requires_exactly_one_mode() {
    let tmp = tempdir().expect("tempdir");
    franchise(tmp.path(), false)
        .arg("watch")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("exactly one of --once or --daemon"));
}
