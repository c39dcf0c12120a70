use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::ingest::classify::ROSTER_LIST;
use crate::ingest::fields::{as_integer, first_string, path_value, scalar_string};
use crate::ingest::store::read_json;

pub const AGGREGATE_FILE: &str = "parsed_rosters.json";
pub const BY_TEAM_DIR: &str = "rosters_by_team";

const ROSTER_ID_FIELDS: &[&str] = &["rosterId"];
const PLAYER_ID_FIELDS: &[&str] = &["playerId"];
const ALT_ID_FIELDS: &[&str] = &["id", "personaId"];
const INCOMING_LISTS: &[&str] = &[ROSTER_LIST, "players"];
const STORED_LISTS: &[&str] = &["players", ROSTER_LIST, "items"];
const OVERALL_FIELDS: &[&str] = &["playerBestOvr", "overallRating", "ovr"];
const SPEED_FIELDS: &[&str] = &["speedRating", "spd"];

/// One upstream player: an opaque attribute bag plus its identity key.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub key: String,
    pub attrs: Value,
}

impl PlayerRecord {
    pub fn new(attrs: Value) -> Self {
        Self {
            key: player_key(&attrs),
            attrs,
        }
    }

    pub fn team_id(&self) -> Option<String> {
        path_value(&self.attrs, "teamId").and_then(scalar_string)
    }
}

pub type RosterMap = BTreeMap<String, PlayerRecord>;

fn folded(attrs: &Value, field: &str) -> String {
    path_value(attrs, field)
        .and_then(scalar_string)
        .unwrap_or_default()
        .to_lowercase()
}

/// Identity: roster id, then player id, then alternate ids, then a case-folded
/// (first, last, position, team) composite. Always yields a key.
pub fn player_key(attrs: &Value) -> String {
    if let Some(id) = first_string(attrs, ROSTER_ID_FIELDS) {
        return format!("rid:{id}");
    }
    if let Some(id) = first_string(attrs, PLAYER_ID_FIELDS) {
        return format!("pid:{id}");
    }
    if let Some(id) = first_string(attrs, ALT_ID_FIELDS) {
        return format!("alt:{id}");
    }
    format!(
        "name:{}|{}|{}|{}",
        folded(attrs, "firstName"),
        folded(attrs, "lastName"),
        folded(attrs, "position"),
        folded(attrs, "teamId"),
    )
}

/// Player objects carried by a roster chunk; non-object entries are dropped.
pub fn incoming_players(document: &Value) -> Vec<PlayerRecord> {
    INCOMING_LISTS
        .iter()
        .find_map(|field| document.get(field).and_then(Value::as_array))
        .map(|list| {
            list.iter()
                .filter(|item| item.is_object())
                .cloned()
                .map(PlayerRecord::new)
                .collect()
        })
        .unwrap_or_default()
}

/// A failed export: `success: false` with nothing to merge.
pub fn is_failed_envelope(document: &Value, players: &[PlayerRecord]) -> bool {
    let failed = matches!(document.get("success"), Some(Value::Bool(false)));
    failed && players.is_empty()
}

pub fn failure_message(document: &Value) -> String {
    first_string(document, &["message", "error", "reason"])
        .unwrap_or_else(|| "success=false with no records".to_string())
}

fn stored_players(value: &Value) -> Vec<Value> {
    if let Some(list) = value.as_array() {
        return list.clone();
    }
    STORED_LISTS
        .iter()
        .find_map(|field| value.get(field).and_then(Value::as_array))
        .cloned()
        .unwrap_or_default()
}

pub fn map_from_values(values: Vec<Value>) -> RosterMap {
    let mut map = RosterMap::new();
    for attrs in values.into_iter().filter(Value::is_object) {
        let record = PlayerRecord::new(attrs);
        map.insert(record.key.clone(), record);
    }
    map
}

/// Load the persisted aggregate. A missing file is an empty roster; an
/// unreadable one is an error so a flush never overwrites what it cannot see.
pub fn load_aggregate(path: &Path) -> Result<RosterMap> {
    let Some(value) = read_json(path)? else {
        return Ok(RosterMap::new());
    };
    Ok(map_from_values(stored_players(&value)))
}

/// Union by key: `incoming` wins on conflict, keys only in `base` survive.
pub fn union(mut base: RosterMap, incoming: &RosterMap) -> RosterMap {
    for (key, record) in incoming {
        base.insert(key.clone(), record.clone());
    }
    base
}

fn rating(attrs: &Value, fields: &[&str]) -> i64 {
    fields
        .iter()
        .filter_map(|f| attrs.get(*f))
        .find_map(as_integer)
        .unwrap_or(0)
}

fn distinct_teams(map: &RosterMap) -> usize {
    map.values()
        .filter_map(PlayerRecord::team_id)
        .collect::<BTreeSet<_>>()
        .len()
}

/// Persisted shape: players sorted by overall then speed (descending) with a
/// small meta block.
pub fn render_aggregate(map: &RosterMap) -> Value {
    let mut records = map.values().collect::<Vec<_>>();
    records.sort_by(|a, b| {
        let ka = (rating(&a.attrs, OVERALL_FIELDS), rating(&a.attrs, SPEED_FIELDS));
        let kb = (rating(&b.attrs, OVERALL_FIELDS), rating(&b.attrs, SPEED_FIELDS));
        kb.cmp(&ka).then_with(|| a.key.cmp(&b.key))
    });
    json!({
        "players": records.iter().map(|r| r.attrs.clone()).collect::<Vec<_>>(),
        "meta": {
            "count": map.len(),
            "teams": distinct_teams(map),
        }
    })
}

/// Group records by team id for per-team snapshots.
/// Team ids name files under `rosters_by_team/`, so only plain integers count.
pub fn is_team_id(raw: &str) -> bool {
    !raw.is_empty() && raw.len() <= 10 && raw.bytes().all(|b| b.is_ascii_digit())
}

/// Players grouped by team. Players whose `teamId` is missing or not a plain
/// integer stay in the aggregate but get no per-team file.
pub fn by_team(map: &RosterMap) -> BTreeMap<String, Vec<Value>> {
    let mut out: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for record in map.values() {
        let Some(team) = record.team_id() else {
            continue;
        };
        if !is_team_id(&team) {
            tracing::warn!(player = %record.key, team_id = %team, "skipping player with malformed team id");
            continue;
        }
        out.entry(team).or_default().push(record.attrs.clone());
    }
    out
}

/// Rebuild a roster solely from `rosters_by_team/*.json`. Returns the map and
/// the number of team files read.
pub fn collect_team_snapshots(by_team_dir: &Path) -> Result<(RosterMap, usize)> {
    let mut names = fs::read_dir(by_team_dir)
        .with_context(|| format!("failed to read {}", by_team_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect::<Vec<_>>();
    names.sort();

    let mut values = Vec::new();
    let mut teams = 0usize;
    for path in names {
        match read_json(&path) {
            Ok(Some(value)) => {
                teams += 1;
                values.extend(stored_players(&value));
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %format!("{err:#}"), "skipping unreadable team snapshot");
            }
        }
    }
    Ok((map_from_values(values), teams))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::store::write_document;
    use tempfile::tempdir;

    #[test]
    fn key_priority_order() {
        assert_eq!(player_key(&json!({"rosterId": "A1", "playerId": 9})), "rid:A1");
        assert_eq!(player_key(&json!({"rosterId": null, "playerId": 9})), "pid:9");
        assert_eq!(player_key(&json!({"personaId": 42})), "alt:42");
        assert_eq!(
            player_key(&json!({"firstName": "Cam", "lastName": "WARD", "position": "QB", "teamId": 5})),
            "name:cam|ward|qb|5"
        );
    }

    #[test]
    fn key_is_derivable_from_garbage() {
        assert_eq!(player_key(&json!({})), "name:|||");
        assert_eq!(player_key(&json!({"rosterId": {"nested": true}})), "name:|||");
        assert_eq!(player_key(&json!("not an object")), "name:|||");
    }

    #[test]
    fn incoming_accepts_players_alias_and_skips_scalars() {
        let doc = json!({"players": [{"rosterId": 1}, 7, null, {"rosterId": 2}]});
        let players = incoming_players(&doc);
        assert_eq!(players.len(), 2);
        assert_eq!(players[1].key, "rid:2");
    }

    #[test]
    fn failed_envelope_needs_flag_and_no_records() {
        let failed = json!({"success": false, "rosterInfoList": []});
        assert!(is_failed_envelope(&failed, &incoming_players(&failed)));
        let partial = json!({"success": false, "rosterInfoList": [{"rosterId": 1}]});
        assert!(!is_failed_envelope(&partial, &incoming_players(&partial)));
        let empty_ok = json!({"rosterInfoList": []});
        assert!(!is_failed_envelope(&empty_ok, &incoming_players(&empty_ok)));
    }

    #[test]
    fn union_keeps_old_only_keys_and_prefers_incoming() {
        let base = map_from_values(vec![
            json!({"rosterId": "A1", "ovr": 70}),
            json!({"rosterId": "C3", "ovr": 60}),
        ]);
        let incoming = map_from_values(vec![
            json!({"rosterId": "A1", "ovr": 75}),
            json!({"rosterId": "B2", "ovr": 80}),
        ]);
        let merged = union(base, &incoming);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged["rid:A1"].attrs["ovr"], 75);
        assert!(merged.contains_key("rid:C3"));
    }

    #[test]
    fn render_sorts_by_overall_then_speed() {
        let map = map_from_values(vec![
            json!({"rosterId": 1, "playerBestOvr": 70, "speedRating": 90, "teamId": 5}),
            json!({"rosterId": 2, "overallRating": 88, "teamId": 5}),
            json!({"rosterId": 3, "playerBestOvr": 70, "speedRating": 95, "teamId": 9}),
        ]);
        let rendered = render_aggregate(&map);
        let order = rendered["players"]
            .as_array()
            .expect("players")
            .iter()
            .map(|p| p["rosterId"].as_i64().expect("id"))
            .collect::<Vec<_>>();
        assert_eq!(order, vec![2, 3, 1]);
        assert_eq!(rendered["meta"], json!({"count": 3, "teams": 2}));
    }

    #[test]
    fn load_tolerates_list_and_alternate_keys() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join(AGGREGATE_FILE);
        assert!(load_aggregate(&path).expect("missing").is_empty());

        write_document(&path, &json!([{"rosterId": 1}, {"rosterId": 2}])).expect("write list");
        assert_eq!(load_aggregate(&path).expect("list").len(), 2);

        write_document(&path, &json!({"items": [{"rosterId": 1}]})).expect("write items");
        assert_eq!(load_aggregate(&path).expect("items").len(), 1);

        fs::write(&path, "{not json").expect("corrupt");
        assert!(load_aggregate(&path).is_err());
    }

    #[test]
    fn team_snapshots_rebuild_full_roster() {
        let tmp = tempdir().expect("tempdir");
        let dir = tmp.path().join(BY_TEAM_DIR);
        write_document(&dir.join("5.json"), &json!([{"rosterId": "A1", "teamId": 5}])).expect("t5");
        write_document(
            &dir.join("9.json"),
            &json!({"rosterInfoList": [{"rosterId": "B2", "teamId": 9}]}),
        )
        .expect("t9");
        fs::write(dir.join("notes.txt"), "ignored").expect("txt");

        let (map, teams) = collect_team_snapshots(&dir).expect("collect");
        assert_eq!(teams, 2);
        assert_eq!(map.keys().cloned().collect::<Vec<_>>(), vec!["rid:A1", "rid:B2"]);
    }
}
