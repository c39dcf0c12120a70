use anyhow::Result;
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};

use crate::ingest::classify::{DocumentKind, LEAGUE_TEAMS_LIST, STANDINGS_LIST};
use crate::ingest::fields::{first_present, scalar_string};
use crate::ingest::location::LocationKey;
use crate::ingest::roster::{BY_TEAM_DIR, by_team, map_from_values};
use crate::ingest::store::{Store, read_json, write_document};

pub const PARSED_STANDINGS_FILE: &str = "parsed_standings.json";
pub const PARSED_LEAGUE_FILE: &str = "parsed_league_info.json";

/// Where a freshly persisted document landed.
#[derive(Debug, Clone)]
pub struct ShapeTarget {
    pub league_id: String,
    pub location: LocationKey,
    pub destination: PathBuf,
}

/// Downstream derivation hook, invoked after a document is durably written.
/// Failures are reported to the caller but never undo the write.
pub trait Shaper: Send + Sync {
    fn shape(&self, kind: DocumentKind, target: &ShapeTarget, document: &Value) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct NoopShaper;

impl Shaper for NoopShaper {
    fn shape(&self, _kind: DocumentKind, _target: &ShapeTarget, _document: &Value) -> Result<()> {
        Ok(())
    }
}

/// Built-in shaper: team map, league info, standings, per-team rosters.
#[derive(Debug, Clone)]
pub struct FileShaper {
    store: Store,
}

impl FileShaper {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    fn bucket_dir(&self, target: &ShapeTarget) -> PathBuf {
        self.store.bucket_dir(&target.location)
    }
}

impl Shaper for FileShaper {
    fn shape(&self, kind: DocumentKind, target: &ShapeTarget, document: &Value) -> Result<()> {
        match kind {
            DocumentKind::LeagueTeams => self.shape_league(target, document),
            DocumentKind::Standings => self.shape_standings(target, document),
            DocumentKind::Roster => self.shape_rosters(target, document),
            _ => Ok(()),
        }
    }
}

fn list<'a>(document: &'a Value, field: &str) -> &'a [Value] {
    document
        .get(field)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn field_or(entry: &Value, field: &str, fallback: Value) -> Value {
    match entry.get(field) {
        Some(Value::Null) | None => fallback,
        Some(value) => value.clone(),
    }
}

fn standings_rows(standings: &Value) -> &[Value] {
    match standings {
        Value::Array(rows) => rows,
        other => list(other, "standings"),
    }
}

impl FileShaper {
    fn shape_standings(&self, target: &ShapeTarget, document: &Value) -> Result<()> {
        let rows = list(document, STANDINGS_LIST)
            .iter()
            .map(|entry| {
                let streak = format!(
                    "{} {}",
                    entry.get("streakType").and_then(scalar_string).unwrap_or_default(),
                    entry.get("winLossStreak").and_then(scalar_string).unwrap_or_else(|| "0".into()),
                );
                json!({
                    "teamId": field_or(entry, "teamId", Value::Null),
                    "wins": field_or(entry, "totalWins", Value::Null),
                    "losses": field_or(entry, "totalLosses", Value::Null),
                    "ties": field_or(entry, "totalTies", Value::Null),
                    "pct": field_or(entry, "winPct", Value::Null),
                    "pointsFor": field_or(entry, "ptsForRank", Value::Null),
                    "pointsAgainst": field_or(entry, "ptsAgainstRank", Value::Null),
                    "streak": streak,
                    "divWins": field_or(entry, "divWins", Value::Null),
                    "divLosses": field_or(entry, "divLosses", Value::Null),
                    "divTies": field_or(entry, "divTies", Value::Null),
                    "confWins": field_or(entry, "confWins", Value::Null),
                    "confLosses": field_or(entry, "confLosses", Value::Null),
                    "confTies": field_or(entry, "confTies", Value::Null),
                    "capAvailable": field_or(entry, "capAvailable", Value::Null),
                })
            })
            .collect::<Vec<_>>();
        let path = self.bucket_dir(target).join(PARSED_STANDINGS_FILE);
        write_document(&path, &rows)?;
        tracing::debug!(league = %target.league_id, teams = rows.len(), "standings shaped");
        Ok(())
    }

    fn shape_league(&self, target: &ShapeTarget, document: &Value) -> Result<()> {
        let teams = list(document, LEAGUE_TEAMS_LIST);
        if teams.is_empty() {
            tracing::warn!(league = %target.league_id, "league snapshot carried no teams");
            return Ok(());
        }

        let global_dir = self.store.global_dir(&target.league_id);
        let standings = load_standings(&global_dir.join(PARSED_STANDINGS_FILE));
        let cap_lookup = standings
            .as_ref()
            .map(|s| cap_by_team(standings_rows(s)))
            .unwrap_or_default();

        let calendar_year = first_present(document, &["calendarYear"])
            .cloned()
            .or_else(|| teams.iter().find_map(|t| first_present(t, &["calendarYear"]).cloned()))
            .or_else(|| {
                standings
                    .as_ref()
                    .and_then(|s| first_present(s, &["calendarYear"]).cloned())
            })
            .unwrap_or_else(|| Value::String("Unknown".to_string()));

        let mut team_map = Map::new();
        let mut info_list = Vec::new();
        for team in teams {
            let Some(team_id) = team.get("teamId").and_then(scalar_string) else {
                continue;
            };
            let cap = cap_lookup
                .get(&team_id)
                .cloned()
                .unwrap_or_else(|| field_or(team, "capAvailable", json!(0)));
            let entry = json!({
                "abbr": field_or(team, "abbrName", json!("")),
                "name": field_or(team, "displayName", json!("")),
                "user": field_or(team, "userName", json!("")),
                "divisionName": field_or(team, "divName", json!("Unknown Division")),
                "teamOvr": field_or(team, "ovrRating", json!(0)),
                "capAvailable": cap,
            });
            let mut listed = Map::new();
            listed.insert("teamId".into(), numeric_or_string(&team_id));
            if let Value::Object(fields) = &entry {
                listed.extend(fields.clone());
            }
            info_list.push(Value::Object(listed));
            team_map.insert(team_id, entry);
        }

        write_document(&self.store.team_map_path(&target.league_id), &team_map)?;
        write_document(
            &self.bucket_dir(target).join(PARSED_LEAGUE_FILE),
            &json!({ "calendarYear": calendar_year, "leagueTeamInfoList": info_list }),
        )?;
        tracing::debug!(league = %target.league_id, teams = team_map.len(), "league info shaped");
        Ok(())
    }

    fn shape_rosters(&self, target: &ShapeTarget, aggregate: &Value) -> Result<()> {
        let players = list(aggregate, "players").to_vec();
        let grouped = by_team(&map_from_values(players));
        let dir = self.bucket_dir(target).join(BY_TEAM_DIR);
        for (team_id, players) in &grouped {
            write_document(&dir.join(format!("{team_id}.json")), players)?;
        }
        tracing::debug!(league = %target.league_id, teams = grouped.len(), "team rosters shaped");
        Ok(())
    }
}

fn load_standings(path: &Path) -> Option<Value> {
    match read_json(path) {
        Ok(found) => found,
        Err(err) => {
            tracing::warn!(file = %path.display(), error = %format!("{err:#}"), "ignoring unreadable standings");
            None
        }
    }
}

fn cap_by_team(rows: &[Value]) -> Map<String, Value> {
    rows.iter()
        .filter_map(|row| {
            let team = row.get("teamId").and_then(scalar_string)?;
            let cap = row.get("capAvailable").filter(|v| !v.is_null())?;
            Some((team, cap.clone()))
        })
        .collect()
}

fn numeric_or_string(raw: &str) -> Value {
    raw.parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(raw.to_string()))
}
