use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    PassingStats,
    ReceivingStats,
    RushingStats,
    DefensiveStats,
    Schedule,
    Roster,
    LeagueTeams,
    Standings,
    ApplicationError,
    Unknown,
}

pub const SCHEDULE_LIST: &str = "gameScheduleInfoList";
pub const PASSING_LIST: &str = "playerPassingStatInfoList";
pub const RECEIVING_LIST: &str = "playerReceivingStatInfoList";
pub const RUSHING_LIST: &str = "playerRushingStatInfoList";
pub const DEFENSIVE_LIST: &str = "playerDefensiveStatInfoList";
pub const ROSTER_LIST: &str = "rosterInfoList";
pub const LEAGUE_TEAMS_LIST: &str = "leagueTeamInfoList";
pub const LEAGUE_TEAMS_ALT_LIST: &str = "teamInfoList";
pub const STANDINGS_LIST: &str = "teamStandingInfoList";

/// Signature fields in priority order. Schedule leads because some exports
/// carry game data next to stat lists.
pub const SIGNATURES: &[(&str, DocumentKind)] = &[
    (SCHEDULE_LIST, DocumentKind::Schedule),
    (PASSING_LIST, DocumentKind::PassingStats),
    (RECEIVING_LIST, DocumentKind::ReceivingStats),
    (RUSHING_LIST, DocumentKind::RushingStats),
    (DEFENSIVE_LIST, DocumentKind::DefensiveStats),
    (ROSTER_LIST, DocumentKind::Roster),
    (LEAGUE_TEAMS_LIST, DocumentKind::LeagueTeams),
    (LEAGUE_TEAMS_ALT_LIST, DocumentKind::LeagueTeams),
    (STANDINGS_LIST, DocumentKind::Standings),
];

/// Alternate spellings rewritten to their canonical field before matching.
const ALIASES: &[(&str, &str)] = &[(LEAGUE_TEAMS_ALT_LIST, LEAGUE_TEAMS_LIST)];

impl DocumentKind {
    /// Fixed file stem for the stored raw document; `None` means the routing
    /// hint names it.
    pub fn document_name(self) -> Option<&'static str> {
        match self {
            Self::PassingStats => Some("passing"),
            Self::ReceivingStats => Some("receiving"),
            Self::RushingStats => Some("rushing"),
            Self::DefensiveStats => Some("defense"),
            Self::Schedule => Some("schedules"),
            Self::Roster => Some("rosters"),
            Self::LeagueTeams => Some("league"),
            Self::Standings => Some("standings"),
            Self::ApplicationError | Self::Unknown => None,
        }
    }

    /// Whole-league snapshots that never belong to a single week.
    pub fn is_league_snapshot(self) -> bool {
        matches!(self, Self::Roster | Self::LeagueTeams)
    }

    /// The list field whose first element may carry season/week numbers.
    pub fn week_scoped_list(self) -> Option<&'static str> {
        match self {
            Self::Schedule => Some(SCHEDULE_LIST),
            Self::PassingStats => Some(PASSING_LIST),
            Self::ReceivingStats => Some(RECEIVING_LIST),
            Self::RushingStats => Some(RUSHING_LIST),
            Self::DefensiveStats => Some(DEFENSIVE_LIST),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PassingStats => "passing_stats",
            Self::ReceivingStats => "receiving_stats",
            Self::RushingStats => "rushing_stats",
            Self::DefensiveStats => "defensive_stats",
            Self::Schedule => "schedule",
            Self::Roster => "roster",
            Self::LeagueTeams => "league_teams",
            Self::Standings => "standings",
            Self::ApplicationError => "application_error",
            Self::Unknown => "unknown",
        }
    }
}

fn has_list(document: &Value, field: &str) -> bool {
    document.get(field).is_some_and(Value::is_array)
}

/// Move alias fields onto their canonical name when the canonical one is absent.
fn normalize_aliases(document: &mut Value) {
    let Some(object) = document.as_object_mut() else {
        return;
    };
    for (alias, canonical) in ALIASES {
        let alias_is_list = object.get(*alias).is_some_and(Value::is_array);
        let canonical_is_list = object.get(*canonical).is_some_and(Value::is_array);
        if alias_is_list && !canonical_is_list {
            if let Some(list) = object.remove(*alias) {
                object.insert((*canonical).to_string(), list);
            }
        }
    }
}

/// Classify a document by its payload shape. Total: anything unrecognised is
/// `Unknown`. Alias fields are normalised in place.
pub fn classify(document: &mut Value) -> DocumentKind {
    if document.get("error").is_some() {
        return DocumentKind::ApplicationError;
    }

    let kind = SIGNATURES
        .iter()
        .find(|(field, _)| has_list(document, field))
        .map(|(_, kind)| *kind)
        .unwrap_or(DocumentKind::Unknown);

    if kind == DocumentKind::LeagueTeams {
        normalize_aliases(document);
    }
    kind
}
