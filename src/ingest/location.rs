use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

use crate::error::RejectReason;
use crate::ingest::classify::{DocumentKind, SIGNATURES};
use crate::ingest::config::is_league_id;
use crate::ingest::fields::{first_integer, first_list_item, first_string};
use crate::ingest::pointer::LeagueContext;
use crate::ingest::store::Store;

const LEAGUE_ID_FIELDS: &[&str] = &["leagueId", "league.id", "league.leagueId", "leagueInfo.leagueId"];
const SEASON_INDEX_FIELDS: &[&str] = &["seasonIndex"];
const SEASON_FIELDS: &[&str] = &["season"];
const WEEK_FIELDS: &[&str] = &["weekIndex", "week"];
const GLOBAL_HINT_MARKERS: &[&str] = &["standings", "leagueteams"];
const REGULAR_SEASON_WEEKS: u32 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bucket {
    Global,
    Number(u32),
}

impl Bucket {
    pub fn dir_name(self, prefix: &str) -> String {
        format!("{prefix}_{self}")
    }

    /// Parse `season_3` / `week_global` style directory names.
    pub fn from_dir_name(name: &str, prefix: &str) -> Option<Self> {
        let rest = name.strip_prefix(prefix)?.strip_prefix('_')?;
        Self::parse(rest)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw == "global" {
            return Some(Self::Global);
        }
        raw.parse::<u32>().ok().map(Self::Number)
    }

    pub fn number(self) -> Option<u32> {
        match self {
            Self::Number(n) => Some(n),
            Self::Global => None,
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl Serialize for Bucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Global => serializer.serialize_str("global"),
            Self::Number(n) => serializer.serialize_u32(*n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LocationKey {
    pub league_id: String,
    pub season: Bucket,
    pub week: Bucket,
}

impl LocationKey {
    pub fn global(league_id: &str) -> Self {
        Self {
            league_id: league_id.to_string(),
            season: Bucket::Global,
            week: Bucket::Global,
        }
    }

    pub fn is_global(&self) -> bool {
        self.season == Bucket::Global
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/season_{}/week_{}",
            self.league_id, self.season, self.week
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Regular,
    Post,
    Pre,
}

impl Phase {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "reg" => Some(Self::Regular),
            "post" => Some(Self::Post),
            "pre" => Some(Self::Pre),
            _ => None,
        }
    }
}

const POSTSEASON_ROUNDS: &[(u32, u32, &str)] = &[
    (1, 19, "Wild Card"),
    (2, 20, "Divisional"),
    (3, 21, "Conference Championship"),
    (4, 22, "Super Bowl"),
];

/// Map a phase and round onto the single linear week index the read side uses.
pub fn display_week(phase: Phase, round: u32) -> Option<u32> {
    match phase {
        Phase::Regular => Some(round),
        Phase::Post => Some(
            POSTSEASON_ROUNDS
                .iter()
                .find(|(r, _, _)| *r == round)
                .map(|(_, week, _)| *week)
                .unwrap_or(REGULAR_SEASON_WEEKS + round),
        ),
        Phase::Pre => None,
    }
}

pub fn postseason_label(week: u32) -> Option<&'static str> {
    POSTSEASON_ROUNDS
        .iter()
        .find(|(_, w, _)| *w == week)
        .map(|(_, _, label)| *label)
}

fn hint_segments(hint: &str) -> impl Iterator<Item = &str> {
    hint.split('/').map(str::trim).filter(|s| !s.is_empty())
}

pub fn league_from_hint(hint: &str) -> Option<String> {
    hint_segments(hint)
        .find(|segment| is_league_id(segment))
        .map(ToOwned::to_owned)
}

/// League id carried in the payload. Anything but 6-12 digits is ignored so
/// the id can never name a path outside the store.
fn league_from_document(document: &Value) -> Option<String> {
    let raw = first_string(document, LEAGUE_ID_FIELDS)?;
    if is_league_id(&raw) {
        return Some(raw);
    }
    warn!(league_id = %raw, "ignoring malformed league id in payload");
    None
}

/// Find the first `{reg|post|pre}/{n}` pair in the hint.
pub fn phase_from_hint(hint: &str) -> Option<(Phase, u32)> {
    let segments = hint_segments(hint).collect::<Vec<_>>();
    segments.windows(2).find_map(|pair| {
        let phase = Phase::parse(pair[0])?;
        let round = pair[1].parse::<u32>().ok()?;
        Some((phase, round))
    })
}

fn hint_forces_global(hint: &str) -> bool {
    let lowered = hint.to_ascii_lowercase();
    GLOBAL_HINT_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

fn to_bucket(value: i64) -> Option<Bucket> {
    u32::try_from(value).ok().map(Bucket::Number)
}

/// Season/week read from one JSON object. `seasonIndex` is zero-based.
fn season_week_from(value: &Value) -> (Option<Bucket>, Option<Bucket>) {
    let season = first_integer(value, SEASON_INDEX_FIELDS)
        .filter(|index| *index >= 0)
        .and_then(|index| index.checked_add(1).and_then(to_bucket))
        .or_else(|| first_integer(value, SEASON_FIELDS).and_then(to_bucket));
    let week = first_integer(value, WEEK_FIELDS).and_then(to_bucket);
    (season, week)
}

fn season_week_from_lists(document: &Value) -> (Option<Bucket>, Option<Bucket>) {
    let mut season = None;
    let mut week = None;
    for (field, kind) in SIGNATURES {
        if kind.week_scoped_list().is_none() {
            continue;
        }
        let Some(item) = first_list_item(document, field) else {
            continue;
        };
        let (s, w) = season_week_from(item);
        season = season.or(s);
        week = week.or(w);
        if season.is_some() && week.is_some() {
            break;
        }
    }
    (season, week)
}

/// Derives where a document belongs. Pure apart from reading the cached
/// latest-league pointer.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    fallback_league: Option<String>,
}

impl Resolver {
    pub fn new(fallback_league: Option<String>) -> Self {
        Self { fallback_league }
    }

    pub fn resolve_league(
        &self,
        document: &Value,
        hint: &str,
        context: &LeagueContext,
    ) -> Option<String> {
        league_from_document(document)
            .or_else(|| league_from_hint(hint))
            .or_else(|| context.latest_league())
            .or_else(|| self.fallback_league.clone())
    }

    pub fn locate(
        &self,
        kind: DocumentKind,
        document: &Value,
        hint: &str,
        context: &LeagueContext,
    ) -> Result<LocationKey, RejectReason> {
        let Some(league_id) = self.resolve_league(document, hint, context) else {
            return Err(RejectReason::UnresolvableLeague {
                hint: hint.to_string(),
            });
        };

        if kind.is_league_snapshot() || hint_forces_global(hint) {
            return Ok(LocationKey::global(&league_id));
        }

        let (mut season, mut week) = season_week_from(document);
        if season.is_none() || week.is_none() {
            let (list_season, list_week) = season_week_from_lists(document);
            season = season.or(list_season);
            week = week.or(list_week);
        }
        if week.is_none() {
            week = phase_from_hint(hint)
                .and_then(|(phase, round)| display_week(phase, round))
                .map(Bucket::Number);
        }

        let Some(season) = season else {
            return Err(RejectReason::UnresolvableSeason {
                league_id,
                hint: hint.to_string(),
            });
        };

        Ok(LocationKey {
            league_id,
            season,
            week: week.unwrap_or(Bucket::Global),
        })
    }

    /// [`Resolver::locate`] plus the latest-known pointer update. The pointer
    /// write is best-effort and never turns a located document into a rejection.
    pub fn resolve(
        &self,
        kind: DocumentKind,
        document: &Value,
        hint: &str,
        context: &LeagueContext,
        store: &Store,
    ) -> Result<LocationKey, RejectReason> {
        let location = self.locate(kind, document, hint, context)?;
        if location.is_global() {
            context.note_league(&location.league_id);
            return Ok(location);
        }
        match context.advance(store, &location) {
            Ok(true) => debug!(location = %location, "default pointer advanced"),
            Ok(false) => {}
            Err(err) => warn!(
                location = %location,
                error = %format!("{err:#}"),
                "failed to persist default pointer"
            ),
        }
        Ok(location)
    }
}
