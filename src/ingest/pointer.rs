use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::ingest::location::{Bucket, LocationKey};
use crate::ingest::store::{Store, write_document};

/// Contents of `{league}/default_week.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DefaultPointer {
    pub season: Bucket,
    pub week: Bucket,
}

impl DefaultPointer {
    fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            season: bucket_from_value(value.get("season")?, "season")?,
            week: bucket_from_value(value.get("week")?, "week")?,
        })
    }
}

fn bucket_from_value(value: &Value, prefix: &str) -> Option<Bucket> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Bucket::Number),
        Value::String(s) => Bucket::from_dir_name(s, prefix).or_else(|| Bucket::parse(s)),
        _ => None,
    }
}

/// Process-wide cache of the latest league and each league's current
/// (season, week). Everything here can be rebuilt from disk.
#[derive(Debug, Default)]
pub struct LeagueContext {
    latest_league: Mutex<Option<String>>,
    pointers: Mutex<HashMap<String, DefaultPointer>>,
    /// Per-league guard ordering `default_week.json` writes.
    writers: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn numbered_children(dir: &Path, prefix: &str) -> Result<Vec<u32>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name();
        if let Some(Bucket::Number(n)) = name.to_str().and_then(|n| Bucket::from_dir_name(n, prefix))
        {
            out.push(n);
        }
    }
    Ok(out)
}

/// Greatest numbered season, then greatest numbered week inside it.
pub fn scan_latest(store: &Store, league_id: &str) -> Result<Option<DefaultPointer>> {
    let Some(season) = numbered_children(&store.league_dir(league_id), "season")?
        .into_iter()
        .max()
    else {
        return Ok(None);
    };
    let season = Bucket::Number(season);
    let week = numbered_children(&store.season_dir(league_id, season), "week")?
        .into_iter()
        .max()
        .map(Bucket::Number)
        .unwrap_or(Bucket::Global);
    Ok(Some(DefaultPointer { season, week }))
}

pub fn load_persisted(store: &Store, league_id: &str) -> Result<Option<DefaultPointer>> {
    let path = store.default_pointer_path(league_id);
    let Some(value) = store.read_document(&path)? else {
        return Ok(None);
    };
    Ok(DefaultPointer::from_value(&value))
}

/// Rebuild a league's pointer from disk. A persisted record wins over the
/// directory scan as long as the directory it names still exists.
pub fn rebuild(store: &Store, league_id: &str) -> Result<Option<DefaultPointer>> {
    let persisted = match load_persisted(store, league_id) {
        Ok(found) => found,
        Err(err) => {
            tracing::warn!(league = league_id, error = %format!("{err:#}"), "ignoring unreadable default pointer");
            None
        }
    };
    if let Some(pointer) = persisted {
        let target = store.bucket_dir(&LocationKey {
            league_id: league_id.to_string(),
            season: pointer.season,
            week: pointer.week,
        });
        if target.is_dir() {
            return Ok(Some(pointer));
        }
    }
    scan_latest(store, league_id)
}

impl LeagueContext {
    pub fn latest_league(&self) -> Option<String> {
        lock(&self.latest_league).clone()
    }

    pub fn note_league(&self, league_id: &str) {
        *lock(&self.latest_league) = Some(league_id.to_string());
    }

    fn cached(&self, league_id: &str) -> Option<DefaultPointer> {
        lock(&self.pointers).get(league_id).copied()
    }

    /// Current (season, week) for read-side defaults. Advisory only.
    /// A cache miss rebuilds from disk without holding the cache lock.
    pub fn current_location(
        &self,
        store: &Store,
        league_id: &str,
    ) -> Result<Option<DefaultPointer>> {
        if let Some(pointer) = self.cached(league_id) {
            return Ok(Some(pointer));
        }
        let Some(rebuilt) = rebuild(store, league_id)? else {
            return Ok(None);
        };
        let mut pointers = lock(&self.pointers);
        Ok(Some(*pointers.entry(league_id.to_string()).or_insert(rebuilt)))
    }

    /// Move the league's pointer forward to `location` if it is newer and
    /// persist it. Returns whether the pointer moved.
    ///
    /// An older (season, week), such as a late re-delivery of a past week,
    /// never pulls the pointer back.
    pub fn advance(&self, store: &Store, location: &LocationKey) -> Result<bool> {
        let league_id = &location.league_id;
        self.note_league(league_id);
        let (Bucket::Number(_), Bucket::Number(_)) = (location.season, location.week) else {
            return Ok(false);
        };
        let candidate = DefaultPointer {
            season: location.season,
            week: location.week,
        };

        if let Err(err) = self.current_location(store, league_id) {
            tracing::warn!(league = %league_id, error = %format!("{err:#}"), "pointer rebuild failed");
        }
        let previous = {
            let mut pointers = lock(&self.pointers);
            let previous = pointers.get(league_id).copied();
            if previous.is_some_and(|p| (p.season, p.week) > (candidate.season, candidate.week)) {
                return Ok(false);
            }
            pointers.insert(league_id.clone(), candidate);
            previous
        };

        self.persist(store, league_id)?;
        Ok(previous != Some(candidate))
    }

    /// Write whatever the cache holds now, so concurrent advances for one
    /// league always leave the newest pointer on disk.
    fn persist(&self, store: &Store, league_id: &str) -> Result<()> {
        let writer = Arc::clone(lock(&self.writers).entry(league_id.to_string()).or_default());
        let _writing = lock(&*writer);
        let Some(latest) = self.cached(league_id) else {
            return Ok(());
        };
        write_document(&store.default_pointer_path(league_id), &latest)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn loc(league: &str, season: u32, week: u32) -> LocationKey {
        LocationKey {
            league_id: league.to_string(),
            season: Bucket::Number(season),
            week: Bucket::Number(week),
        }
    }

    #[test]
    fn scan_picks_numeric_maximum_and_ignores_global() {
        let tmp = tempdir().expect("tempdir");
        let store = Store::new(tmp.path());
        for dir in [
            "1234567/season_2/week_18",
            "1234567/season_10/week_3",
            "1234567/season_10/week_12",
            "1234567/season_10/week_global",
            "1234567/season_global/week_global",
        ] {
            fs::create_dir_all(tmp.path().join(dir)).expect("mkdir");
        }

        let context = LeagueContext::default();
        let pointer = context
            .current_location(&store, "1234567")
            .expect("scan")
            .expect("found");
        assert_eq!(pointer.season, Bucket::Number(10));
        assert_eq!(pointer.week, Bucket::Number(12));
    }

    #[test]
    fn persisted_pointer_pins_view_when_target_exists() {
        let tmp = tempdir().expect("tempdir");
        let store = Store::new(tmp.path());
        fs::create_dir_all(tmp.path().join("1234567/season_3/week_4")).expect("mkdir");
        fs::create_dir_all(tmp.path().join("1234567/season_3/week_5")).expect("mkdir");
        write_document(
            &store.default_pointer_path("1234567"),
            &json!({"season": 3, "week": 4}),
        )
        .expect("pin");

        let pinned = rebuild(&store, "1234567").expect("rebuild").expect("found");
        assert_eq!(pinned.week, Bucket::Number(4));

        write_document(
            &store.default_pointer_path("1234567"),
            &json!({"season": "season_9", "week": "week_1"}),
        )
        .expect("dangling pin");
        let scanned = rebuild(&store, "1234567").expect("rebuild").expect("found");
        assert_eq!(scanned.week, Bucket::Number(5));
    }

    #[test]
    fn advance_only_moves_forward_and_survives_restart() {
        let tmp = tempdir().expect("tempdir");
        let store = Store::new(tmp.path());
        let context = LeagueContext::default();

        assert!(context.advance(&store, &loc("1234567", 2, 5)).expect("advance"));
        assert!(!context.advance(&store, &loc("1234567", 2, 3)).expect("older"));
        assert!(context.advance(&store, &loc("1234567", 3, 1)).expect("newer season"));

        fs::create_dir_all(tmp.path().join("1234567/season_3/week_1")).expect("mkdir");
        let cold = LeagueContext::default();
        let pointer = cold
            .current_location(&store, "1234567")
            .expect("cold read")
            .expect("found");
        assert_eq!(pointer, DefaultPointer { season: Bucket::Number(3), week: Bucket::Number(1) });
        assert_eq!(cold.latest_league(), None);
        assert_eq!(context.latest_league().as_deref(), Some("1234567"));
    }

    #[test]
    fn concurrent_advances_persist_the_newest_pointer() {
        let tmp = tempdir().expect("tempdir");
        let store = Store::new(tmp.path());
        let context = LeagueContext::default();

        std::thread::scope(|scope| {
            for league in ["1234567", "7654321"] {
                for week in 1..=12u32 {
                    let (store, context) = (&store, &context);
                    scope.spawn(move || {
                        context
                            .advance(store, &loc(league, 2, week))
                            .expect("advance");
                    });
                }
            }
        });

        for league in ["1234567", "7654321"] {
            let newest = DefaultPointer { season: Bucket::Number(2), week: Bucket::Number(12) };
            assert_eq!(context.current_location(&store, league).expect("cached"), Some(newest));
            let persisted = load_persisted(&store, league).expect("read").expect("persisted");
            assert_eq!(persisted, newest);
        }
    }
}
