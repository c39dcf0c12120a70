use anyhow::Result;
use std::collections::HashMap;
use std::mem;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::ingest::audit;
use crate::ingest::classify::DocumentKind;
use crate::ingest::debounce::Debouncer;
use crate::ingest::location::LocationKey;
use crate::ingest::roster::{
    AGGREGATE_FILE, PlayerRecord, RosterMap, load_aggregate, render_aggregate, union,
};
use crate::ingest::shaping::{ShapeTarget, Shaper};
use crate::ingest::store::{Store, write_document};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counts for one accepted roster chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkReceipt {
    pub added: usize,
    pub updated: usize,
    /// Players buffered for the league after this chunk.
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct FlushReport {
    pub league_id: String,
    pub path: PathBuf,
    pub flushed: usize,
    pub total: usize,
    pub unchanged: bool,
}

#[derive(Debug, Default)]
pub struct FlushSummary {
    pub reports: Vec<FlushReport>,
    pub failures: Vec<(String, String)>,
}

impl FlushSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Default)]
struct LeagueBuffer {
    pending: Mutex<RosterMap>,
    /// Serializes flushes for one league; never held while chunks are added.
    flushing: Mutex<()>,
}

struct Core {
    store: Store,
    logs_dir: PathBuf,
    shaper: Arc<dyn Shaper>,
    leagues: Mutex<HashMap<String, Arc<LeagueBuffer>>>,
}

impl Core {
    fn buffer(&self, league_id: &str) -> Arc<LeagueBuffer> {
        let mut leagues = lock(&self.leagues);
        Arc::clone(leagues.entry(league_id.to_string()).or_default())
    }

    fn aggregate_location(league_id: &str) -> LocationKey {
        LocationKey::global(league_id)
    }

    fn flush_league(&self, league_id: &str) -> Result<Option<FlushReport>> {
        let buffer = self.buffer(league_id);
        let _flushing = lock(&buffer.flushing);
        let batch = mem::take(&mut *lock(&buffer.pending));
        if batch.is_empty() {
            return Ok(None);
        }

        match self.persist(league_id, &batch) {
            Ok(report) => {
                audit::record(
                    &self.logs_dir,
                    "roster_flush",
                    "ok",
                    &format!(
                        "league={} flushed={} total={}",
                        league_id, report.flushed, report.total
                    ),
                );
                Ok(Some(report))
            }
            Err(err) => {
                let mut pending = lock(&buffer.pending);
                let kept = batch.len();
                for (key, record) in batch {
                    pending.entry(key).or_insert(record);
                }
                drop(pending);
                tracing::warn!(
                    league = league_id,
                    kept,
                    error = %format!("{err:#}"),
                    "roster flush failed; batch kept for next flush"
                );
                audit::record(
                    &self.logs_dir,
                    "roster_flush",
                    "failed",
                    &format!("league={league_id} kept={kept} error={err:#}"),
                );
                Err(err)
            }
        }
    }

    fn persist(&self, league_id: &str, batch: &RosterMap) -> Result<FlushReport> {
        let location = Self::aggregate_location(league_id);
        let path = self.store.bucket_dir(&location).join(AGGREGATE_FILE);
        let existing = load_aggregate(&path)?;
        let merged = union(existing, batch);
        let rendered = render_aggregate(&merged);
        let outcome = write_document(&path, &rendered)?;
        tracing::info!(
            league = league_id,
            flushed = batch.len(),
            total = merged.len(),
            unchanged = outcome.unchanged,
            "roster aggregate flushed"
        );

        let target = ShapeTarget {
            league_id: league_id.to_string(),
            location,
            destination: path.clone(),
        };
        if let Err(err) = self.shaper.shape(DocumentKind::Roster, &target, &rendered) {
            tracing::warn!(league = league_id, error = %format!("{err:#}"), "roster shaping failed");
        }

        Ok(FlushReport {
            league_id: league_id.to_string(),
            path,
            flushed: batch.len(),
            total: merged.len(),
            unchanged: outcome.unchanged,
        })
    }
}

/// Buffers roster chunks per league and merges them into the persisted
/// aggregate once the league has been quiet for the debounce window.
pub struct RosterAccumulator {
    core: Arc<Core>,
    debouncer: Debouncer<String>,
}

impl RosterAccumulator {
    pub fn new(
        store: Store,
        logs_dir: PathBuf,
        window: Duration,
        shaper: Arc<dyn Shaper>,
    ) -> Result<Self> {
        let core = Arc::new(Core {
            store,
            logs_dir,
            shaper,
            leagues: Mutex::new(HashMap::new()),
        });
        let fire_core = Arc::clone(&core);
        let debouncer = Debouncer::new(window, move |league_id: String| {
            // Failures were already logged and the batch restored.
            let _ = fire_core.flush_league(&league_id);
        })?;
        Ok(Self { core, debouncer })
    }

    pub fn add_chunk(
        &self,
        league_id: &str,
        players: Vec<PlayerRecord>,
        replay: bool,
    ) -> ChunkReceipt {
        let buffer = self.core.buffer(league_id);
        let mut pending = lock(&buffer.pending);
        let mut added = 0usize;
        let mut updated = 0usize;
        for record in players {
            match pending.insert(record.key.clone(), record) {
                Some(_) => updated += 1,
                None => added += 1,
            }
        }
        let total = pending.len();
        drop(pending);

        self.debouncer.schedule(league_id.to_string());
        let window_ms = self.debouncer.window().as_millis();
        if replay {
            tracing::debug!(league = league_id, added, updated, total, window_ms, "roster flush scheduled");
        } else {
            tracing::info!(league = league_id, added, updated, total, window_ms, "roster flush scheduled");
        }
        ChunkReceipt {
            added,
            updated,
            total,
        }
    }

    /// Flush one league immediately, cancelling its timer.
    pub fn flush_now(&self, league_id: &str) -> Result<Option<FlushReport>> {
        self.debouncer.cancel(&league_id.to_string());
        self.core.flush_league(league_id)
    }

    /// Flush every league with buffered players.
    pub fn flush_all(&self) -> FlushSummary {
        let mut summary = FlushSummary::default();
        for league_id in self.pending_leagues() {
            match self.flush_now(&league_id) {
                Ok(Some(report)) => summary.reports.push(report),
                Ok(None) => {}
                Err(err) => summary.failures.push((league_id, format!("{err:#}"))),
            }
        }
        summary
    }

    pub fn pending_count(&self, league_id: &str) -> usize {
        let leagues = lock(&self.core.leagues);
        leagues
            .get(league_id)
            .map(|buffer| lock(&buffer.pending).len())
            .unwrap_or(0)
    }

    pub fn pending_leagues(&self) -> Vec<String> {
        let leagues = lock(&self.core.leagues);
        let mut ids = leagues
            .iter()
            .filter(|(_, buffer)| !lock(&buffer.pending).is_empty())
            .map(|(id, _)| id.clone())
            .collect::<Vec<_>>();
        ids.sort();
        ids
    }

    /// Flush everything and stop the timer thread.
    pub fn shutdown(&self) -> FlushSummary {
        let summary = self.flush_all();
        self.debouncer.shutdown();
        summary
    }
}
