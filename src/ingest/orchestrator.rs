use anyhow::Result;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::RejectReason;
use crate::ingest::accumulator::{FlushSummary, RosterAccumulator};
use crate::ingest::audit;
use crate::ingest::capture::{self, Headers};
use crate::ingest::classify::{DocumentKind, classify};
use crate::ingest::config::IngestConfig;
use crate::ingest::fields::first_string;
use crate::ingest::location::{LocationKey, Resolver};
use crate::ingest::paths::StorePaths;
use crate::ingest::pointer::{DefaultPointer, LeagueContext};
use crate::ingest::roster::{failure_message, incoming_players, is_failed_envelope};
use crate::ingest::shaping::{FileShaper, ShapeTarget, Shaper};
use crate::ingest::store::{Store, write_document};
use crate::ingest::util::{hint_slug, truncate_with_ellipsis};

pub const REPLAY_HEADERS: &[&str] = &["x-replay", "x-simulated"];
const ERROR_MESSAGE_FIELDS: &[&str] = &["error.message", "error", "message"];
const LOGGED_BODY_CHARS: usize = 512;

/// What happened to an accepted document.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Written { path: PathBuf, unchanged: bool },
    Buffered { added: usize, updated: usize, total: usize },
    Ignored { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Accepted {
        kind: DocumentKind,
        location: LocationKey,
        disposition: Disposition,
    },
    Rejected(RejectReason),
}

impl IngestOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn reject_reason(&self) -> Option<&RejectReason> {
        match self {
            Self::Rejected(reason) => Some(reason),
            Self::Accepted { .. } => None,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            Self::Accepted {
                kind,
                location,
                disposition,
            } => {
                let what = match disposition {
                    Disposition::Written { path, unchanged } => {
                        let verb = if *unchanged { "unchanged" } else { "written" };
                        format!("{verb} {}", path.display())
                    }
                    Disposition::Buffered {
                        added,
                        updated,
                        total,
                    } => format!("buffered added={added} updated={updated} total={total}"),
                    Disposition::Ignored { reason } => format!("ignored ({reason})"),
                };
                format!("{} -> {location}: {what}", kind.as_str())
            }
            Self::Rejected(reason) => format!("rejected [{}]: {reason}", reason.code()),
        }
    }
}

/// True when the delivery is a replay of previously captured traffic.
pub fn is_replay(headers: &Headers) -> bool {
    headers.iter().any(|(key, value)| {
        REPLAY_HEADERS
            .iter()
            .any(|name| key.eq_ignore_ascii_case(name))
            && matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
    })
}

/// Everything one ingestion process shares: caches, accumulators, shaping.
/// Build one per process and hand it to every delivery.
pub struct IngestionContext {
    cfg: IngestConfig,
    paths: StorePaths,
    store: Store,
    league: LeagueContext,
    resolver: Resolver,
    shaper: Arc<dyn Shaper>,
    rosters: RosterAccumulator,
}

impl IngestionContext {
    pub fn new(cfg: IngestConfig, paths: StorePaths, shaper: Arc<dyn Shaper>) -> Result<Self> {
        let store = Store::new(&paths.root);
        let rosters = RosterAccumulator::new(
            store.clone(),
            paths.logs_dir.clone(),
            cfg.roster.debounce(),
            Arc::clone(&shaper),
        )?;
        Ok(Self {
            resolver: Resolver::new(cfg.league.fallback_id.clone()),
            league: LeagueContext::default(),
            cfg,
            paths,
            store,
            shaper,
            rosters,
        })
    }

    /// Context with the built-in file shaper.
    pub fn with_file_shaper(cfg: IngestConfig, paths: StorePaths) -> Result<Self> {
        let shaper = Arc::new(FileShaper::new(Store::new(&paths.root)));
        Self::new(cfg, paths, shaper)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    pub fn rosters(&self) -> &RosterAccumulator {
        &self.rosters
    }

    pub fn current_location(&self, league_id: &str) -> Result<Option<DefaultPointer>> {
        self.league.current_location(&self.store, league_id)
    }

    /// Ingest one raw delivery. Never panics and never fails: every problem
    /// becomes a `Rejected` outcome local to this document.
    pub fn ingest(&self, hint: &str, body: &[u8], headers: &Headers) -> IngestOutcome {
        let replay = is_replay(headers);
        if self.cfg.capture.enabled && !replay {
            if let Err(err) = capture::append_delivery(
                &self.paths.capture_file,
                self.cfg.capture.max_bytes,
                hint,
                headers,
                body,
            ) {
                tracing::warn!(hint, error = %format!("{err:#}"), "delivery capture failed");
            }
        }

        let document = match serde_json::from_slice::<Value>(body) {
            Ok(value @ Value::Object(_)) => value,
            Ok(_) => return self.reject_malformed(hint, body, "expected a JSON object"),
            Err(err) => return self.reject_malformed(hint, body, &err.to_string()),
        };
        self.ingest_document(hint, document, replay)
    }

    /// Ingest an already-parsed document.
    pub fn ingest_document(&self, hint: &str, mut document: Value, replay: bool) -> IngestOutcome {
        let kind = classify(&mut document);
        let outcome = self.dispatch(kind, hint, &document, replay);
        self.report(hint, &outcome);
        outcome
    }

    /// Flush buffered rosters and stop background timers.
    pub fn shutdown(&self) -> FlushSummary {
        self.rosters.shutdown()
    }

    fn reject_malformed(&self, hint: &str, body: &[u8], detail: &str) -> IngestOutcome {
        let raw = truncate_with_ellipsis(&String::from_utf8_lossy(body), LOGGED_BODY_CHARS);
        tracing::warn!(hint, detail, body = %raw, "malformed delivery");
        let outcome = IngestOutcome::Rejected(RejectReason::Malformed(detail.to_string()));
        self.report(hint, &outcome);
        outcome
    }

    fn report(&self, hint: &str, outcome: &IngestOutcome) {
        let summary = outcome.summary();
        match outcome.reject_reason() {
            None => tracing::info!(hint, "{summary}"),
            Some(reason) if reason.is_benign() => tracing::info!(hint, "{summary}"),
            Some(_) => tracing::warn!(hint, "{summary}"),
        }
        let status = if outcome.is_accepted() { "accepted" } else { "rejected" };
        audit::record(
            &self.paths.logs_dir,
            "ingest",
            status,
            &format!("hint={hint} {summary}"),
        );
    }

    fn dispatch(&self, kind: DocumentKind, hint: &str, document: &Value, replay: bool) -> IngestOutcome {
        match kind {
            DocumentKind::ApplicationError => self.upstream_error(hint, document, replay),
            DocumentKind::Roster => self.roster_chunk(hint, document, replay),
            _ => self.direct_write(kind, hint, document),
        }
    }

    fn upstream_error(&self, hint: &str, document: &Value, replay: bool) -> IngestOutcome {
        let message = first_string(document, ERROR_MESSAGE_FIELDS)
            .unwrap_or_else(|| "error payload".to_string());
        if self.cfg.capture.enabled && !replay {
            let path = self
                .paths
                .errors_dir
                .join(format!("{}_error.json", hint_slug(hint)));
            if let Err(err) = write_document(&path, document) {
                tracing::warn!(hint, error = %format!("{err:#}"), "failed to keep error payload");
            }
        }
        IngestOutcome::Rejected(RejectReason::UpstreamFailure(message))
    }

    fn roster_chunk(&self, hint: &str, document: &Value, replay: bool) -> IngestOutcome {
        let players = incoming_players(document);
        if is_failed_envelope(document, &players) {
            return IngestOutcome::Rejected(RejectReason::UpstreamFailure(failure_message(document)));
        }
        let location = match self.resolver.resolve(
            DocumentKind::Roster,
            document,
            hint,
            &self.league,
            &self.store,
        ) {
            Ok(location) => location,
            Err(reason) => return IngestOutcome::Rejected(reason),
        };
        let disposition = if players.is_empty() {
            Disposition::Ignored {
                reason: "roster chunk carried no players".to_string(),
            }
        } else {
            let receipt = self.rosters.add_chunk(&location.league_id, players, replay);
            Disposition::Buffered {
                added: receipt.added,
                updated: receipt.updated,
                total: receipt.total,
            }
        };
        IngestOutcome::Accepted {
            kind: DocumentKind::Roster,
            location,
            disposition,
        }
    }

    fn direct_write(&self, kind: DocumentKind, hint: &str, document: &Value) -> IngestOutcome {
        let location = match self
            .resolver
            .resolve(kind, document, hint, &self.league, &self.store)
        {
            Ok(location) => location,
            Err(reason) => return IngestOutcome::Rejected(reason),
        };
        let name = kind
            .document_name()
            .map(str::to_string)
            .unwrap_or_else(|| hint_slug(hint));
        let path = self.store.document_path(&location, &name);
        let written = match write_document(&path, document) {
            Ok(written) => written,
            Err(err) => {
                return IngestOutcome::Rejected(RejectReason::WriteFailed(format!("{err:#}")));
            }
        };

        let target = ShapeTarget {
            league_id: location.league_id.clone(),
            location: location.clone(),
            destination: written.path.clone(),
        };
        if let Err(err) = self.shaper.shape(kind, &target, document) {
            tracing::warn!(kind = kind.as_str(), error = %format!("{err:#}"), "shaping failed");
        }

        IngestOutcome::Accepted {
            kind,
            location,
            disposition: Disposition::Written {
                path: written.path,
                unchanged: written.unchanged,
            },
        }
    }
}
