use thiserror::Error;

/// Why a delivery was not persisted. Every variant is local to one document;
/// none of them affects later deliveries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RejectReason {
    #[error("malformed document: {0}")]
    Malformed(String),
    #[error("no league id resolvable for hint `{hint}`")]
    UnresolvableLeague { hint: String },
    #[error("no season resolvable for league {league_id} (hint `{hint}`)")]
    UnresolvableSeason { league_id: String, hint: String },
    #[error("upstream export reported failure: {0}")]
    UpstreamFailure(String),
    #[error("write failed: {0}")]
    WriteFailed(String),
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::UnresolvableLeague { .. } => "unresolvable_league",
            Self::UnresolvableSeason { .. } => "unresolvable_season",
            Self::UpstreamFailure(_) => "upstream_failure",
            Self::WriteFailed(_) => "write_failed",
        }
    }

    /// Upstream failures are expected no-ops, not operator problems.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::UpstreamFailure(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestErrorCode {
    E001Locked,
    E002StaleBuild,
    E003InboxUnreadable,
    E004StoreUnwritable,
    E005ConfigInvalid,
    E006FlushFailed,
}

impl IngestErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001Locked => "E001_LOCKED",
            Self::E002StaleBuild => "E002_STALE_BUILD",
            Self::E003InboxUnreadable => "E003_INBOX_UNREADABLE",
            Self::E004StoreUnwritable => "E004_STORE_UNWRITABLE",
            Self::E005ConfigInvalid => "E005_CONFIG_INVALID",
            Self::E006FlushFailed => "E006_FLUSH_FAILED",
        }
    }
}
