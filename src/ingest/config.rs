use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterConfig {
    pub debounce_ms: u64,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self { debounce_ms: 8_000 }
    }
}

impl RosterConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LeagueConfig {
    #[serde(default)]
    pub fallback_id: Option<String>,
}

const DEFAULT_CAPTURE_MAX_BYTES: u64 = 32 * 1024 * 1024;

fn default_capture_max_bytes() -> u64 {
    DEFAULT_CAPTURE_MAX_BYTES
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub enabled: bool,
    /// Size at which the capture log rotates to `{file}.1`.
    #[serde(default = "default_capture_max_bytes")]
    pub max_bytes: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_bytes: DEFAULT_CAPTURE_MAX_BYTES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    pub poll_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IngestConfig {
    pub roster: RosterConfig,
    pub league: LeagueConfig,
    pub capture: CaptureConfig,
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialIngestConfig {
    roster: Option<RosterConfig>,
    league: Option<LeagueConfig>,
    capture: Option<CaptureConfig>,
    watch: Option<WatchConfig>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => {
            let trimmed = v.trim();
            match trimmed {
                "1" | "true" | "TRUE" | "yes" | "on" => true,
                "0" | "false" | "FALSE" | "no" | "off" => false,
                _ => fallback,
            }
        }
        Err(_) => fallback,
    }
}

fn env_or_optional_string(var: &str, fallback: Option<String>) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => fallback,
    }
}

pub fn is_league_id(raw: &str) -> bool {
    (6..=12).contains(&raw.len()) && raw.bytes().all(|b| b.is_ascii_digit())
}

pub fn validate(cfg: &IngestConfig) -> Result<()> {
    if cfg.roster.debounce_ms == 0 {
        return Err(anyhow!("invalid roster debounce: must be >= 1 ms"));
    }
    if cfg.watch.poll_interval_ms == 0 {
        return Err(anyhow!("invalid watch poll interval: must be >= 1 ms"));
    }
    if cfg.capture.max_bytes == 0 {
        return Err(anyhow!("invalid capture max bytes: must be >= 1"));
    }
    if let Some(id) = cfg.league.fallback_id.as_deref() {
        if !is_league_id(id) {
            return Err(anyhow!(
                "invalid fallback league id `{id}`: expected 6-12 digits"
            ));
        }
    }
    Ok(())
}

pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("FRANCHISE_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".franchise").join("ingest.toml"))
}

fn merge_file_config(base: &mut IngestConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    merge_toml(base, &raw)
        .map_err(|err| anyhow!("failed to parse ingest config {}: {err}", path.display()))
}

fn merge_toml(base: &mut IngestConfig, raw: &str) -> Result<()> {
    let parsed: PartialIngestConfig = toml::from_str(raw)?;
    if let Some(roster) = parsed.roster {
        base.roster = roster;
    }
    if let Some(league) = parsed.league {
        base.league = league;
    }
    if let Some(capture) = parsed.capture {
        base.capture = capture;
    }
    if let Some(watch) = parsed.watch {
        base.watch = watch;
    }
    Ok(())
}

pub fn load_config() -> Result<IngestConfig> {
    let mut cfg = IngestConfig::default();
    merge_file_config(&mut cfg)?;

    cfg.roster.debounce_ms = env_or_u64("FRANCHISE_ROSTER_DEBOUNCE_MS", cfg.roster.debounce_ms);
    cfg.league.fallback_id =
        env_or_optional_string("FRANCHISE_FALLBACK_LEAGUE_ID", cfg.league.fallback_id);
    cfg.capture.enabled = env_or_bool("FRANCHISE_CAPTURE_ENABLED", cfg.capture.enabled);
    cfg.capture.max_bytes = env_or_u64("FRANCHISE_CAPTURE_MAX_BYTES", cfg.capture.max_bytes);
    cfg.watch.poll_interval_ms =
        env_or_u64("FRANCHISE_POLL_INTERVAL_MS", cfg.watch.poll_interval_ms);

    validate(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = IngestConfig::default();
        assert_eq!(cfg.roster.debounce_ms, 8_000);
        assert!(cfg.capture.enabled);
        validate(&cfg).expect("defaults validate");
    }

    #[test]
    fn toml_sections_override_defaults() {
        let mut cfg = IngestConfig::default();
        merge_toml(
            &mut cfg,
            "[roster]\ndebounce_ms = 250\n\n[league]\nfallback_id = \"17287266\"\n",
        )
        .expect("merge");
        assert_eq!(cfg.roster.debounce_ms, 250);
        assert_eq!(cfg.league.fallback_id.as_deref(), Some("17287266"));
        assert!(cfg.capture.enabled);
    }

    #[test]
    fn capture_section_without_cap_keeps_default_cap() {
        let mut cfg = IngestConfig::default();
        merge_toml(&mut cfg, "[capture]\nenabled = false\n").expect("merge");
        assert!(!cfg.capture.enabled);
        assert_eq!(cfg.capture.max_bytes, DEFAULT_CAPTURE_MAX_BYTES);

        merge_toml(&mut cfg, "[capture]\nenabled = true\nmax_bytes = 4096\n").expect("merge");
        assert_eq!(cfg.capture.max_bytes, 4096);

        cfg.capture.max_bytes = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn validate_rejects_bad_fallback_and_zero_debounce() {
        let mut cfg = IngestConfig::default();
        cfg.league.fallback_id = Some("abc".to_string());
        assert!(validate(&cfg).is_err());

        let mut cfg = IngestConfig::default();
        cfg.roster.debounce_ms = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn league_id_shape() {
        assert!(is_league_id("172872"));
        assert!(is_league_id("123456789012"));
        assert!(!is_league_id("12345"));
        assert!(!is_league_id("1234567890123"));
        assert!(!is_league_id("17287a66"));
    }
}
