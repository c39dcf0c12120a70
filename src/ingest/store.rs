use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::ingest::location::{Bucket, LocationKey};

pub const DEFAULT_POINTER_FILE: &str = "default_week.json";
pub const TEAM_MAP_FILE: &str = "team_map.json";

#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub path: PathBuf,
    pub bytes: usize,
    /// The file already held identical bytes; nothing was replaced.
    pub unchanged: bool,
}

/// Hierarchical file store: `{root}/{league}/season_{s}/week_{w}/{name}.json`.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn league_dir(&self, league_id: &str) -> PathBuf {
        self.root.join(league_id)
    }

    pub fn season_dir(&self, league_id: &str, season: Bucket) -> PathBuf {
        self.league_dir(league_id).join(season.dir_name("season"))
    }

    pub fn bucket_dir(&self, location: &LocationKey) -> PathBuf {
        self.season_dir(&location.league_id, location.season)
            .join(location.week.dir_name("week"))
    }

    pub fn global_dir(&self, league_id: &str) -> PathBuf {
        self.bucket_dir(&LocationKey::global(league_id))
    }

    pub fn document_path(&self, location: &LocationKey, name: &str) -> PathBuf {
        self.bucket_dir(location).join(format!("{name}.json"))
    }

    pub fn default_pointer_path(&self, league_id: &str) -> PathBuf {
        self.league_dir(league_id).join(DEFAULT_POINTER_FILE)
    }

    pub fn team_map_path(&self, league_id: &str) -> PathBuf {
        self.league_dir(league_id).join(TEAM_MAP_FILE)
    }

    pub fn read_document(&self, path: &Path) -> Result<Option<Value>> {
        read_json(path)
    }
}

pub fn read_json(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let parsed = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(parsed))
}

fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn same_content(path: &Path, bytes: &[u8]) -> bool {
    match fs::read(path) {
        Ok(existing) => {
            existing.len() == bytes.len() && content_hash(&existing) == content_hash(bytes)
        }
        Err(_) => false,
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn write_document<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<WriteOutcome> {
    let data = serde_json::to_string_pretty(value)?;
    let bytes = format!("{data}\n").into_bytes();
    write_atomic_with(path, &bytes, |file, bytes| file.write_all(bytes))
}

/// Write through a sibling temp file, fsync it, then rename over `path`.
///
/// Readers see either the old file or the new one. If `fill` or anything after
/// it fails, the temp file is dropped and `path` is untouched.
pub(crate) fn write_atomic_with<F>(path: &Path, bytes: &[u8], fill: F) -> Result<WriteOutcome>
where
    F: FnOnce(&mut fs::File, &[u8]) -> io::Result<()>,
{
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;

    if same_content(path, bytes) {
        return Ok(WriteOutcome {
            path: path.to_path_buf(),
            bytes: bytes.len(),
            unchanged: true,
        });
    }

    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".tmp")
        .tempfile_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;

    fill(tmp.as_file_mut(), bytes)
        .with_context(|| format!("failed to write temp file for {}", path.display()))?;
    tmp.as_file_mut()
        .sync_all()
        .with_context(|| format!("failed to sync temp file for {}", path.display()))?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to replace {}", path.display()))?;

    Ok(WriteOutcome {
        path: path.to_path_buf(),
        bytes: bytes.len(),
        unchanged: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn leftover_temp_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .expect("read dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count()
    }

    #[test]
    fn write_creates_parents_and_replaces_content() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("123456/season_3/week_4/passing.json");

        let first = write_document(&path, &json!({"v": 1})).expect("first write");
        assert!(!first.unchanged);
        let second = write_document(&path, &json!({"v": 2})).expect("second write");
        assert!(!second.unchanged);

        let stored = read_json(&path).expect("read").expect("present");
        assert_eq!(stored, json!({"v": 2}));
        assert_eq!(leftover_temp_files(path.parent().expect("parent")), 0);
    }

    #[test]
    fn identical_content_is_not_rewritten() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("doc.json");
        write_document(&path, &json!({"a": [1, 2]})).expect("write");
        let again = write_document(&path, &json!({"a": [1, 2]})).expect("rewrite");
        assert!(again.unchanged);
    }

    #[test]
    fn failure_mid_temp_write_leaves_target_untouched() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("standings.json");
        write_document(&path, &json!({"version": "old"})).expect("seed");
        let before = fs::read(&path).expect("read before");

        let replacement = serde_json::to_vec_pretty(&json!({"version": "new", "pad": "x".repeat(4096)}))
            .expect("encode");
        let err = write_atomic_with(&path, &replacement, |file, bytes| {
            file.write_all(&bytes[..bytes.len() / 2])?;
            Err(io::Error::other("disk yanked"))
        })
        .expect_err("injected failure");
        assert!(format!("{err:#}").contains("disk yanked"));

        assert_eq!(fs::read(&path).expect("read after"), before);
        assert_eq!(leftover_temp_files(tmp.path()), 0);
    }

    #[test]
    fn layout_follows_league_season_week() {
        let store = Store::new("/data");
        let loc = LocationKey {
            league_id: "17287266".to_string(),
            season: Bucket::Number(3),
            week: Bucket::Number(19),
        };
        assert_eq!(
            store.document_path(&loc, "schedules"),
            PathBuf::from("/data/17287266/season_3/week_19/schedules.json")
        );
        assert_eq!(
            store.global_dir("17287266"),
            PathBuf::from("/data/17287266/season_global/week_global")
        );
        assert_eq!(
            store.default_pointer_path("17287266"),
            PathBuf::from("/data/17287266/default_week.json")
        );
    }
}
