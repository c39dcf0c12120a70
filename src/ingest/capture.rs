use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const BLOCK_MARKER: &str = "===== NEW WEBHOOK:";
const HEADERS_LINE: &str = "HEADERS:";
const BODY_LINE: &str = "BODY:";

pub type Headers = BTreeMap<String, String>;

/// One delivery recovered from a capture log.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedDelivery {
    pub hint: String,
    pub captured_at: String,
    pub headers: Headers,
    pub body: String,
}

#[derive(Debug, Default)]
pub struct CaptureLog {
    pub deliveries: Vec<CapturedDelivery>,
    pub skipped: usize,
}

pub fn format_block(hint: &str, headers: &Headers, body: &[u8], captured_at: &str) -> String {
    let mut out = format!("{BLOCK_MARKER} {hint} @ {captured_at}\n{HEADERS_LINE}\n");
    for (key, value) in headers {
        out.push_str(&format!("{key}: {value}\n"));
    }
    out.push_str(&format!("\n{BODY_LINE}\n"));
    out.push_str(&String::from_utf8_lossy(body));
    out.push_str("\n\n");
    out
}

/// Where a full capture log is moved to make room. One generation is kept.
pub fn rotated_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".1");
    PathBuf::from(name)
}

/// Move the log aside when appending `incoming` bytes would push it past
/// `max_bytes`. An empty log is never rotated.
fn rotate_if_full(path: &Path, incoming: u64, max_bytes: u64) -> Result<bool> {
    let current = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to stat {}", path.display()));
        }
    };
    if current == 0 || current.saturating_add(incoming) <= max_bytes {
        return Ok(false);
    }
    let rotated = rotated_path(path);
    fs::rename(path, &rotated).with_context(|| {
        format!("failed to rotate {} -> {}", path.display(), rotated.display())
    })?;
    tracing::info!(file = %path.display(), bytes = current, "capture log rotated");
    Ok(true)
}

/// Append a delivery to the capture log, rotating it once it reaches `max_bytes`.
pub fn append_delivery(
    path: &Path,
    max_bytes: u64,
    hint: &str,
    headers: &Headers,
    body: &[u8],
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let captured_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let block = format_block(hint, headers, body, &captured_at);
    rotate_if_full(path, block.len() as u64, max_bytes)?;
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(block.as_bytes())
        .with_context(|| format!("failed to append {}", path.display()))?;
    Ok(())
}

fn parse_block(block: &str) -> Option<CapturedDelivery> {
    let (title, rest) = block.split_once('\n')?;
    let (hint, captured_at) = match title.rsplit_once(" @ ") {
        Some((hint, at)) => (hint.trim(), at.trim()),
        None => (title.trim(), ""),
    };
    let body_start = rest.find(&format!("{BODY_LINE}\n"))?;
    let (head, body) = rest.split_at(body_start);
    let body = body[BODY_LINE.len() + 1..].trim();
    if body.is_empty() {
        return None;
    }

    let headers = head
        .lines()
        .skip_while(|line| line.trim() != HEADERS_LINE)
        .skip(1)
        .filter_map(|line| line.split_once(": "))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    Some(CapturedDelivery {
        hint: hint.to_string(),
        captured_at: captured_at.to_string(),
        headers,
        body: body.to_string(),
    })
}

/// Split a capture log into deliveries; blocks without a body are counted as skipped.
pub fn parse_log(raw: &str) -> CaptureLog {
    let mut log = CaptureLog::default();
    for block in raw.split(BLOCK_MARKER).skip(1) {
        match parse_block(block.trim_start_matches(' ')) {
            Some(delivery) => log.deliveries.push(delivery),
            None => log.skipped += 1,
        }
    }
    log
}

pub fn read_log(path: &Path) -> Result<CaptureLog> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(parse_log(&raw))
}
