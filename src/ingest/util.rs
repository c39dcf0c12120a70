use anyhow::Result;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

/// Return the current Unix epoch in seconds.
pub fn now_epoch_secs() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// Truncate `input` to at most `max_chars` Unicode characters, stripping
/// control characters and appending `…` when truncated.
pub fn truncate_with_ellipsis(input: &str, max_chars: usize) -> String {
    let clean: String = input.chars().filter(|c| !c.is_control()).collect();
    if clean.chars().count() > max_chars {
        let mut s: String = clean.chars().take(max_chars).collect();
        s.push('…');
        s
    } else {
        clean
    }
}

/// Turn a routing hint into a single file-name-safe slug: path separators
/// become `_`, anything outside `[A-Za-z0-9._-]` is dropped.
pub fn hint_slug(hint: &str) -> String {
    let mut out = String::with_capacity(hint.len());
    for ch in hint.trim_matches('/').chars() {
        if ch == '/' || ch == '\\' {
            out.push('_');
        } else if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            out.push(ch);
        }
    }
    let trimmed = out.trim_matches('.');
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn pid_alive(pid: u32) -> bool {
    if cfg!(windows) {
        // The fs2 lock is authoritative on Windows; treat the holder as alive.
        true
    } else {
        let Ok(status) = Command::new("kill").arg("-0").arg(pid.to_string()).status() else {
            return false;
        };
        status.success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_slug_flattens_path_segments() {
        assert_eq!(hint_slug("ps5/17287266/freeagents"), "ps5_17287266_freeagents");
        assert_eq!(hint_slug("/a/b/"), "a_b");
    }

    #[test]
    fn hint_slug_drops_traversal_and_falls_back() {
        assert_eq!(hint_slug("../.."), "_");
        assert_eq!(hint_slug(""), "unknown");
        assert_eq!(hint_slug("..."), "unknown");
    }

    #[test]
    fn truncate_marks_cut_bodies() {
        assert_eq!(truncate_with_ellipsis("abcdef", 3), "abc…");
        assert_eq!(truncate_with_ellipsis("ab\ncd", 10), "abcd");
    }
}
