use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct StorePaths {
    pub root: PathBuf,
    pub inbox_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub errors_dir: PathBuf,
    pub capture_file: PathBuf,
}

impl StorePaths {
    /// Lay out every derived location beneath `root` with default names.
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            inbox_dir: root.join("_inbox"),
            logs_dir: root.join("_logs"),
            errors_dir: root.join("_errors"),
            capture_file: root.join("webhook_debug.log"),
            root,
        }
    }

    pub fn lock_file(&self) -> PathBuf {
        self.logs_dir.join("ingest.lock")
    }
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<StorePaths> {
    let root = match env::var("FRANCHISE_ROOT") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => required_home_dir()?.join("franchise").join("uploads"),
    };

    let defaults = StorePaths::under(root);
    Ok(StorePaths {
        inbox_dir: env_or_default_path("FRANCHISE_INBOX_DIR", defaults.inbox_dir),
        logs_dir: env_or_default_path("FRANCHISE_LOGS_DIR", defaults.logs_dir),
        ..defaults
    })
}
