use std::env;
use std::path::PathBuf;

const ENV_FILE_VAR: &str = "FRANCHISE_ENV_FILE";

fn fallback_dotenv_path(franchise_home: Option<PathBuf>, home_dir: Option<PathBuf>) -> Option<PathBuf> {
    let base = franchise_home.or(home_dir)?;
    Some(base.join("franchise").join(".env"))
}

/// Candidate `.env` files in load order: an explicit `FRANCHISE_ENV_FILE`,
/// then `./.env`, then `{FRANCHISE_HOME or HOME}/franchise/.env`.
fn candidates(
    explicit: Option<PathBuf>,
    franchise_home: Option<PathBuf>,
    home_dir: Option<PathBuf>,
) -> Vec<PathBuf> {
    let mut out = Vec::new();
    out.extend(explicit.filter(|p| !p.as_os_str().is_empty()));
    out.push(PathBuf::from(".env"));
    out.extend(fallback_dotenv_path(franchise_home, home_dir));
    out
}

/// Load the first `.env` that exists. Variables already set in the process
/// environment are never overridden.
pub fn load_dotenv() {
    let paths = candidates(
        env::var_os(ENV_FILE_VAR).map(PathBuf::from),
        env::var_os("FRANCHISE_HOME").map(PathBuf::from),
        dirs::home_dir(),
    );
    for path in paths {
        if path.is_file() && dotenvy::from_path(&path).is_ok() {
            return;
        }
    }
}
