use std::collections::BTreeSet;
use std::env;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const ENV_PREFIX: &str = "FRANCHISE_";
const SOURCE_ROOT: &str = "src";
const GENERATED_FILE: &str = "franchise_env_allowlist.rs";

/// All `.rs` files under `root`, walked without recursion.
fn source_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut pending = vec![root.to_path_buf()];
    let mut files = Vec::new();
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Env var names are whole upper-snake tokens that start with the prefix,
/// so `GENERATED_FRANCHISE_...` or a bare `FRANCHISE_` never match.
fn env_names(source: &str) -> impl Iterator<Item = &str> {
    source
        .split(|c: char| !(c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'))
        .filter(|token| {
            token.len() > ENV_PREFIX.len() && token.starts_with(ENV_PREFIX) && !token.ends_with('_')
        })
}

fn render_allowlist(names: &BTreeSet<String>) -> String {
    let mut out = String::from("pub const GENERATED_FRANCHISE_ENV_ALLOWLIST: &[&str] = &[\n");
    for name in names {
        out.push_str(&format!("    {name:?},\n"));
    }
    out.push_str("];\n");
    out
}

fn main() -> Result<(), Box<dyn Error>> {
    let mut names = BTreeSet::new();
    for file in source_files(Path::new(SOURCE_ROOT))? {
        let source = fs::read_to_string(&file)?;
        names.extend(env_names(&source).map(str::to_string));
    }
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    fs::write(out_dir.join(GENERATED_FILE), render_allowlist(&names))?;

    let built_at = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    println!(
        "cargo:rustc-env=BUILD_UUID={:x}-{:x}",
        built_at.as_secs(),
        built_at.subsec_nanos()
    );
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed={SOURCE_ROOT}");
    Ok(())
}
