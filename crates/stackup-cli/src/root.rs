use std::path::{Path, PathBuf};

use stackup_core::paths::CONFIG_FILE;

/// Resolve the project root.
///
/// Priority:
/// 1. `--root` flag / `STACKUP_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `stackup.yaml`
/// 3. Walk upward from `cwd` looking for `.git/`
/// 4. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_root(&cwd)
}

fn find_root(start: &Path) -> PathBuf {
    let marked = |marker: fn(&Path) -> bool| start.ancestors().find(|d| marker(d)).map(Path::to_path_buf);

    marked(|d| d.join(CONFIG_FILE).is_file())
        .or_else(|| marked(|d| d.join(".git").is_dir()))
        .unwrap_or_else(|| start.to_path_buf())
}
