use anyhow::Context;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub mod current;
pub mod history;
pub mod lock;

pub use current::{load_current, save_current};
pub use history::{drop_b_share_history, load_history, read_history, save_history};
pub use lock::{try_acquire_run_lock, RunLock};

/// Pretty-prints `value` next to `path` and renames it into place, so
/// readers never observe a half-written store.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let body = serde_json::to_vec_pretty(value).context("failed to serialize store")?;
    let tmp = sibling(path, "tmp");
    fs::write(&tmp, body).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to move {} into place", path.display()))?;
    Ok(())
}

/// Reads a store file, treating a missing or blank file as `None`.
pub fn read_optional(path: &Path) -> anyhow::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(body) if body.trim().is_empty() => Ok(None),
        Ok(body) => Ok(Some(body)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

/// `data/x.json` + `lock` -> `data/x.json.lock`.
pub fn sibling(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}
