use crate::storage::sibling;
use anyhow::Context;
use fs4::fs_std::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Exclusive lock on `<store>.lock` for the duration of a worker run.
///
/// The lock lives on the open file handle, so the OS releases it when the
/// guard drops or the process dies. The file itself stays on disk.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    _file: File,
}

impl RunLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `Ok(None)` when another live run holds the lock.
pub fn try_acquire_run_lock(store_path: &Path) -> anyhow::Result<Option<RunLock>> {
    let path = sibling(store_path, "lock");
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .with_context(|| format!("failed to open lock {}", path.display()))?;

    match FileExt::try_lock_exclusive(&file) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to lock {}", path.display()));
        }
    }

    // Informational only; nothing reads it back.
    let _ = file.set_len(0);
    let _ = writeln!(file, "pid={}", std::process::id());

    Ok(Some(RunLock { path, _file: file }))
}
