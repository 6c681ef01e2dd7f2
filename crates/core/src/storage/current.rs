use crate::scoring::Records;
use crate::storage::{read_optional, write_json_atomic};
use anyhow::Context;
use std::path::Path;

/// Missing or empty file loads as an empty store; malformed JSON is an error.
pub fn load_current(path: &Path) -> anyhow::Result<Records> {
    let Some(body) = read_optional(path)? else {
        tracing::info!(path = %path.display(), "current store not found; starting empty");
        return Ok(Records::new());
    };

    let records: Records = serde_json::from_str(&body)
        .with_context(|| format!("failed to parse current store {}", path.display()))?;
    tracing::info!(path = %path.display(), records = records.len(), "loaded current store");
    Ok(records)
}

pub fn save_current(path: &Path, records: &Records) -> anyhow::Result<()> {
    write_json_atomic(path, records)?;
    tracing::info!(path = %path.display(), records = records.len(), "saved current store");
    Ok(())
}
