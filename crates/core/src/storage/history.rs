use crate::domain::history::{History, HistoryEntry};
use crate::storage::{read_optional, sibling, write_json_atomic};
use anyhow::Context;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// Loads the dated history store.
///
/// Files in the older list-per-ticker layout are converted in place. A file
/// that is not JSON at all is moved aside to `<name>.backup` and an empty
/// history is returned so the daily run can continue.
pub fn load_history(path: &Path) -> anyhow::Result<History> {
    let Some(body) = read_optional(path)? else {
        return Ok(History::new());
    };

    let raw: Value = match serde_json::from_str(&body) {
        Ok(raw) => raw,
        Err(err) => {
            let backup = sibling(path, "backup");
            fs::rename(path, &backup).with_context(|| {
                format!("failed to move corrupt history to {}", backup.display())
            })?;
            tracing::warn!(
                path = %path.display(),
                backup = %backup.display(),
                error = %err,
                "history store is corrupt; starting a fresh one"
            );
            return Ok(History::new());
        }
    };

    let (history, migrated) = parse_history(raw)
        .with_context(|| format!("failed to parse history store {}", path.display()))?;
    if migrated {
        tracing::info!(
            path = %path.display(),
            tickers = history.len(),
            "migrated legacy history layout"
        );
        save_history(path, &history)?;
    }
    Ok(history)
}

/// Side-effect free variant for readers: legacy files are converted in
/// memory only and corrupt JSON is an error.
pub fn read_history(path: &Path) -> anyhow::Result<History> {
    let Some(body) = read_optional(path)? else {
        return Ok(History::new());
    };
    let raw: Value = serde_json::from_str(&body)
        .with_context(|| format!("failed to parse history store {}", path.display()))?;
    let (history, _) = parse_history(raw)
        .with_context(|| format!("failed to parse history store {}", path.display()))?;
    Ok(history)
}

pub fn save_history(path: &Path, history: &History) -> anyhow::Result<()> {
    write_json_atomic(path, history)?;
    tracing::info!(path = %path.display(), tickers = history.len(), "saved history store");
    Ok(())
}

/// Removes the histories of the given tickers. Returns how many were dropped.
pub fn drop_b_share_history(history: &mut History, pruned: &BTreeSet<String>) -> usize {
    let before = history.len();
    history.retain(|ticker, _| !pruned.contains(ticker));
    before - history.len()
}

/// Returns the history and whether any ticker used the legacy list layout.
fn parse_history(raw: Value) -> anyhow::Result<(History, bool)> {
    let Value::Object(tickers) = raw else {
        anyhow::bail!("history store must be a JSON object keyed by ticker");
    };

    let mut history = History::new();
    let mut migrated = false;
    for (ticker, value) in tickers {
        let days = match value {
            Value::Array(entries) => {
                migrated = true;
                migrate_legacy(entries)
            }
            other => serde_json::from_value::<BTreeMap<String, HistoryEntry>>(other)
                .with_context(|| format!("invalid history for {ticker}"))?,
        };
        history.insert(ticker, days);
    }
    Ok((history, migrated))
}

/// Keeps the first entry per calendar day of each `timestamp`.
fn migrate_legacy(entries: Vec<Value>) -> BTreeMap<String, HistoryEntry> {
    let mut days = BTreeMap::new();
    for entry in entries {
        let Some(date) = entry
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|ts| ts.get(..10))
            .map(str::to_string)
        else {
            continue;
        };
        if days.contains_key(&date) {
            continue;
        }
        let Ok(mut parsed) = serde_json::from_value::<HistoryEntry>(entry) else {
            continue;
        };
        parsed.date = date.clone();
        days.insert(date, parsed);
    }
    days
}
