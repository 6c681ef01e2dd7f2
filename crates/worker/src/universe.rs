use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use sthlm_core::domain::StockRecord;
use sthlm_core::scoring::Records;

/// Records older than this are refreshed on a `--fetch` run.
const STALE_AFTER_MINUTES: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TickerEntry {
    pub ticker: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshOptions {
    pub force: bool,
    pub limit: Option<usize>,
}

/// Loads the ticker list, dropping B shares whose A share is also listed.
pub fn load_tickers(path: &Path) -> anyhow::Result<Vec<TickerEntry>> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read ticker list {}", path.display()))?;
    let entries: Vec<TickerEntry> = serde_json::from_str(&body)
        .with_context(|| format!("failed to parse ticker list {}", path.display()))?;

    let entries: Vec<TickerEntry> = entries
        .into_iter()
        .filter(|e| !e.ticker.trim().is_empty())
        .collect();
    let redundant = redundant_b_shares(entries.iter().map(|e| e.ticker.as_str()));
    let kept: Vec<TickerEntry> = entries
        .into_iter()
        .filter(|e| !redundant.contains(&e.ticker))
        .collect();

    tracing::info!(
        path = %path.display(),
        tickers = kept.len(),
        b_shares_skipped = redundant.len(),
        "loaded ticker list"
    );
    Ok(kept)
}

/// `X.B` tickers for which `X.A` is also present. Lone B shares are kept.
pub fn redundant_b_shares<'a, I>(tickers: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str> + Clone,
{
    let a_bases: BTreeSet<String> = tickers
        .clone()
        .into_iter()
        .filter_map(|t| share_class_base(t, "A"))
        .collect();

    tickers
        .into_iter()
        .filter(|t| share_class_base(t, "B").is_some_and(|base| a_bases.contains(&base)))
        .map(str::to_string)
        .collect()
}

/// Removes redundant B shares from the current store, returning their tickers.
pub fn prune_b_shares(records: &mut Records) -> BTreeSet<String> {
    let redundant = redundant_b_shares(records.keys().map(String::as_str));
    records.retain(|ticker, _| !redundant.contains(ticker));
    redundant
}

fn share_class_base(ticker: &str, class: &str) -> Option<String> {
    let upper = ticker.trim().to_ascii_uppercase();
    let (base, suffix) = upper.rsplit_once('.')?;
    (suffix == class && !base.is_empty()).then(|| base.to_string())
}

/// Provider-side symbol for a Stockholm ticker (`STAR.A` -> `STAR-A.ST`).
pub fn normalize_ticker(ticker: &str) -> String {
    let ticker = ticker.trim();

    for suffix in [".SDB", ".STAM", ".PREF"] {
        if let Some(base) = ticker.strip_suffix(suffix) {
            return format!("{base}-{}.ST", &suffix[1..]);
        }
    }
    if let Some(base) = ticker.strip_suffix(".SEK") {
        return format!("{base}.ST");
    }
    if let Some(base) = ticker.strip_suffix(".SE") {
        return format!("{base}.ST");
    }
    if let Some(base) = ticker.strip_suffix("-HE") {
        return format!("{base}.HE");
    }
    if let Some(base) = ticker.strip_suffix(".ST") {
        return format!("{}.ST", base.replacen('.', "-", 1));
    }
    format!("{}.ST", ticker.replacen('.', "-", 1))
}

pub fn needs_refresh(record: Option<&StockRecord>, now: DateTime<Utc>, force: bool) -> bool {
    if force {
        return true;
    }
    let Some(record) = record else {
        return true;
    };
    if record.fetch_error().is_some() {
        return true;
    }
    match record.last_updated_at() {
        Some(at) => now - at > Duration::minutes(STALE_AFTER_MINUTES),
        None => true,
    }
}

/// Tickers to refresh, oldest first (never-fetched first), capped by `limit`.
pub fn select_for_refresh<'a>(
    entries: &'a [TickerEntry],
    records: &Records,
    now: DateTime<Utc>,
    opts: RefreshOptions,
) -> Vec<&'a TickerEntry> {
    let mut stale: Vec<(Option<DateTime<Utc>>, &TickerEntry)> = entries
        .iter()
        .filter(|e| needs_refresh(records.get(&e.ticker), now, opts.force))
        .map(|e| (records.get(&e.ticker).and_then(StockRecord::last_updated_at), e))
        .collect();

    // `None` sorts before any timestamp.
    stale.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.ticker.cmp(&b.1.ticker)));

    let limit = opts.limit.filter(|n| *n > 0).unwrap_or(stale.len());
    stale.into_iter().take(limit).map(|(_, e)| e).collect()
}
