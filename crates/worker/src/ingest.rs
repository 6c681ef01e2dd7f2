use crate::universe::{normalize_ticker, TickerEntry};
use chrono::Utc;
use std::time::Duration;
use sthlm_core::domain::StockRecord;
use sthlm_core::ingest::{apply_fundamentals, merge_failed_fetch, MarketDataProvider};
use sthlm_core::scoring::Records;

/// Failures beyond this count are logged at debug level only.
const LOUD_FAILURES: usize = 10;
const PROGRESS_EVERY: usize = 25;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    pub attempted: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Fetches each selected ticker sequentially and merges the result into
/// `records`. A failed ticker never aborts the run.
pub async fn refresh_records(
    provider: &dyn MarketDataProvider,
    entries: &[&TickerEntry],
    records: &mut Records,
    req_delay: Duration,
) -> RefreshStats {
    let mut stats = RefreshStats::default();
    let total = entries.len();
    tracing::info!(provider = provider.provider_name(), total, "refreshing stale tickers");

    for (i, entry) in entries.iter().enumerate() {
        stats.attempted += 1;
        let symbol = normalize_ticker(&entry.ticker);
        let now = Utc::now();

        match provider.fetch_fundamentals(&symbol).await {
            Ok(resp) => {
                let mut record = records.remove(&entry.ticker).unwrap_or_else(|| {
                    StockRecord::empty(&entry.ticker, &entry.name, &symbol, now)
                });
                record.yfinance_ticker = symbol.clone();
                apply_fundamentals(&mut record, resp, now);
                if record.fetch_error().is_some() {
                    stats.failed += 1;
                } else {
                    stats.updated += 1;
                }
                records.insert(entry.ticker.clone(), record);
            }
            Err(err) => {
                stats.failed += 1;
                if stats.failed <= LOUD_FAILURES {
                    tracing::warn!(ticker = %entry.ticker, %symbol, error = %err, "fetch failed");
                } else {
                    tracing::debug!(ticker = %entry.ticker, %symbol, error = %err, "fetch failed");
                }
                let existing = records.remove(&entry.ticker);
                let record = merge_failed_fetch(
                    existing,
                    &entry.ticker,
                    &entry.name,
                    &symbol,
                    &format!("{err:#}"),
                    now,
                );
                records.insert(entry.ticker.clone(), record);
            }
        }

        if (i + 1) % PROGRESS_EVERY == 0 || i + 1 == total {
            tracing::info!(
                done = i + 1,
                total,
                updated = stats.updated,
                failed = stats.failed,
                "refresh progress"
            );
        }

        if !req_delay.is_zero() && i + 1 < total {
            tokio::time::sleep(req_delay).await;
        }
    }

    stats
}
