use crate::domain::stock::market_cap_category;
use crate::domain::{Figure, StockRecord};
use crate::ingest::types::FundamentalsResponse;
use chrono::{DateTime, Utc};
use serde_json::Value;

pub const NO_DATA_ERROR: &str = "No data available from provider";

/// Merges a successful provider response into `record`, replacing every
/// market and fundamental field. Identity fields and scores are left alone.
pub fn apply_fundamentals(
    record: &mut StockRecord,
    resp: FundamentalsResponse,
    now: DateTime<Utc>,
) {
    let price = finite(resp.price);
    let (change, change_percent) = price_change(price, finite(resp.previous_close));
    let market_cap = finite(resp.market_cap);

    if let Some(name) = resp.name.filter(|n| !n.trim().is_empty()) {
        if record.name.trim().is_empty() {
            record.name = name;
        }
    }

    record.price = price.map(round2).into();
    record.change = change.map(round2).into();
    record.change_percent = change_percent.map(round2).into();
    record.currency = text(resp.currency.or_else(|| Some("SEK".to_string())));
    record.market_cap = market_cap.into();
    record.volume = finite(resp.volume).into();
    record.market_cap_category = market_cap_category(record.market_cap);

    record.sector = text(resp.sector);
    record.industry = text(resp.industry);
    record.country = text(resp.country.or_else(|| Some("Sweden".to_string())));
    record.market = text(resp.market);
    if let Some(description) = resp.description.filter(|d| !d.trim().is_empty()) {
        record
            .extra
            .insert("description".to_string(), Value::String(description));
    }

    record.pe_ratio = finite(resp.pe_ratio).into();
    record.dividend_yield = finite(resp.dividend_yield)
        .map(normalize_dividend_yield)
        .into();

    record.enterprise_value = finite(resp.enterprise_value).into();
    record.ebit = finite(resp.ebit).into();
    record.ebit_period = text(resp.ebit_period);
    record.quarterly_ebit = non_empty(resp.quarterly_ebit);
    record.total_assets = finite(resp.total_assets).into();
    record.current_assets = finite(resp.current_assets).into();
    record.current_liabilities = finite(resp.current_liabilities).into();
    record.net_fixed_assets = finite(resp.net_fixed_assets).into();
    record.balance_sheet_period = text(resp.balance_sheet_period);
    record.quarterly_balance_sheet = non_empty(resp.quarterly_balance_sheet);

    record.last_updated = Some(now.to_rfc3339());
    let no_data =
        !record.price.is_known() && !record.market_cap.is_known() && !record.sector.is_known();
    record.error = if no_data {
        Some(NO_DATA_ERROR.to_string())
    } else {
        None
    };
}

/// Record to store after a failed fetch. A previously good record is kept
/// as-is; otherwise an empty record carries the error.
pub fn merge_failed_fetch(
    existing: Option<StockRecord>,
    ticker: &str,
    name: &str,
    yfinance_ticker: &str,
    error: &str,
    now: DateTime<Utc>,
) -> StockRecord {
    match existing {
        Some(record) if record.fetch_error().is_none() => record,
        _ => {
            let mut record = StockRecord::empty(ticker, name, yfinance_ticker, now);
            record.error = Some(error.to_string());
            record
        }
    }
}

/// Providers report dividend yield either as a decimal or as a percentage.
pub fn normalize_dividend_yield(value: f64) -> f64 {
    if value > 1.0 {
        value / 100.0
    } else {
        value
    }
}

fn price_change(price: Option<f64>, previous_close: Option<f64>) -> (Option<f64>, Option<f64>) {
    let (Some(price), Some(previous)) = (price, previous_close) else {
        return (None, None);
    };
    let change = price - previous;
    let percent = if previous != 0.0 {
        change / previous * 100.0
    } else {
        0.0
    };
    (Some(change), Some(percent))
}

fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn text(v: Option<String>) -> Figure<String> {
    Figure::from(v).text().map(str::to_string).into()
}

fn non_empty<T>(v: Vec<T>) -> Figure<Vec<T>> {
    if v.is_empty() {
        Figure::Unavailable
    } else {
        Figure::Known(v)
    }
}
