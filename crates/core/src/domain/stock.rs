use crate::domain::figure::Figure;
use crate::domain::variant::Variant;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const REASON_CALCULATED: &str = "Beräknad";
pub const REASON_NOT_CALCULATED: &str = "Ej beräknad";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarterlyEbit {
    pub period: String,
    #[serde(default)]
    pub ebit: Figure<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QuarterlyBalanceSheet {
    pub period: String,
    #[serde(default)]
    pub total_assets: Figure<f64>,
    #[serde(default)]
    pub current_liabilities: Figure<f64>,
    #[serde(default)]
    pub cash: Figure<f64>,
    #[serde(default)]
    pub short_term_debt: Figure<f64>,
    #[serde(default)]
    pub net_fixed_assets: Figure<f64>,
    #[serde(default)]
    pub current_assets: Figure<f64>,
}

/// Score and ranks of one record within one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VariantScores {
    pub score: Figure<u32>,
    pub ey_rank: Figure<u32>,
    pub roc_rank: Figure<u32>,
}

impl VariantScores {
    pub fn ranked(ey_rank: u32, roc_rank: u32) -> Self {
        Self {
            score: Figure::Known(ey_rank + roc_rank),
            ey_rank: Figure::Known(ey_rank),
            roc_rank: Figure::Known(roc_rank),
        }
    }

    /// A score is only meaningful together with both ranks.
    pub fn is_consistent(&self) -> bool {
        self.score.is_known() == (self.ey_rank.is_known() && self.roc_rank.is_known())
    }
}

/// One ticker in the current store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    pub ticker: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub yfinance_ticker: String,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub price: Figure<f64>,
    #[serde(default)]
    pub change: Figure<f64>,
    #[serde(default)]
    pub change_percent: Figure<f64>,
    #[serde(default)]
    pub currency: Figure<String>,
    #[serde(default)]
    pub market_cap: Figure<f64>,
    #[serde(default)]
    pub volume: Figure<f64>,

    #[serde(default)]
    pub sector: Figure<String>,
    #[serde(default)]
    pub industry: Figure<String>,
    #[serde(default)]
    pub country: Figure<String>,
    #[serde(default)]
    pub market: Figure<String>,
    #[serde(default)]
    pub market_cap_category: Figure<String>,

    #[serde(default)]
    pub pe_ratio: Figure<f64>,
    #[serde(default)]
    pub dividend_yield: Figure<f64>,

    #[serde(default)]
    pub enterprise_value: Figure<f64>,
    #[serde(default)]
    pub ebit: Figure<f64>,
    #[serde(default)]
    pub ebit_period: Figure<String>,
    #[serde(default)]
    pub quarterly_ebit: Figure<Vec<QuarterlyEbit>>,
    #[serde(default)]
    pub total_assets: Figure<f64>,
    #[serde(default)]
    pub current_assets: Figure<f64>,
    #[serde(default)]
    pub current_liabilities: Figure<f64>,
    #[serde(default)]
    pub net_fixed_assets: Figure<f64>,
    #[serde(default)]
    pub balance_sheet_period: Figure<String>,
    #[serde(default)]
    pub quarterly_balance_sheet: Figure<Vec<QuarterlyBalanceSheet>>,

    #[serde(default)]
    pub default_excluded: bool,
    #[serde(default)]
    pub exclusion_reason: Option<String>,

    #[serde(default)]
    pub magic_formula_score: Figure<u32>,
    #[serde(default)]
    pub magic_formula_score_100m: Figure<u32>,
    #[serde(default)]
    pub magic_formula_score_500m: Figure<u32>,
    #[serde(default)]
    pub magic_formula_score_1b: Figure<u32>,
    #[serde(default)]
    pub magic_formula_score_5b: Figure<u32>,
    #[serde(default)]
    pub ey_rank: Figure<u32>,
    #[serde(default)]
    pub roc_rank: Figure<u32>,
    #[serde(default)]
    pub ey_rank_100m: Figure<u32>,
    #[serde(default)]
    pub roc_rank_100m: Figure<u32>,
    #[serde(default)]
    pub ey_rank_500m: Figure<u32>,
    #[serde(default)]
    pub roc_rank_500m: Figure<u32>,
    #[serde(default)]
    pub ey_rank_1b: Figure<u32>,
    #[serde(default)]
    pub roc_rank_1b: Figure<u32>,
    #[serde(default)]
    pub ey_rank_5b: Figure<u32>,
    #[serde(default)]
    pub roc_rank_5b: Figure<u32>,

    /// Percent, `EBIT / EV * 100`.
    #[serde(default)]
    pub earnings_yield: Figure<f64>,
    /// Percent, `EBIT / invested capital * 100`.
    #[serde(default)]
    pub return_on_capital: Figure<f64>,
    #[serde(default = "not_calculated")]
    pub magic_formula_reason: String,
    #[serde(default)]
    pub magic_formula_ebit_periods: Figure<String>,
    #[serde(default)]
    pub magic_formula_balance_sheet_period: Figure<String>,
    #[serde(default)]
    pub magic_formula_uses_ttm: Option<bool>,

    /// Keys this crate does not model (description, provider extras, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn not_calculated() -> String {
    REASON_NOT_CALCULATED.to_string()
}

impl StockRecord {
    /// A record as the fetch stage creates it: every value unavailable.
    pub fn empty(ticker: &str, name: &str, yfinance_ticker: &str, now: DateTime<Utc>) -> Self {
        Self {
            ticker: ticker.to_string(),
            name: name.to_string(),
            yfinance_ticker: yfinance_ticker.to_string(),
            last_updated: Some(now.to_rfc3339()),
            error: None,
            price: Figure::Unavailable,
            change: Figure::Unavailable,
            change_percent: Figure::Unavailable,
            currency: Figure::Known("SEK".to_string()),
            market_cap: Figure::Unavailable,
            volume: Figure::Unavailable,
            sector: Figure::Unavailable,
            industry: Figure::Unavailable,
            country: Figure::Known("Sweden".to_string()),
            market: Figure::Unavailable,
            market_cap_category: Figure::Unavailable,
            pe_ratio: Figure::Unavailable,
            dividend_yield: Figure::Unavailable,
            enterprise_value: Figure::Unavailable,
            ebit: Figure::Unavailable,
            ebit_period: Figure::Unavailable,
            quarterly_ebit: Figure::Unavailable,
            total_assets: Figure::Unavailable,
            current_assets: Figure::Unavailable,
            current_liabilities: Figure::Unavailable,
            net_fixed_assets: Figure::Unavailable,
            balance_sheet_period: Figure::Unavailable,
            quarterly_balance_sheet: Figure::Unavailable,
            default_excluded: false,
            exclusion_reason: None,
            magic_formula_score: Figure::Unavailable,
            magic_formula_score_100m: Figure::Unavailable,
            magic_formula_score_500m: Figure::Unavailable,
            magic_formula_score_1b: Figure::Unavailable,
            magic_formula_score_5b: Figure::Unavailable,
            ey_rank: Figure::Unavailable,
            roc_rank: Figure::Unavailable,
            ey_rank_100m: Figure::Unavailable,
            roc_rank_100m: Figure::Unavailable,
            ey_rank_500m: Figure::Unavailable,
            roc_rank_500m: Figure::Unavailable,
            ey_rank_1b: Figure::Unavailable,
            roc_rank_1b: Figure::Unavailable,
            ey_rank_5b: Figure::Unavailable,
            roc_rank_5b: Figure::Unavailable,
            earnings_yield: Figure::Unavailable,
            return_on_capital: Figure::Unavailable,
            magic_formula_reason: not_calculated(),
            magic_formula_ebit_periods: Figure::Unavailable,
            magic_formula_balance_sheet_period: Figure::Unavailable,
            magic_formula_uses_ttm: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn fetch_error(&self) -> Option<&str> {
        self.error
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn scores(&self, variant: Variant) -> VariantScores {
        let (score, ey_rank, roc_rank) = match variant {
            Variant::Default => (self.magic_formula_score, self.ey_rank, self.roc_rank),
            Variant::Cap100M => (
                self.magic_formula_score_100m,
                self.ey_rank_100m,
                self.roc_rank_100m,
            ),
            Variant::Cap500M => (
                self.magic_formula_score_500m,
                self.ey_rank_500m,
                self.roc_rank_500m,
            ),
            Variant::Cap1B => (
                self.magic_formula_score_1b,
                self.ey_rank_1b,
                self.roc_rank_1b,
            ),
            Variant::Cap5B => (
                self.magic_formula_score_5b,
                self.ey_rank_5b,
                self.roc_rank_5b,
            ),
        };
        VariantScores {
            score,
            ey_rank,
            roc_rank,
        }
    }

    pub fn set_scores(&mut self, variant: Variant, scores: VariantScores) {
        let (score, ey_rank, roc_rank) = match variant {
            Variant::Default => (
                &mut self.magic_formula_score,
                &mut self.ey_rank,
                &mut self.roc_rank,
            ),
            Variant::Cap100M => (
                &mut self.magic_formula_score_100m,
                &mut self.ey_rank_100m,
                &mut self.roc_rank_100m,
            ),
            Variant::Cap500M => (
                &mut self.magic_formula_score_500m,
                &mut self.ey_rank_500m,
                &mut self.roc_rank_500m,
            ),
            Variant::Cap1B => (
                &mut self.magic_formula_score_1b,
                &mut self.ey_rank_1b,
                &mut self.roc_rank_1b,
            ),
            Variant::Cap5B => (
                &mut self.magic_formula_score_5b,
                &mut self.ey_rank_5b,
                &mut self.roc_rank_5b,
            ),
        };
        *score = scores.score;
        *ey_rank = scores.ey_rank;
        *roc_rank = scores.roc_rank;
    }

    /// Parses `last_updated`, accepting RFC 3339 and the naive ISO form older
    /// stores were written with.
    pub fn last_updated_at(&self) -> Option<DateTime<Utc>> {
        let s = self.last_updated.as_deref()?.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// Size bucket shown next to the market cap (SEK).
pub fn market_cap_category(market_cap: Figure<f64>) -> Figure<String> {
    let Some(cap) = market_cap.finite_value() else {
        return Figure::Unavailable;
    };

    let billions = cap / 1e9;
    let category = if billions >= 100.0 {
        "Large-cap"
    } else if billions >= 15.0 {
        "Mid-cap"
    } else if billions >= 1.0 {
        "Small-cap"
    } else {
        "Micro-cap"
    };
    Figure::Known(category.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 16, 18, 41, 59).unwrap()
    }

    #[test]
    fn empty_record_uses_sentinels() {
        let r = StockRecord::empty("VOLV.B", "Volvo", "VOLV-B.ST", now());
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["magic_formula_score_5b"], json!("N/A"));
        assert_eq!(v["quarterly_ebit"], json!("N/A"));
        assert_eq!(v["currency"], json!("SEK"));
        assert_eq!(v["magic_formula_reason"], json!(REASON_NOT_CALCULATED));
        assert_eq!(v["magic_formula_uses_ttm"], json!(null));
    }

    #[test]
    fn parses_sparse_store_record_and_keeps_unknown_keys() {
        let v = json!({
            "ticker": "ABB",
            "name": "ABB Ltd",
            "market_cap": 12_000_000_000.0,
            "description": "Electrification",
            "quarterly_ebit": [
                {"period": "2025-09-30", "ebit": 10.0},
                {"period": "2025-06-30", "ebit": "N/A"}
            ],
            "magic_formula_score": 14,
            "ey_rank": 6,
            "roc_rank": 8
        });

        let r: StockRecord = serde_json::from_value(v).unwrap();
        assert_eq!(r.market_cap.get(), Some(12e9));
        assert_eq!(r.scores(Variant::Default), VariantScores::ranked(6, 8));
        assert_eq!(r.magic_formula_reason, REASON_NOT_CALCULATED);
        let q = r.quarterly_ebit.known().unwrap();
        assert_eq!(q[1].ebit, Figure::Unavailable);

        let out = serde_json::to_value(&r).unwrap();
        assert_eq!(out["description"], json!("Electrification"));
    }

    #[test]
    fn set_scores_targets_variant_fields() {
        let mut r = StockRecord::empty("HM.B", "H&M", "HM-B.ST", now());
        r.set_scores(Variant::Cap1B, VariantScores::ranked(2, 3));
        assert_eq!(r.magic_formula_score_1b, Figure::Known(5));
        assert_eq!(r.ey_rank_1b, Figure::Known(2));
        assert_eq!(r.roc_rank_1b, Figure::Known(3));
        assert_eq!(r.magic_formula_score, Figure::Unavailable);
    }

    #[test]
    fn parses_naive_and_rfc3339_timestamps() {
        let mut r = StockRecord::empty("X", "X", "X.ST", now());
        assert_eq!(r.last_updated_at(), Some(now()));
        r.last_updated = Some("2026-01-16T18:41:59.602852".to_string());
        assert!(r.last_updated_at().is_some());
        r.last_updated = Some("yesterday".to_string());
        assert_eq!(r.last_updated_at(), None);
    }

    #[test]
    fn categorizes_market_cap() {
        assert_eq!(
            market_cap_category(Figure::Known(2e11)),
            Figure::Known("Large-cap".to_string())
        );
        assert_eq!(
            market_cap_category(Figure::Known(5e8)),
            Figure::Known("Micro-cap".to_string())
        );
        assert_eq!(market_cap_category(Figure::Unavailable), Figure::Unavailable);
    }
}
