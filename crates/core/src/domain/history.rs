use crate::domain::figure::Figure;
use crate::domain::stock::{QuarterlyBalanceSheet, QuarterlyEbit, StockRecord, VariantScores};
use crate::domain::variant::Variant;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ticker -> "YYYY-MM-DD" -> entry.
pub type History = BTreeMap<String, BTreeMap<String, HistoryEntry>>;

/// Frozen copy of the scoring-relevant part of a record for one day.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub price: Figure<f64>,
    #[serde(default)]
    pub market_cap: Figure<f64>,
    #[serde(default)]
    pub ebit: Figure<f64>,
    #[serde(default)]
    pub ebit_period: Figure<String>,
    #[serde(default)]
    pub quarterly_ebit: Figure<Vec<QuarterlyEbit>>,
    #[serde(default)]
    pub enterprise_value: Figure<f64>,
    #[serde(default)]
    pub total_assets: Figure<f64>,
    #[serde(default)]
    pub current_liabilities: Figure<f64>,
    #[serde(default)]
    pub current_assets: Figure<f64>,
    #[serde(default)]
    pub net_fixed_assets: Figure<f64>,
    #[serde(default)]
    pub balance_sheet_period: Figure<String>,
    #[serde(default)]
    pub quarterly_balance_sheet: Figure<Vec<QuarterlyBalanceSheet>>,

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

    #[serde(default)]
    pub earnings_yield: Figure<f64>,
    #[serde(default)]
    pub return_on_capital: Figure<f64>,
    #[serde(default)]
    pub magic_formula_ebit_periods: Figure<String>,
    #[serde(default)]
    pub magic_formula_balance_sheet_period: Figure<String>,
    #[serde(default)]
    pub magic_formula_uses_ttm: Option<bool>,

    #[serde(default)]
    pub sector: Figure<String>,
    #[serde(default)]
    pub industry: Figure<String>,
    #[serde(default)]
    pub exclusion_reason: Option<String>,
}

impl HistoryEntry {
    pub fn from_record(record: &StockRecord, date: NaiveDate) -> Self {
        let mut entry = Self {
            date: date.format("%Y-%m-%d").to_string(),
            price: record.price,
            market_cap: record.market_cap,
            ebit: record.ebit,
            ebit_period: record.ebit_period.clone(),
            quarterly_ebit: record.quarterly_ebit.clone(),
            enterprise_value: record.enterprise_value,
            total_assets: record.total_assets,
            current_liabilities: record.current_liabilities,
            current_assets: record.current_assets,
            net_fixed_assets: record.net_fixed_assets,
            balance_sheet_period: record.balance_sheet_period.clone(),
            quarterly_balance_sheet: record.quarterly_balance_sheet.clone(),
            earnings_yield: record.earnings_yield,
            return_on_capital: record.return_on_capital,
            magic_formula_ebit_periods: record.magic_formula_ebit_periods.clone(),
            magic_formula_balance_sheet_period: record.magic_formula_balance_sheet_period.clone(),
            magic_formula_uses_ttm: record.magic_formula_uses_ttm,
            sector: record.sector.clone(),
            industry: record.industry.clone(),
            exclusion_reason: record.exclusion_reason.clone(),
            ..Self::default()
        };
        for variant in Variant::ALL {
            entry.set_scores(variant, record.scores(variant));
        }
        entry
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

    fn set_scores(&mut self, variant: Variant, scores: VariantScores) {
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
}

/// Writes `date`'s entry for every record with a default score.
///
/// Other days are left alone; a second run on the same day replaces that
/// day's entry. Returns the number of entries written.
pub fn record_scored_snapshots<'a, I>(history: &mut History, records: I, date: NaiveDate) -> usize
where
    I: IntoIterator<Item = &'a StockRecord>,
{
    let key = date.format("%Y-%m-%d").to_string();
    let mut written = 0;
    for record in records {
        if !record.magic_formula_score.is_known() {
            continue;
        }
        history
            .entry(record.ticker.clone())
            .or_default()
            .insert(key.clone(), HistoryEntry::from_record(record, date));
        written += 1;
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(ticker: &str, score: Option<(u32, u32)>) -> StockRecord {
        let now = Utc.with_ymd_and_hms(2026, 2, 3, 9, 0, 0).unwrap();
        let mut r = StockRecord::empty(ticker, ticker, ticker, now);
        if let Some((ey, roc)) = score {
            r.set_scores(Variant::Default, VariantScores::ranked(ey, roc));
            r.set_scores(Variant::Cap500M, VariantScores::ranked(ey, roc));
        }
        r
    }

    #[test]
    fn only_scored_records_enter_history() {
        let mut history = History::new();
        let day = NaiveDate::from_ymd_opt(2026, 2, 3).unwrap();
        let records = [record("A", Some((1, 2))), record("B", None)];

        let written = record_scored_snapshots(&mut history, records.iter(), day);

        assert_eq!(written, 1);
        assert!(history.contains_key("A"));
        assert!(!history.contains_key("B"));
        let entry = &history["A"]["2026-02-03"];
        assert_eq!(entry.magic_formula_score, Figure::Known(3));
        assert_eq!(entry.scores(Variant::Cap500M), VariantScores::ranked(1, 2));
    }

    #[test]
    fn earlier_days_are_never_touched() {
        let mut history = History::new();
        let d1 = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2026, 2, 3).unwrap();

        record_scored_snapshots(&mut history, [record("A", Some((1, 1)))].iter(), d1);
        record_scored_snapshots(&mut history, [record("A", Some((4, 5)))].iter(), d2);
        record_scored_snapshots(&mut history, [record("A", Some((2, 2)))].iter(), d2);

        let days = &history["A"];
        assert_eq!(days.len(), 2);
        assert_eq!(days["2026-02-02"].magic_formula_score, Figure::Known(2));
        assert_eq!(days["2026-02-03"].magic_formula_score, Figure::Known(4));
    }
}
