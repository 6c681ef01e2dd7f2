use crate::domain::stock::{REASON_CALCULATED, REASON_NOT_CALCULATED};
use crate::domain::{Figure, StockRecord, Variant, VariantScores};
use crate::scoring::eligibility::{self, Exclusion};
use crate::scoring::extract::{self, Fundamentals, SkipReason};
use crate::scoring::rank::{self, Candidate};
use anyhow::ensure;
use std::collections::BTreeMap;

/// Ticker-keyed current store.
pub type Records = BTreeMap<String, StockRecord>;

/// Score keys from older store layouts that no variant writes any more.
const RETIRED_SCORE_KEYS: [&str; 1] = ["magic_formula_score_all"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantSummary {
    pub variant: Variant,
    /// Records passing the exclusion rules and the market-cap floor.
    pub eligible: usize,
    /// Eligible records that also produced usable fundamentals.
    pub ranked: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringSummary {
    pub records: usize,
    pub variants: Vec<VariantSummary>,
    /// Score/rank combinations cleared by the consistency sweep.
    pub repaired: usize,
}

/// Per-variant result: ticker -> scores for every ranked record.
#[derive(Debug, Clone, PartialEq)]
struct VariantPatch {
    variant: Variant,
    eligible: usize,
    scores: BTreeMap<String, VariantScores>,
}

/// Default-pool narrative written onto each record.
#[derive(Debug, Clone, PartialEq)]
struct Narrative {
    reason: String,
    earnings_yield: Figure<f64>,
    return_on_capital: Figure<f64>,
    ebit_periods: Figure<String>,
    balance_sheet_period: Figure<String>,
    uses_ttm: Option<bool>,
}

impl Narrative {
    fn unscored(reason: String) -> Self {
        Self {
            reason,
            earnings_yield: Figure::Unavailable,
            return_on_capital: Figure::Unavailable,
            ebit_periods: Figure::Unavailable,
            balance_sheet_period: Figure::Unavailable,
            uses_ttm: None,
        }
    }

    fn ranked(f: &Fundamentals) -> Self {
        Self {
            reason: REASON_CALCULATED.to_string(),
            earnings_yield: Figure::finite(f.earnings_yield * 100.0),
            return_on_capital: Figure::finite(f.return_on_capital * 100.0),
            ebit_periods: Figure::Known(f.ebit_periods.clone()),
            balance_sheet_period: Figure::Known(f.balance_sheet_period.clone()),
            uses_ttm: Some(true),
        }
    }
}

/// Read-only view of one record for the duration of a scoring call.
struct Evaluation<'a> {
    record: &'a StockRecord,
    exclusion: Option<Exclusion>,
    fundamentals: Result<Fundamentals, SkipReason>,
}

/// Scores every record under every variant and writes the results back.
///
/// Per-record data problems never fail the call; they end up as a sentinel
/// score plus `magic_formula_reason`. Only a malformed batch is an error.
/// Re-running on unchanged input reproduces identical fields.
pub fn score_all(records: &mut Records) -> anyhow::Result<ScoringSummary> {
    validate_batch(records)?;

    let (patches, narratives) = {
        let evaluations: Vec<Evaluation<'_>> = records
            .values()
            .map(|record| Evaluation {
                record,
                exclusion: eligibility::classify(record),
                fundamentals: extract::extract(record),
            })
            .collect();

        let patches: Vec<VariantPatch> = Variant::ALL
            .into_iter()
            .map(|variant| plan_variant(variant, &evaluations))
            .collect();
        // Variant::ALL starts with the default pool.
        let narratives = plan_narratives(&evaluations, &patches[0]);
        (patches, narratives)
    };

    apply(records, &patches, narratives);
    let repaired = enforce_consistency(records);

    let variants = patches
        .iter()
        .map(|p| VariantSummary {
            variant: p.variant,
            eligible: p.eligible,
            ranked: p.scores.len(),
        })
        .collect();

    Ok(ScoringSummary {
        records: records.len(),
        variants,
        repaired,
    })
}

fn validate_batch(records: &Records) -> anyhow::Result<()> {
    for (key, record) in records {
        ensure!(!key.trim().is_empty(), "record with empty ticker key");
        ensure!(
            key == &record.ticker,
            "record key {key} does not match ticker {}",
            record.ticker
        );
    }
    Ok(())
}

fn plan_variant(variant: Variant, evaluations: &[Evaluation<'_>]) -> VariantPatch {
    let eligible: Vec<&Evaluation<'_>> = evaluations
        .iter()
        .filter(|e| e.exclusion.is_none())
        .filter(|e| match variant.market_cap_floor() {
            Some(floor) => eligibility::meets_market_cap_threshold(e.record, floor),
            None => true,
        })
        .collect();

    let pool: Vec<Candidate> = eligible
        .iter()
        .filter_map(|e| {
            let f = e.fundamentals.as_ref().ok()?;
            Some(Candidate {
                ticker: e.record.ticker.clone(),
                earnings_yield: f.earnings_yield,
                return_on_capital: f.return_on_capital,
            })
        })
        .collect();

    let scores = rank::rank(&pool);

    tracing::info!(
        variant = variant.label(),
        eligible = eligible.len(),
        ranked = scores.len(),
        "magic formula variant ranked"
    );

    VariantPatch {
        variant,
        eligible: eligible.len(),
        scores,
    }
}

fn plan_narratives(
    evaluations: &[Evaluation<'_>],
    default_patch: &VariantPatch,
) -> BTreeMap<String, Narrative> {
    evaluations
        .iter()
        .map(|e| {
            let ticker = e.record.ticker.clone();
            let narrative = match (&e.exclusion, &e.fundamentals) {
                (Some(exclusion), _) => Narrative::unscored(exclusion.to_string()),
                (None, Err(skip)) => {
                    tracing::debug!(ticker = %ticker, reason = %skip, "magic formula skipped");
                    Narrative::unscored(skip.to_string())
                }
                (None, Ok(f)) if default_patch.scores.contains_key(&ticker) => {
                    Narrative::ranked(f)
                }
                (None, Ok(_)) => Narrative::unscored(REASON_NOT_CALCULATED.to_string()),
            };
            (ticker, narrative)
        })
        .collect()
}

fn apply(
    records: &mut Records,
    patches: &[VariantPatch],
    mut narratives: BTreeMap<String, Narrative>,
) {
    for (ticker, record) in records.iter_mut() {
        for patch in patches {
            let scores = patch.scores.get(ticker).copied().unwrap_or_default();
            record.set_scores(patch.variant, scores);
        }
        for key in RETIRED_SCORE_KEYS {
            record.extra.remove(key);
        }

        let narrative = narratives
            .remove(ticker)
            .unwrap_or_else(|| Narrative::unscored(REASON_NOT_CALCULATED.to_string()));
        record.magic_formula_reason = narrative.reason;
        record.earnings_yield = narrative.earnings_yield;
        record.return_on_capital = narrative.return_on_capital;
        record.magic_formula_ebit_periods = narrative.ebit_periods;
        record.magic_formula_balance_sheet_period = narrative.balance_sheet_period;
        record.magic_formula_uses_ttm = narrative.uses_ttm;
    }
}

/// Clears any variant whose score and ranks disagree on availability.
/// Returns the number of variant slots cleared.
pub fn enforce_consistency(records: &mut Records) -> usize {
    let mut repaired = 0;
    for record in records.values_mut() {
        for variant in Variant::ALL {
            let scores = record.scores(variant);
            if scores.is_consistent() {
                continue;
            }
            tracing::warn!(
                ticker = %record.ticker,
                variant = variant.label(),
                "inconsistent score/rank fields; clearing"
            );
            record.set_scores(variant, VariantScores::default());
            repaired += 1;
        }
    }
    repaired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stock::{QuarterlyBalanceSheet, QuarterlyEbit};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    /// Eligible record with TTM EBIT = 4 * `quarter_ebit`, the given EV and
    /// invested capital 750.
    fn stock(ticker: &str, quarter_ebit: f64, ev: f64, market_cap: f64) -> StockRecord {
        let now = Utc.with_ymd_and_hms(2026, 1, 27, 10, 0, 0).unwrap();
        let mut r = StockRecord::empty(ticker, &format!("{ticker} Industri AB"), ticker, now);
        r.sector = Figure::Known("Industrials".to_string());
        r.industry = Figure::Known("Machinery".to_string());
        r.market_cap = Figure::Known(market_cap);
        r.enterprise_value = Figure::Known(ev);
        r.quarterly_ebit = Figure::Known(
            ["2025-09-30", "2025-06-30", "2025-03-31", "2024-12-31"]
                .iter()
                .map(|p| QuarterlyEbit {
                    period: p.to_string(),
                    ebit: Figure::Known(quarter_ebit),
                })
                .collect(),
        );
        r.quarterly_balance_sheet = Figure::Known(vec![QuarterlyBalanceSheet {
            period: "2025-09-30".to_string(),
            total_assets: Figure::Known(1000.0),
            current_liabilities: Figure::Known(200.0),
            cash: Figure::Known(100.0),
            short_term_debt: Figure::Known(50.0),
            ..QuarterlyBalanceSheet::default()
        }]);
        r
    }

    fn batch(records: Vec<StockRecord>) -> Records {
        records.into_iter().map(|r| (r.ticker.clone(), r)).collect()
    }

    fn sample() -> Records {
        let mut bank = stock("XYZ", 500.0, 1000.0, 9e10);
        bank.name = "XYZ Bank AB".to_string();

        let mut flagged = stock("FLAG", 500.0, 1000.0, 9e10);
        flagged.default_excluded = true;

        let mut usd = stock("USDX", 100.0, 4000.0, 9e10);
        usd.currency = Figure::Known("USD".to_string());

        let mut errored = stock("ERR", 100.0, 4000.0, 9e10);
        errored.error = Some("HTTP 404".to_string());

        let mut no_cap = stock("NOCAP", 100.0, 2000.0, 0.0);
        no_cap.market_cap = Figure::Unavailable;

        batch(vec![
            stock("ACME", 100.0, 4000.0, 6e9),
            stock("BETA", 80.0, 2000.0, 2e9),
            stock("GAMA", 120.0, 8000.0, 4.9e8),
            stock("DELT", 50.0, 1000.0, 1.5e8),
            bank,
            flagged,
            usd,
            errored,
            no_cap,
        ])
    }

    #[test]
    fn scenario_record_is_scored_with_percentages() {
        let mut records = batch(vec![stock("ACME", 100.0, 4000.0, 6e9)]);
        score_all(&mut records).unwrap();

        let r = &records["ACME"];
        assert_eq!(r.scores(Variant::Default), VariantScores::ranked(1, 1));
        assert_eq!(r.magic_formula_reason, REASON_CALCULATED);
        assert_eq!(r.magic_formula_uses_ttm, Some(true));
        assert_eq!(
            r.magic_formula_ebit_periods,
            Figure::Known("2024-Q4 to 2025-Q3".to_string())
        );
        assert_eq!(
            r.magic_formula_balance_sheet_period,
            Figure::Known("2025-09-30".to_string())
        );
        assert!((r.earnings_yield.get().unwrap() - 10.0).abs() < 1e-9);
        assert!((r.return_on_capital.get().unwrap() - 53.333_333).abs() < 1e-3);
    }

    #[test]
    fn score_is_known_iff_both_ranks_are_known() {
        let mut records = sample();
        let summary = score_all(&mut records).unwrap();
        assert_eq!(summary.repaired, 0);

        for r in records.values() {
            for v in Variant::ALL {
                assert!(r.scores(v).is_consistent(), "{} {:?}", r.ticker, v);
            }
        }
    }

    #[test]
    fn ranks_form_a_permutation_per_variant() {
        let mut records = sample();
        let summary = score_all(&mut records).unwrap();

        for vs in &summary.variants {
            let expected: BTreeSet<u32> = (1..=vs.ranked as u32).collect();
            let ey: BTreeSet<u32> = records
                .values()
                .filter_map(|r| r.scores(vs.variant).ey_rank.get())
                .collect();
            let roc: BTreeSet<u32> = records
                .values()
                .filter_map(|r| r.scores(vs.variant).roc_rank.get())
                .collect();
            assert_eq!(ey, expected, "{:?}", vs.variant);
            assert_eq!(roc, expected, "{:?}", vs.variant);
        }
    }

    #[test]
    fn variant_pools_follow_market_cap_floors() {
        let mut records = sample();
        let summary = score_all(&mut records).unwrap();

        let ranked: Vec<(Variant, usize)> =
            summary.variants.iter().map(|v| (v.variant, v.ranked)).collect();
        assert_eq!(
            ranked,
            vec![
                (Variant::Default, 5),
                (Variant::Cap100M, 4),
                (Variant::Cap500M, 2),
                (Variant::Cap1B, 2),
                (Variant::Cap5B, 1),
            ]
        );

        let gama = &records["GAMA"];
        assert!(gama.scores(Variant::Cap100M).score.is_known());
        assert!(!gama.scores(Variant::Cap500M).score.is_known());

        let no_cap = &records["NOCAP"];
        assert!(no_cap.scores(Variant::Default).score.is_known());
        assert!(!no_cap.scores(Variant::Cap100M).score.is_known());
    }

    #[test]
    fn excluded_records_never_score() {
        let mut records = sample();
        score_all(&mut records).unwrap();

        for ticker in ["XYZ", "FLAG"] {
            let r = &records[ticker];
            for v in Variant::ALL {
                assert_eq!(r.scores(v), VariantScores::default(), "{ticker} {v:?}");
            }
        }
        assert_eq!(records["XYZ"].magic_formula_reason, "Excluded: bank");
        assert_eq!(records["FLAG"].magic_formula_reason, "Excluded by default");
        assert_eq!(records["XYZ"].earnings_yield, Figure::Unavailable);
    }

    #[test]
    fn skipped_records_carry_their_reason() {
        let mut records = sample();
        score_all(&mut records).unwrap();

        assert_eq!(records["ERR"].magic_formula_reason, "Error fetching data");
        assert_eq!(
            records["USDX"].magic_formula_reason,
            "Currency is USD, only SEK stocks are calculated"
        );
        assert_eq!(records["USDX"].magic_formula_uses_ttm, None);
        assert_eq!(records["USDX"].magic_formula_ebit_periods, Figure::Unavailable);
    }

    #[test]
    fn rescoring_is_idempotent() {
        let mut records = sample();
        score_all(&mut records).unwrap();
        let first = serde_json::to_string(&records).unwrap();

        score_all(&mut records).unwrap();
        let second = serde_json::to_string(&records).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn stale_scores_are_cleared_when_a_record_drops_out() {
        let mut records = sample();
        score_all(&mut records).unwrap();
        assert!(records["ACME"].magic_formula_score_5b.is_known());

        records.get_mut("ACME").unwrap().market_cap = Figure::Known(1e9);
        score_all(&mut records).unwrap();
        assert_eq!(records["ACME"].magic_formula_score_5b, Figure::Unavailable);
        assert_eq!(records["ACME"].ey_rank_5b, Figure::Unavailable);
    }

    #[test]
    fn retired_all_score_is_dropped_on_rescore() {
        let mut records = sample();
        let acme = records.get_mut("ACME").unwrap();
        acme.extra
            .insert("magic_formula_score_all".to_string(), serde_json::json!(17));
        acme.extra
            .insert("sector".to_string(), serde_json::json!("Industrials"));

        score_all(&mut records).unwrap();

        assert!(!records["ACME"].extra.contains_key("magic_formula_score_all"));
        assert_eq!(
            records["ACME"].extra["sector"],
            serde_json::json!("Industrials")
        );
    }

    #[test]
    fn more_ebit_never_worsens_rank() {
        let mut records = sample();
        score_all(&mut records).unwrap();
        let before = records["DELT"].scores(Variant::Default);

        let r = records.get_mut("DELT").unwrap();
        if let Figure::Known(q) = &mut r.quarterly_ebit {
            for quarter in q.iter_mut() {
                quarter.ebit = Figure::Known(60.0);
            }
        }
        score_all(&mut records).unwrap();
        let after = records["DELT"].scores(Variant::Default);

        assert!(after.ey_rank.get().unwrap() <= before.ey_rank.get().unwrap());
        assert!(after.roc_rank.get().unwrap() <= before.roc_rank.get().unwrap());
    }

    #[test]
    fn mismatched_key_is_a_structural_error() {
        let mut records = Records::new();
        records.insert("ACME".to_string(), stock("OTHER", 100.0, 4000.0, 6e9));
        assert!(score_all(&mut records).is_err());
    }

    #[test]
    fn consistency_sweep_clears_partial_ranks() {
        let mut records = batch(vec![stock("ACME", 100.0, 4000.0, 6e9)]);
        let r = records.get_mut("ACME").unwrap();
        r.magic_formula_score_1b = Figure::Known(4);
        r.ey_rank_1b = Figure::Known(2);

        assert_eq!(enforce_consistency(&mut records), 1);
        assert_eq!(records["ACME"].scores(Variant::Cap1B), VariantScores::default());
    }
}
