use crate::domain::stock::{QuarterlyBalanceSheet, QuarterlyEbit};
use crate::domain::{Figure, StockRecord};
use chrono::{Datelike, NaiveDate};
use std::fmt;

pub const REPORTING_CURRENCY: &str = "SEK";

/// Quarters summed into trailing-twelve-month EBIT.
pub const TTM_QUARTERS: usize = 4;

/// Invested capital below this share of |TTM EBIT| makes RoC meaningless.
pub const MIN_CAPITAL_TO_EBIT: f64 = 0.05;

/// The two formula inputs derived from one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Fundamentals {
    pub ebit_ttm: f64,
    pub enterprise_value: f64,
    pub invested_capital: f64,
    pub earnings_yield: f64,
    pub return_on_capital: f64,
    pub ebit_periods: String,
    pub balance_sheet_period: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    FetchError,
    CurrencyMismatch(String),
    MissingEnterpriseValue,
    InsufficientQuarterlyEbit { available: usize },
    CannotComputeTtm,
    NonPositiveEbit(f64),
    MissingBalanceSheet,
    MissingBalanceSheetField(&'static str),
    NonPositiveInvestedCapital(f64),
    NonPositiveEarningsYield,
    NonPositiveReturnOnCapital,
    UnstableRatio { invested_capital: f64, ebit_ttm: f64 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::FetchError => write!(f, "Error fetching data"),
            SkipReason::CurrencyMismatch(currency) => write!(
                f,
                "Currency is {currency}, only {REPORTING_CURRENCY} stocks are calculated"
            ),
            SkipReason::MissingEnterpriseValue => write!(f, "Missing Enterprise Value"),
            SkipReason::InsufficientQuarterlyEbit { available } => write!(
                f,
                "Insufficient quarterly EBIT history ({available} of {TTM_QUARTERS} quarters)"
            ),
            SkipReason::CannotComputeTtm => write!(f, "Cannot compute TTM EBIT"),
            SkipReason::NonPositiveEbit(ebit) => {
                write!(f, "Negative/zero TTM EBIT (losses): {ebit:.0}")
            }
            SkipReason::MissingBalanceSheet => write!(f, "Missing quarterly balance sheet"),
            SkipReason::MissingBalanceSheetField(field) => {
                write!(f, "Missing {field} in latest quarterly balance sheet")
            }
            SkipReason::NonPositiveInvestedCapital(ic) => {
                write!(f, "Non-positive invested capital: {ic:.0}")
            }
            SkipReason::NonPositiveEarningsYield => write!(f, "Negative/zero Earnings Yield"),
            SkipReason::NonPositiveReturnOnCapital => {
                write!(f, "Negative/zero Return on Capital")
            }
            SkipReason::UnstableRatio {
                invested_capital,
                ebit_ttm,
            } => write!(
                f,
                "Invested capital too small relative to EBIT \
                 (invested capital {invested_capital:.0}, TTM EBIT {ebit_ttm:.0})"
            ),
        }
    }
}

impl std::error::Error for SkipReason {}

/// Derives earnings yield and return on capital, stopping at the first
/// failed gate.
pub fn extract(record: &StockRecord) -> Result<Fundamentals, SkipReason> {
    if record.fetch_error().is_some() {
        return Err(SkipReason::FetchError);
    }

    if let Some(currency) = record.currency.text() {
        if !currency.eq_ignore_ascii_case(REPORTING_CURRENCY) {
            return Err(SkipReason::CurrencyMismatch(currency.to_string()));
        }
    }

    let enterprise_value = record
        .enterprise_value
        .finite_value()
        .ok_or(SkipReason::MissingEnterpriseValue)?;

    let quarters = record.quarterly_ebit.known().map(Vec::as_slice).unwrap_or(&[]);
    if quarters.len() < TTM_QUARTERS {
        return Err(SkipReason::InsufficientQuarterlyEbit {
            available: quarters.len(),
        });
    }
    let quarters = &quarters[..TTM_QUARTERS];
    let ebit_ttm = ttm_ebit(quarters).ok_or(SkipReason::CannotComputeTtm)?;
    if ebit_ttm <= 0.0 {
        return Err(SkipReason::NonPositiveEbit(ebit_ttm));
    }
    let ebit_periods = ebit_periods_label(quarters);

    let latest = record
        .quarterly_balance_sheet
        .known()
        .and_then(|q| q.first())
        .ok_or(SkipReason::MissingBalanceSheet)?;
    let invested_capital = invested_capital(latest)?;
    if invested_capital <= 0.0 {
        return Err(SkipReason::NonPositiveInvestedCapital(invested_capital));
    }

    if enterprise_value <= 0.0 {
        return Err(SkipReason::NonPositiveEarningsYield);
    }
    let earnings_yield = ebit_ttm / enterprise_value;
    let return_on_capital = ebit_ttm / invested_capital;
    if earnings_yield <= 0.0 {
        return Err(SkipReason::NonPositiveEarningsYield);
    }
    if return_on_capital <= 0.0 {
        return Err(SkipReason::NonPositiveReturnOnCapital);
    }

    if invested_capital < MIN_CAPITAL_TO_EBIT * ebit_ttm.abs() {
        return Err(SkipReason::UnstableRatio {
            invested_capital,
            ebit_ttm,
        });
    }

    Ok(Fundamentals {
        ebit_ttm,
        enterprise_value,
        invested_capital,
        earnings_yield,
        return_on_capital,
        ebit_periods,
        balance_sheet_period: latest.period.trim().to_string(),
    })
}

fn ttm_ebit(quarters: &[QuarterlyEbit]) -> Option<f64> {
    let mut sum = 0.0;
    for q in quarters {
        sum += q.ebit.finite_value()?;
    }
    sum.is_finite().then_some(sum)
}

/// Total assets - cash - current liabilities + short-term debt, all taken
/// from the same (latest) quarter.
fn invested_capital(sheet: &QuarterlyBalanceSheet) -> Result<f64, SkipReason> {
    let field = |value: &Figure<f64>, name: &'static str| {
        value
            .finite_value()
            .ok_or(SkipReason::MissingBalanceSheetField(name))
    };

    let total_assets = field(&sheet.total_assets, "total assets")?;
    let current_liabilities = field(&sheet.current_liabilities, "current liabilities")?;
    let cash = field(&sheet.cash, "cash")?;
    let short_term_debt = field(&sheet.short_term_debt, "short-term debt")?;

    Ok(total_assets - cash - current_liabilities + short_term_debt)
}

/// "2024-Q4 to 2025-Q3" for dated periods, otherwise the raw periods joined.
/// `quarters` is ordered most recent first.
fn ebit_periods_label(quarters: &[QuarterlyEbit]) -> String {
    let newest = quarters.first().and_then(|q| quarter_label(&q.period));
    let oldest = quarters.last().and_then(|q| quarter_label(&q.period));
    match (oldest, newest) {
        (Some(from), Some(to)) => format!("{from} to {to}"),
        _ => quarters
            .iter()
            .map(|q| q.period.trim())
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn quarter_label(period: &str) -> Option<String> {
    let date = NaiveDate::parse_from_str(period.trim().get(..10)?, "%Y-%m-%d").ok()?;
    Some(format!("{}-Q{}", date.year(), date.month0() / 3 + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn quarter(period: &str, ebit: f64) -> QuarterlyEbit {
        QuarterlyEbit {
            period: period.to_string(),
            ebit: Figure::Known(ebit),
        }
    }

    fn sheet(
        total_assets: f64,
        cash: f64,
        current_liabilities: f64,
        short_term_debt: f64,
    ) -> QuarterlyBalanceSheet {
        QuarterlyBalanceSheet {
            period: "2025-09-30".to_string(),
            total_assets: Figure::Known(total_assets),
            current_liabilities: Figure::Known(current_liabilities),
            cash: Figure::Known(cash),
            short_term_debt: Figure::Known(short_term_debt),
            ..QuarterlyBalanceSheet::default()
        }
    }

    /// TTM = 400, EV = 4000, IC = 750.
    fn scenario_record() -> StockRecord {
        let now = Utc.with_ymd_and_hms(2026, 1, 27, 10, 0, 0).unwrap();
        let mut r = StockRecord::empty("ACME", "Acme AB", "ACME.ST", now);
        r.enterprise_value = Figure::Known(4000.0);
        r.quarterly_ebit = Figure::Known(vec![
            quarter("2025-09-30", 100.0),
            quarter("2025-06-30", 100.0),
            quarter("2025-03-31", 100.0),
            quarter("2024-12-31", 100.0),
        ]);
        r.quarterly_balance_sheet = Figure::Known(vec![sheet(1000.0, 100.0, 200.0, 50.0)]);
        r
    }

    #[test]
    fn computes_ttm_yield_and_return_on_capital() {
        let f = extract(&scenario_record()).unwrap();
        assert_eq!(f.ebit_ttm, 400.0);
        assert_eq!(f.invested_capital, 750.0);
        assert!((f.earnings_yield - 0.10).abs() < 1e-12);
        assert!((f.return_on_capital - 400.0 / 750.0).abs() < 1e-12);
        assert_eq!(f.ebit_periods, "2024-Q4 to 2025-Q3");
        assert_eq!(f.balance_sheet_period, "2025-09-30");
    }

    #[test]
    fn three_quarters_is_not_enough() {
        let mut r = scenario_record();
        if let Figure::Known(q) = &mut r.quarterly_ebit {
            q.pop();
        }
        assert_eq!(
            extract(&r),
            Err(SkipReason::InsufficientQuarterlyEbit { available: 3 })
        );
    }

    #[test]
    fn only_the_four_most_recent_quarters_count() {
        let mut r = scenario_record();
        if let Figure::Known(q) = &mut r.quarterly_ebit {
            q.push(quarter("2024-09-30", -10_000.0));
        }
        assert_eq!(extract(&r).unwrap().ebit_ttm, 400.0);
    }

    #[test]
    fn gates_run_in_order() {
        let mut r = scenario_record();
        r.error = Some("timeout".to_string());
        r.currency = Figure::Known("USD".to_string());
        assert_eq!(extract(&r), Err(SkipReason::FetchError));

        r.error = None;
        assert_eq!(
            extract(&r),
            Err(SkipReason::CurrencyMismatch("USD".to_string()))
        );

        r.currency = Figure::Unavailable;
        r.enterprise_value = Figure::Unavailable;
        assert_eq!(extract(&r), Err(SkipReason::MissingEnterpriseValue));
    }

    #[test]
    fn unknown_currency_is_accepted() {
        let mut r = scenario_record();
        r.currency = Figure::Unavailable;
        assert!(extract(&r).is_ok());
    }

    #[test]
    fn missing_quarter_value_blocks_ttm() {
        let mut r = scenario_record();
        if let Figure::Known(q) = &mut r.quarterly_ebit {
            q[2].ebit = Figure::Unavailable;
        }
        assert_eq!(extract(&r), Err(SkipReason::CannotComputeTtm));
    }

    #[test]
    fn losses_are_reported_as_ebit_problem() {
        let mut r = scenario_record();
        if let Figure::Known(q) = &mut r.quarterly_ebit {
            q[0].ebit = Figure::Known(-500.0);
        }
        assert_eq!(extract(&r), Err(SkipReason::NonPositiveEbit(-200.0)));
    }

    #[test]
    fn balance_sheet_fields_have_no_fallback() {
        let mut r = scenario_record();
        r.quarterly_balance_sheet = Figure::Known(vec![]);
        assert_eq!(extract(&r), Err(SkipReason::MissingBalanceSheet));

        let mut incomplete = sheet(1000.0, 100.0, 200.0, 50.0);
        incomplete.short_term_debt = Figure::Unavailable;
        incomplete.net_fixed_assets = Figure::Known(900.0);
        r.quarterly_balance_sheet =
            Figure::Known(vec![incomplete, sheet(1000.0, 100.0, 200.0, 50.0)]);
        assert_eq!(
            extract(&r),
            Err(SkipReason::MissingBalanceSheetField("short-term debt"))
        );
    }

    #[test]
    fn non_positive_invested_capital_is_skipped() {
        let mut r = scenario_record();
        r.quarterly_balance_sheet = Figure::Known(vec![sheet(100.0, 100.0, 200.0, 0.0)]);
        assert_eq!(
            extract(&r),
            Err(SkipReason::NonPositiveInvestedCapital(-200.0))
        );
    }

    #[test]
    fn negative_enterprise_value_gives_negative_yield() {
        let mut r = scenario_record();
        r.enterprise_value = Figure::Known(-50.0);
        assert_eq!(extract(&r), Err(SkipReason::NonPositiveEarningsYield));
    }

    #[test]
    fn tiny_capital_base_is_rejected_with_magnitudes() {
        let mut r = scenario_record();
        // IC = 15 < 5% of 400 = 20
        r.quarterly_balance_sheet = Figure::Known(vec![sheet(315.0, 100.0, 200.0, 0.0)]);
        let err = extract(&r).unwrap_err();
        assert_eq!(
            err,
            SkipReason::UnstableRatio {
                invested_capital: 15.0,
                ebit_ttm: 400.0
            }
        );
        let reason = err.to_string();
        assert!(reason.contains("15"));
        assert!(reason.contains("400"));
    }

    #[test]
    fn undated_periods_are_joined() {
        let quarters = vec![
            quarter("FY25 Q3", 1.0),
            quarter("FY25 Q2", 1.0),
            quarter("FY25 Q1", 1.0),
            quarter("FY24 Q4", 1.0),
        ];
        assert_eq!(
            ebit_periods_label(&quarters),
            "FY25 Q3, FY25 Q2, FY25 Q1, FY24 Q4"
        );
    }
}
