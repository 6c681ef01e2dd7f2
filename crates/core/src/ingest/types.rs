use crate::domain::stock::{QuarterlyBalanceSheet, QuarterlyEbit};
use serde::{Deserialize, Serialize};

/// Raw per-ticker payload from the market-data provider. Every value may be
/// missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FundamentalsResponse {
    pub ticker: String,
    pub name: Option<String>,
    pub currency: Option<String>,

    pub price: Option<f64>,
    pub previous_close: Option<f64>,
    pub market_cap: Option<f64>,
    pub volume: Option<f64>,

    pub sector: Option<String>,
    pub industry: Option<String>,
    pub country: Option<String>,
    pub market: Option<String>,
    pub description: Option<String>,

    pub pe_ratio: Option<f64>,
    /// Either a decimal (0.0255) or a percentage (2.55).
    pub dividend_yield: Option<f64>,

    pub enterprise_value: Option<f64>,
    pub ebit: Option<f64>,
    pub ebit_period: Option<String>,
    pub quarterly_ebit: Vec<QuarterlyEbit>,

    pub total_assets: Option<f64>,
    pub current_assets: Option<f64>,
    pub current_liabilities: Option<f64>,
    pub net_fixed_assets: Option<f64>,
    pub balance_sheet_period: Option<String>,
    pub quarterly_balance_sheet: Vec<QuarterlyBalanceSheet>,
}
