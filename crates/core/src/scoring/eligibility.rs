use crate::domain::StockRecord;
use std::fmt;

const BANK_KEYWORDS: [&str; 3] = ["bank", "banking", "banker"];

// Lower-case name fragments of listed banks and bank-like lenders.
const KNOWN_BANK_NAMES: [&str; 10] = [
    "nordea",
    "handelsbanken",
    "swedbank",
    "skandinaviska enskilda",
    "avanza",
    "nordnet",
    "resurs holding",
    "collector",
    "hoist finance",
    "norion",
];

// Base tickers (share class stripped).
const KNOWN_BANK_TICKERS: [&str; 11] = [
    "NDA", "SEB", "SHB", "SWED", "AZA", "SAVE", "RESURS", "COLL", "HOFI", "TFBANK", "NORION",
];

const INVESTMENT_KEYWORDS: [&str; 4] = ["investment", "investor", "holding", "equity"];

const KNOWN_HOLDING_NAMES: [&str; 10] = [
    "industrivärden",
    "kinnevik",
    "lundbergföretagen",
    "latour",
    "svolder",
    "creades",
    "öresund",
    "ratos",
    "vnv global",
    "spiltan",
];

const KNOWN_HOLDING_TICKERS: [&str; 12] = [
    "INVE", "INDU", "KINV", "LUND", "LATO", "SVOL", "BURE", "CRED", "ORES", "RATO", "VNV", "SPIL",
];

/// Classification of an explicit exclusion flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlaggedAs {
    FinancialOrInvestment,
    RealEstate,
    Other(Option<String>),
}

/// Why a record is kept out of every ranking pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclusion {
    Flagged(FlaggedAs),
    Financial,
    RealEstate,
    Bank,
    InvestmentCompany,
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exclusion::Flagged(FlaggedAs::FinancialOrInvestment) => {
                write!(f, "Excluded: financial/investment company")
            }
            Exclusion::Flagged(FlaggedAs::RealEstate) | Exclusion::RealEstate => {
                write!(f, "Excluded: real-estate company")
            }
            Exclusion::Flagged(FlaggedAs::Other(Some(text))) => write!(f, "Excluded: {text}"),
            Exclusion::Flagged(FlaggedAs::Other(None)) => write!(f, "Excluded by default"),
            Exclusion::Financial => write!(f, "Excluded: financial company"),
            Exclusion::Bank => write!(f, "Excluded: bank"),
            Exclusion::InvestmentCompany => write!(f, "Excluded: investment company"),
        }
    }
}

/// First matching exclusion rule, `None` when the record may be ranked.
pub fn classify(record: &StockRecord) -> Option<Exclusion> {
    let flag_text = record
        .exclusion_reason
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if record.default_excluded || flag_text.is_some() {
        return Some(Exclusion::Flagged(classify_flag(flag_text)));
    }

    let sector = lower(record.sector.text());
    let industry = lower(record.industry.text());
    let name = record.name.trim().to_lowercase();
    let ticker = base_ticker(&record.ticker);

    if sector.contains("financial") || industry.contains("financial") {
        return Some(Exclusion::Financial);
    }

    if sector.contains("real estate") || industry.contains("real estate") {
        return Some(Exclusion::RealEstate);
    }

    let bank_keyword = BANK_KEYWORDS
        .iter()
        .any(|k| sector.contains(k) || industry.contains(k) || name.contains(k));
    if bank_keyword
        || KNOWN_BANK_NAMES.iter().any(|n| name.contains(n))
        || KNOWN_BANK_TICKERS.contains(&ticker.as_str())
    {
        return Some(Exclusion::Bank);
    }

    if INVESTMENT_KEYWORDS.iter().any(|k| name.contains(k))
        || KNOWN_HOLDING_NAMES.iter().any(|n| name.contains(n))
        || KNOWN_HOLDING_TICKERS.contains(&ticker.as_str())
    {
        return Some(Exclusion::InvestmentCompany);
    }

    if industry.contains("investment") || industry.contains("asset management") {
        return Some(Exclusion::InvestmentCompany);
    }

    None
}

pub fn is_excluded(record: &StockRecord) -> bool {
    classify(record).is_some()
}

/// Missing or non-numeric market cap never meets a floor.
pub fn meets_market_cap_threshold(record: &StockRecord, min_market_cap: f64) -> bool {
    record
        .market_cap
        .finite_value()
        .is_some_and(|cap| cap >= min_market_cap)
}

fn classify_flag(text: Option<&str>) -> FlaggedAs {
    let Some(text) = text else {
        return FlaggedAs::Other(None);
    };

    let lower = text.to_lowercase();
    if lower.contains("real estate") {
        FlaggedAs::RealEstate
    } else if lower.contains("financial") || lower.contains("investment") {
        FlaggedAs::FinancialOrInvestment
    } else {
        FlaggedAs::Other(Some(text.to_string()))
    }
}

fn lower(s: Option<&str>) -> String {
    s.unwrap_or_default().to_lowercase()
}

/// "SEB.A" / "SEB-A" / "seb a" -> "SEB".
fn base_ticker(ticker: &str) -> String {
    ticker
        .trim()
        .split(['.', '-', ' '])
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase()
}
