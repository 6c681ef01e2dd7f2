use serde::{Deserialize, Serialize};

/// One of the parallel scoring runs. Every market-cap variant applies the
/// default exclusion rules plus its floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Default,
    #[serde(rename = "100m")]
    Cap100M,
    #[serde(rename = "500m")]
    Cap500M,
    #[serde(rename = "1b")]
    Cap1B,
    #[serde(rename = "5b")]
    Cap5B,
}

impl Variant {
    pub const ALL: [Variant; 5] = [
        Variant::Default,
        Variant::Cap100M,
        Variant::Cap500M,
        Variant::Cap1B,
        Variant::Cap5B,
    ];

    /// Suffix appended to the `magic_formula_score`, `ey_rank` and `roc_rank`
    /// field names.
    pub fn suffix(self) -> &'static str {
        match self {
            Variant::Default => "",
            Variant::Cap100M => "_100m",
            Variant::Cap500M => "_500m",
            Variant::Cap1B => "_1b",
            Variant::Cap5B => "_5b",
        }
    }

    /// Minimum market cap in SEK, `None` for the default pool.
    pub fn market_cap_floor(self) -> Option<f64> {
        match self {
            Variant::Default => None,
            Variant::Cap100M => Some(100_000_000.0),
            Variant::Cap500M => Some(500_000_000.0),
            Variant::Cap1B => Some(1_000_000_000.0),
            Variant::Cap5B => Some(5_000_000_000.0),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Variant::Default => "default",
            Variant::Cap100M => "100m",
            Variant::Cap500M => "500m",
            Variant::Cap1B => "1b",
            Variant::Cap5B => "5b",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        Variant::ALL.into_iter().find(|v| v.label() == s)
    }

    pub fn score_field(self) -> String {
        format!("magic_formula_score{}", self.suffix())
    }
}
