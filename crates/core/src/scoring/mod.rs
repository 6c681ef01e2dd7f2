//! Magic Formula scoring: eligibility rules, fundamental extraction,
//! rank combination and the per-variant orchestration tying them together.

pub mod eligibility;
pub mod engine;
pub mod extract;
pub mod rank;

pub use engine::{score_all, Records, ScoringSummary, VariantSummary};
