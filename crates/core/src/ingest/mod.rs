pub mod merge;
pub mod provider;
pub mod types;

pub use merge::{apply_fundamentals, merge_failed_fetch};
pub use provider::{HttpJsonDataProvider, MarketDataProvider};
pub use types::FundamentalsResponse;
