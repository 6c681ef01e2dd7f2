pub mod domain;
pub mod ingest;
pub mod scoring;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;

    const DEFAULT_CURRENT_STORE_PATH: &str = "data/current_stocks.json";
    const DEFAULT_HISTORY_STORE_PATH: &str = "data/stock_history.json";
    const DEFAULT_TICKERS_PATH: &str = "stockholm_stocks.json";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub current_store_path: PathBuf,
        pub history_store_path: PathBuf,
        pub tickers_path: PathBuf,
        pub sentry_dsn: Option<String>,
        pub data_provider_base_url: Option<String>,
        pub data_provider_api_key: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                current_store_path: path_from_env("CURRENT_STORE_PATH", DEFAULT_CURRENT_STORE_PATH),
                history_store_path: path_from_env("HISTORY_STORE_PATH", DEFAULT_HISTORY_STORE_PATH),
                tickers_path: path_from_env("TICKERS_PATH", DEFAULT_TICKERS_PATH),
                sentry_dsn: non_empty_env("SENTRY_DSN"),
                data_provider_base_url: non_empty_env("DATA_PROVIDER_BASE_URL"),
                data_provider_api_key: non_empty_env("DATA_PROVIDER_API_KEY"),
            })
        }

        pub fn require_data_provider_base_url(&self) -> anyhow::Result<&str> {
            self.data_provider_base_url
                .as_deref()
                .context("DATA_PROVIDER_BASE_URL is required")
        }
    }

    fn non_empty_env(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|s| !s.trim().is_empty())
    }

    fn path_from_env(key: &str, default: &str) -> PathBuf {
        non_empty_env(key)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(default))
    }
}
