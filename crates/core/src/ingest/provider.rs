use crate::config::Settings;
use crate::ingest::types::FundamentalsResponse;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PATH: &str = "/v1/fundamentals";
const DEFAULT_RETRIES: u32 = 3;
// Longest single backoff is 2^MAX_BACKOFF_SHIFT seconds.
const MAX_BACKOFF_SHIFT: u32 = 6;

#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// `ticker` is the provider-side symbol (e.g. `VOLV-B.ST`).
    async fn fetch_fundamentals(&self, ticker: &str) -> Result<FundamentalsResponse>;
}

#[derive(Debug, Clone)]
pub struct HttpJsonDataProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    path: String,
    retries: u32,
}

impl HttpJsonDataProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_data_provider_base_url()?.to_string();
        let api_key = settings.data_provider_api_key.clone();

        let timeout_secs = std::env::var("DATA_PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("DATA_PROVIDER_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES)
            .max(1);

        let path = std::env::var("DATA_PROVIDER_FUNDAMENTALS_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PATH.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build data provider http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            path,
            retries,
        })
    }

    fn url(&self, ticker: &str) -> String {
        let path = self.path.trim_matches('/');
        format!("{}/{}/{}", self.base_url.trim_end_matches('/'), path, ticker)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn fetch_once(&self, ticker: &str) -> Result<FundamentalsResponse> {
        let url = self.url(ticker);
        let headers = self.headers()?;

        let res = self
            .http
            .get(url)
            .headers(headers)
            .send()
            .await
            .context("data provider request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read provider response")?;

        if !status.is_success() {
            anyhow::bail!("data provider HTTP {status}: {text}");
        }

        serde_json::from_str::<FundamentalsResponse>(&text)
            .with_context(|| format!("provider response for {ticker} is not valid fundamentals"))
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for HttpJsonDataProvider {
    fn provider_name(&self) -> &'static str {
        "external_http_json"
    }

    async fn fetch_fundamentals(&self, ticker: &str) -> Result<FundamentalsResponse> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(ticker).await {
                Ok(parsed) => {
                    validate(&parsed, ticker)?;
                    return Ok(parsed);
                }
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = backoff_for(attempt);
                    tracing::warn!(ticker, attempt, ?backoff, error = %err, "data provider fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

/// 1s, 2s, 4s, ... capped at 64s.
fn backoff_for(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
    Duration::from_secs(1 << shift)
}

/// The provider must echo the requested symbol.
pub fn validate(resp: &FundamentalsResponse, expected: &str) -> Result<()> {
    anyhow::ensure!(!resp.ticker.trim().is_empty(), "ticker must be non-empty");
    anyhow::ensure!(
        resp.ticker.trim().eq_ignore_ascii_case(expected),
        "provider ticker mismatch: expected {expected}, got {}",
        resp.ticker
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Figure;
    use serde_json::json;

    #[test]
    fn parses_sparse_payload() {
        let v = json!({
            "ticker": "VOLV-B.ST",
            "price": 251.4,
            "currency": "SEK",
            "quarterly_ebit": [
                {"period": "2025-09-30", "ebit": 12_000_000_000.0},
                {"period": "2025-06-30", "ebit": null}
            ]
        });

        let parsed: FundamentalsResponse = serde_json::from_value(v).unwrap();
        assert_eq!(parsed.price, Some(251.4));
        assert_eq!(parsed.market_cap, None);
        assert_eq!(parsed.quarterly_ebit.len(), 2);
        assert_eq!(parsed.quarterly_ebit[1].ebit, Figure::Unavailable);
        assert!(parsed.quarterly_balance_sheet.is_empty());
    }

    #[test]
    fn rejects_mismatched_ticker() {
        let resp = FundamentalsResponse {
            ticker: "ERIC-B.ST".to_string(),
            ..FundamentalsResponse::default()
        };
        assert!(validate(&resp, "ERIC-B.ST").is_ok());
        assert!(validate(&resp, "eric-b.st").is_ok());
        assert!(validate(&resp, "VOLV-B.ST").is_err());

        let blank = FundamentalsResponse::default();
        assert!(validate(&blank, "VOLV-B.ST").is_err());
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff_for(1), Duration::from_secs(1));
        assert_eq!(backoff_for(3), Duration::from_secs(4));
        assert_eq!(backoff_for(7), Duration::from_secs(64));
        assert_eq!(backoff_for(40), Duration::from_secs(64));
        assert_eq!(backoff_for(200), Duration::from_secs(64));
    }

    #[test]
    fn builds_url_from_base_and_path() {
        let provider = HttpJsonDataProvider {
            http: reqwest::Client::new(),
            base_url: "https://data.example.com/".to_string(),
            api_key: None,
            path: "/v1/fundamentals/".to_string(),
            retries: 1,
        };
        assert_eq!(
            provider.url("VOLV-B.ST"),
            "https://data.example.com/v1/fundamentals/VOLV-B.ST"
        );
    }
}
