//! Finnhub REST client
//!
//! Two sub-resources per ticker: `/stock/profile2` for market capitalization
//! and logo, `/quote` for the daily change. Both must succeed.

use super::{normalize_market_cap, normalize_metric, ProviderError, QuoteProvider};
use crate::error::RefreshError;
use crate::models::{StockSnapshot, TrackedTicker};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

pub const FINNHUB_API_BASE: &str = "https://finnhub.io/api/v1";

/// `/stock/profile2` payload, only the fields we store
#[derive(Debug, Clone, Deserialize)]
pub struct CompanyProfile {
    #[serde(rename = "marketCapitalization", default)]
    pub market_capitalization: Option<Value>,
    #[serde(default)]
    pub logo: Option<String>,
}

/// `/quote` payload
#[derive(Debug, Clone, Deserialize)]
pub struct Quote {
    /// Current price
    #[serde(default)]
    pub c: Option<Value>,
    /// Percent change since previous close
    #[serde(default)]
    pub dp: Option<Value>,
}

#[derive(Clone)]
pub struct FinnhubClient {
    client: Client,
    base_url: String,
}

impl FinnhubClient {
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self, RefreshError> {
        Self::with_base_url(api_key, FINNHUB_API_BASE, timeout)
    }

    /// Build a client against a custom base URL (staging proxy, local stub)
    pub fn with_base_url(
        api_key: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, RefreshError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(RefreshError::Configuration(
                "FINNHUB_API_KEY is not configured".to_string(),
            ));
        }

        let mut headers = reqwest::header::HeaderMap::new();
        let mut token: reqwest::header::HeaderValue = api_key.parse().map_err(|_| {
            RefreshError::Configuration("FINNHUB_API_KEY is not a valid header value".to_string())
        })?;
        token.set_sensitive(true);
        headers.insert("X-Finnhub-Token", token);

        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent("heatmap-backend/0.1")
            .default_headers(headers)
            .build()
            .map_err(|e| RefreshError::Configuration(format!("Failed to build Finnhub client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    #[inline]
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_object(&self, endpoint: &'static str, symbol: &str) -> Result<Value, ProviderError> {
        let resp = self
            .client
            .get(self.url(endpoint))
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(|e| ProviderError::Transport(format!("GET {endpoint} failed: {e}")))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            return Err(ProviderError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| ProviderError::Transport(format!("GET {endpoint} body: {e}")))?;
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Malformed(format!("{endpoint}: {e}")))?;
        if !value.is_object() {
            return Err(ProviderError::Malformed(format!("{endpoint}: expected a JSON object")));
        }
        Ok(value)
    }

    pub async fn get_profile(&self, symbol: &str) -> Result<CompanyProfile, ProviderError> {
        let value = self.get_object("/stock/profile2", symbol).await?;
        serde_json::from_value(value)
            .map_err(|e| ProviderError::Malformed(format!("/stock/profile2: {e}")))
    }

    pub async fn get_quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
        let value = self.get_object("/quote", symbol).await?;
        serde_json::from_value(value).map_err(|e| ProviderError::Malformed(format!("/quote: {e}")))
    }
}

/// Merge both payloads into a snapshot, rejecting quotes with no price
pub fn merge_snapshot(
    info: &TrackedTicker,
    profile: CompanyProfile,
    quote: Quote,
) -> Result<StockSnapshot, ProviderError> {
    if quote.c.as_ref().map_or(true, Value::is_null) {
        return Err(ProviderError::Malformed(format!(
            "quote for {} has no current price",
            info.ticker
        )));
    }

    Ok(StockSnapshot::fetched_now(
        info,
        normalize_market_cap(profile.market_capitalization.as_ref()),
        normalize_metric(quote.dp.as_ref()),
        profile.logo.unwrap_or_default(),
    ))
}

#[async_trait::async_trait]
impl QuoteProvider for FinnhubClient {
    fn name(&self) -> &str {
        "finnhub"
    }

    async fn fetch_ticker(&self, info: &TrackedTicker) -> Result<StockSnapshot, ProviderError> {
        let symbol = info.ticker.as_str();
        let fetched = tokio::try_join!(self.get_profile(symbol), self.get_quote(symbol));

        let (profile, quote) = match fetched {
            Ok(pair) => pair,
            Err(ProviderError::RateLimited) => {
                warn!(ticker = symbol, "Rate limit hit, skipping");
                return Err(ProviderError::RateLimited);
            }
            Err(e) => return Err(e),
        };

        let snapshot = merge_snapshot(info, profile, quote)?;
        debug!(
            ticker = symbol,
            market_cap = snapshot.market_cap,
            change_percent = snapshot.change_percent,
            "Fetched quote"
        );
        Ok(snapshot)
    }
}
