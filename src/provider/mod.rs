//! Quote provider abstraction.
//!
//! The refresh executor only sees [`QuoteProvider`], so the Finnhub client can
//! be swapped for a scripted provider in tests.

pub mod finnhub;

pub use finnhub::FinnhubClient;

use crate::models::{StockSnapshot, TrackedTicker};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Per-ticker retrieval failures. None of these abort a refresh cycle.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limited by provider")]
    RateLimited,

    #[error("HTTP {status} from {endpoint}")]
    Status { endpoint: &'static str, status: u16 },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("network error: {0}")]
    Transport(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait::async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Human-readable name of this provider
    fn name(&self) -> &str;

    /// Fetch profile and quote for one ticker and merge them into a snapshot
    async fn fetch_ticker(&self, info: &TrackedTicker) -> Result<StockSnapshot, ProviderError>;
}

/// Coerce a provider number into a finite `f64`.
///
/// Missing fields, `null`, unparsable strings, `NaN` and infinities all map to
/// `0.0`. Numeric strings are accepted since the provider is not consistent
/// about quoting.
pub fn normalize_metric(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Market capitalization never goes below zero
pub fn normalize_market_cap(value: Option<&Value>) -> f64 {
    normalize_metric(value).max(0.0)
}
