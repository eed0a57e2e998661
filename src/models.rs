use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Default number of tickers refreshed per cycle
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// A ticker from the directory (`stock_list`) with its descriptive metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedTicker {
    pub ticker: String,
    pub name: String,
    pub sector: String,
}

impl TrackedTicker {
    pub fn new(ticker: impl Into<String>, name: impl Into<String>, sector: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            name: name.into(),
            sector: sector.into(),
        }
    }
}

/// Latest cached market metrics for one ticker (`stocks` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub ticker: String,
    pub name: String,
    pub sector: String,
    pub market_cap: f64,
    pub change_percent: f64,
    pub logo_url: String,
    pub last_updated: DateTime<Utc>,
}

impl StockSnapshot {
    /// Build a snapshot for `info` stamped with the current time (whole seconds).
    pub fn fetched_now(
        info: &TrackedTicker,
        market_cap: f64,
        change_percent: f64,
        logo_url: String,
    ) -> Self {
        Self {
            ticker: info.ticker.clone(),
            name: info.name.clone(),
            sector: info.sector.clone(),
            market_cap,
            change_percent,
            logo_url,
            last_updated: Utc::now().trunc_subsecs(0),
        }
    }
}

/// Row shape consumed by the heatmap chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRow {
    pub ticker: String,
    pub company: String,
    pub sector: String,
    pub market_cap: f64,
    pub change_percentage: f64,
}

/// Where a refresh batch was drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// Directory is empty, nothing to refresh
    Empty,
    /// Tickers that have never been stored
    NewTickers,
    /// Least-recently-updated stored tickers
    Oldest,
}

/// Outcome of one refresh cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshSummary {
    pub selection: Selection,
    pub updated_count: usize,
    pub updated_tickers: Vec<String>,
    pub skipped_count: usize,
}

impl RefreshSummary {
    pub fn nothing_to_do(selection: Selection) -> Self {
        Self {
            selection,
            updated_count: 0,
            updated_tickers: Vec::new(),
            skipped_count: 0,
        }
    }
}
