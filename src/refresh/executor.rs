//! Bounded worker pool for provider fetches.
//!
//! The batch runs as consecutive groups of `width` concurrent fetches with a
//! pause between groups. Width 1 degrades to a paced sequential loop.

use crate::models::{StockSnapshot, TrackedTicker};
use crate::provider::{ProviderError, QuoteProvider};
use futures_util::future::join_all;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Concurrent fetches per group
    pub width: usize,
    /// Pause between groups
    pub group_pause: Duration,
    /// Upper bound for one ticker (both sub-requests)
    pub item_timeout: Duration,
    /// Wall-clock cap for the whole batch, `None` for no cap
    pub cycle_budget: Option<Duration>,
}

impl FetchPolicy {
    pub fn grouped(width: usize, group_pause: Duration, item_timeout: Duration) -> Self {
        Self {
            width: width.max(1),
            group_pause,
            item_timeout,
            cycle_budget: None,
        }
    }

    /// One ticker at a time with a fixed delay between them
    pub fn sequential(delay: Duration, item_timeout: Duration) -> Self {
        Self::grouped(1, delay, item_timeout)
    }

    /// Stop starting new fetches once `budget` has elapsed
    pub fn with_cycle_budget(mut self, budget: Duration) -> Self {
        self.cycle_budget = Some(budget);
        self
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::grouped(5, Duration::from_secs(1), Duration::from_secs(10))
    }
}

#[derive(Debug, Error)]
pub enum SkipReason {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("cycle time budget exhausted before fetch started")]
    OverBudget,
}

impl SkipReason {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SkipReason::Provider(ProviderError::RateLimited))
    }
}

/// Per-ticker outcome of a fetch attempt
#[derive(Debug)]
pub enum FetchResult {
    Fetched(StockSnapshot),
    Skipped { ticker: String, reason: SkipReason },
}

/// What the executor hands to the reconciler
#[derive(Debug, Default)]
pub struct ExecutionReport {
    /// Successful snapshots, in batch order
    pub fetched: Vec<StockSnapshot>,
    pub skipped: Vec<(String, SkipReason)>,
}

impl ExecutionReport {
    fn record(&mut self, result: FetchResult) {
        match result {
            FetchResult::Fetched(snapshot) => self.fetched.push(snapshot),
            FetchResult::Skipped { ticker, reason } => {
                warn!(ticker = %ticker, reason = %reason, "Ticker skipped this cycle");
                self.skipped.push((ticker, reason));
            }
        }
    }

    pub fn rate_limited(&self) -> usize {
        self.skipped.iter().filter(|(_, r)| r.is_rate_limited()).count()
    }
}

async fn fetch_one(
    provider: &dyn QuoteProvider,
    info: &TrackedTicker,
    item_timeout: Duration,
) -> FetchResult {
    match timeout(item_timeout, provider.fetch_ticker(info)).await {
        Ok(Ok(snapshot)) => FetchResult::Fetched(snapshot),
        Ok(Err(e)) => FetchResult::Skipped {
            ticker: info.ticker.clone(),
            reason: e.into(),
        },
        Err(_) => FetchResult::Skipped {
            ticker: info.ticker.clone(),
            reason: ProviderError::Timeout(item_timeout).into(),
        },
    }
}

/// Fetch every ticker in `batch` under `policy`.
///
/// Never fails: per-ticker errors end up in [`ExecutionReport::skipped`].
pub async fn execute_batch(
    provider: &dyn QuoteProvider,
    batch: &[TrackedTicker],
    policy: &FetchPolicy,
) -> ExecutionReport {
    let mut report = ExecutionReport::default();
    if batch.is_empty() {
        return report;
    }

    let width = policy.width.max(1);
    let started = Instant::now();

    for (i, group) in batch.chunks(width).enumerate() {
        if i > 0 && !policy.group_pause.is_zero() {
            sleep(policy.group_pause).await;
        }

        // A group never outlives the remaining budget
        let mut item_timeout = policy.item_timeout;
        if let Some(budget) = policy.cycle_budget {
            let remaining = budget.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                let deferred = &batch[i * width..];
                warn!(
                    remaining = deferred.len(),
                    budget_ms = budget.as_millis() as u64,
                    "Fetch budget exhausted, deferring remaining tickers"
                );
                for info in deferred {
                    report.record(FetchResult::Skipped {
                        ticker: info.ticker.clone(),
                        reason: SkipReason::OverBudget,
                    });
                }
                break;
            }
            item_timeout = item_timeout.min(remaining);
        }

        let results = join_all(
            group
                .iter()
                .map(|info| fetch_one(provider, info, item_timeout)),
        )
        .await;
        for result in results {
            report.record(result);
        }
    }

    info!(
        provider = provider.name(),
        fetched = report.fetched.len(),
        skipped = report.skipped.len(),
        rate_limited = report.rate_limited(),
        "Successfully fetched data for {} of {} stocks",
        report.fetched.len(),
        batch.len()
    );
    report
}
