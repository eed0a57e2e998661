//! End-to-end refresh cycles against an in-memory store and a scripted provider.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use heatmap_backend::{
    models::{Selection, StockSnapshot, TrackedTicker},
    provider::{ProviderError, QuoteProvider},
    refresh::{FetchPolicy, RefreshSettings, Refresher},
    store::{DirectoryStore, SnapshotStore, StockDb},
    RefreshError,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

/// Succeeds for every ticker except the ones told to fail
#[derive(Default)]
struct FakeProvider {
    rate_limited: HashSet<String>,
    broken: HashSet<String>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
}

impl FakeProvider {
    fn rate_limiting(tickers: &[&str]) -> Self {
        Self {
            rate_limited: tickers.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    fn breaking(tickers: &[&str]) -> Self {
        Self {
            broken: tickers.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl QuoteProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn fetch_ticker(&self, info: &TrackedTicker) -> Result<StockSnapshot, ProviderError> {
        self.calls.lock().push(info.ticker.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.rate_limited.contains(&info.ticker) {
            return Err(ProviderError::RateLimited);
        }
        if self.broken.contains(&info.ticker) {
            return Err(ProviderError::Malformed("no current price".into()));
        }
        Ok(StockSnapshot::fetched_now(
            info,
            1_000.0,
            1.5,
            format!("https://logo/{}.png", info.ticker),
        ))
    }
}

fn settings(batch_size: usize) -> RefreshSettings {
    RefreshSettings {
        batch_size,
        policy: FetchPolicy::grouped(5, Duration::ZERO, Duration::from_secs(5)),
    }
}

fn seeded_db(tickers: &[&str]) -> StockDb {
    let db = StockDb::open_in_memory().unwrap();
    let entries: Vec<TrackedTicker> = tickers
        .iter()
        .map(|t| TrackedTicker::new(*t, format!("{t} Corp"), "Tech"))
        .collect();
    DirectoryStore::new(db.clone()).upsert_tracked(&entries).unwrap();
    db
}

fn snapshot_at(ticker: &str, secs: i64) -> StockSnapshot {
    StockSnapshot {
        ticker: ticker.to_string(),
        name: format!("{ticker} Corp"),
        sector: "Tech".to_string(),
        market_cap: 10.0,
        change_percent: 0.0,
        logo_url: String::new(),
        last_updated: Utc.timestamp_opt(secs, 0).unwrap(),
    }
}

#[tokio::test]
async fn test_fresh_system_stores_every_ticker() {
    let db = seeded_db(&["A", "B", "C"]);
    let provider = Arc::new(FakeProvider::default());
    let refresher = Refresher::new(db.clone(), provider, settings(50));
    let started = Utc::now().timestamp();

    let summary = refresher.run_cycle().await.unwrap();
    assert_eq!(summary.selection, Selection::NewTickers);
    assert_eq!(summary.updated_count, 3);
    assert_eq!(summary.updated_tickers, vec!["A", "B", "C"]);

    let snapshots = SnapshotStore::new(db);
    assert_eq!(snapshots.count().unwrap(), 3);
    for ticker in ["A", "B", "C"] {
        let row = snapshots.get(ticker).unwrap().unwrap();
        assert!(row.last_updated.timestamp() >= started);
    }
}

#[tokio::test]
async fn test_zero_batch_size_still_refreshes() {
    let db = seeded_db(&["A", "B"]);
    let refresher = Refresher::new(db, Arc::new(FakeProvider::default()), settings(0));

    let summary = refresher.run_cycle().await.unwrap();
    assert_eq!(summary.selection, Selection::NewTickers);
    assert_eq!(summary.updated_tickers, vec!["A"]);
}

#[tokio::test]
async fn test_fresh_system_fetches_new_tickers_first() {
    let db = seeded_db(&["AAPL", "MSFT", "JPM"]);
    let provider = Arc::new(FakeProvider::default());
    let refresher = Refresher::new(db.clone(), provider.clone(), settings(2));

    let summary = refresher.run_cycle().await.unwrap();
    assert_eq!(summary.selection, Selection::NewTickers);
    assert_eq!(summary.updated_count, 2);
    assert_eq!(summary.updated_tickers, vec!["AAPL", "MSFT"]);
    assert_eq!(summary.skipped_count, 0);

    // The remaining new ticker is picked up before any rotation
    let summary = refresher.run_cycle().await.unwrap();
    assert_eq!(summary.selection, Selection::NewTickers);
    assert_eq!(summary.updated_tickers, vec!["JPM"]);

    let snapshots = SnapshotStore::new(db);
    assert_eq!(snapshots.count().unwrap(), 3);
    let aapl = snapshots.get("AAPL").unwrap().unwrap();
    assert_eq!(aapl.name, "AAPL Corp");
    assert_eq!(aapl.logo_url, "https://logo/AAPL.png");
}

#[tokio::test]
async fn test_steady_state_rotates_oldest_first() {
    let db = seeded_db(&["A", "B", "C"]);
    SnapshotStore::new(db.clone())
        .upsert_batch(&[
            snapshot_at("A", 1_700_000_100),
            snapshot_at("B", 1_700_000_200),
            snapshot_at("C", 1_700_000_000),
        ])
        .unwrap();

    let provider = Arc::new(FakeProvider::default());
    let refresher = Refresher::new(db.clone(), provider.clone(), settings(2));

    let summary = refresher.run_cycle().await.unwrap();
    assert_eq!(summary.selection, Selection::Oldest);
    assert_eq!(summary.updated_tickers, vec!["C", "A"]);

    // B is now the stalest entry
    let summary = refresher.run_cycle().await.unwrap();
    assert_eq!(summary.selection, Selection::Oldest);
    assert_eq!(summary.updated_tickers[0], "B");
    assert_eq!(provider.calls()[..3], ["C", "A", "B"]);
}

#[tokio::test]
async fn test_all_rate_limited_writes_nothing() {
    let db = seeded_db(&["AAPL", "MSFT"]);
    let provider = Arc::new(FakeProvider::rate_limiting(&["AAPL", "MSFT"]));
    let refresher = Refresher::new(db.clone(), provider, settings(50));

    let summary = refresher.run_cycle().await.unwrap();
    assert_eq!(summary.updated_count, 0);
    assert!(summary.updated_tickers.is_empty());
    assert_eq!(summary.skipped_count, 2);
    assert_eq!(SnapshotStore::new(db).count().unwrap(), 0);
}

#[tokio::test]
async fn test_empty_directory_makes_no_provider_calls() {
    let db = StockDb::open_in_memory().unwrap();
    let provider = Arc::new(FakeProvider::default());
    let refresher = Refresher::new(db, provider.clone(), settings(50));

    let summary = refresher.run_cycle().await.unwrap();
    assert_eq!(summary.selection, Selection::Empty);
    assert_eq!(summary.updated_count, 0);
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_failures_are_isolated_per_ticker() {
    let db = seeded_db(&["AAPL", "BAD", "MSFT", "SLOW"]);
    let provider = Arc::new(FakeProvider {
        rate_limited: ["SLOW".to_string()].into_iter().collect(),
        ..FakeProvider::breaking(&["BAD"])
    });
    let refresher = Refresher::new(db.clone(), provider, settings(50));

    let summary = refresher.run_cycle().await.unwrap();
    assert_eq!(summary.updated_tickers, vec!["AAPL", "MSFT"]);
    assert_eq!(summary.skipped_count, 2);

    let snapshots = SnapshotStore::new(db);
    assert!(snapshots.get("BAD").unwrap().is_none());
    assert!(snapshots.get("MSFT").unwrap().is_some());
}

#[tokio::test]
async fn test_failed_upsert_leaves_store_untouched() {
    let file = NamedTempFile::new().unwrap();
    let path = file.path().to_str().unwrap();
    let db = StockDb::open(path).unwrap();
    DirectoryStore::new(db.clone())
        .upsert_tracked(&[
            TrackedTicker::new("AAPL", "AAPL Corp", "Tech"),
            TrackedTicker::new("MSFT", "MSFT Corp", "Tech"),
        ])
        .unwrap();

    // A second connection makes the store refuse one row of the batch
    rusqlite::Connection::open(path)
        .unwrap()
        .execute_batch(
            "CREATE TRIGGER reject_msft BEFORE INSERT ON stocks
             WHEN NEW.ticker = 'MSFT'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .unwrap();

    let provider = Arc::new(FakeProvider::default());
    let refresher = Refresher::new(db.clone(), provider.clone(), settings(50));

    let err = refresher.run_cycle().await.unwrap_err();
    assert!(matches!(err, RefreshError::Reconciliation(_)));
    assert_eq!(provider.calls(), vec!["AAPL", "MSFT"]);

    // AAPL was fetched fine but must not be half-written
    assert_eq!(SnapshotStore::new(db).count().unwrap(), 0);
}

#[tokio::test]
async fn test_overlapping_trigger_is_rejected() {
    let db = seeded_db(&["AAPL"]);
    let provider = Arc::new(FakeProvider {
        delay: Duration::from_millis(50),
        ..Default::default()
    });
    let refresher = Refresher::new(db, provider.clone(), settings(50));

    let (first, second) = tokio::join!(refresher.run_exclusive(), refresher.run_exclusive());
    assert_eq!(first.unwrap().updated_tickers, vec!["AAPL"]);
    assert!(matches!(second, Err(RefreshError::CycleInProgress)));
    assert_eq!(provider.calls().len(), 1);
}
