use super::executor::{execute_batch, FetchPolicy};
use super::reconciler::reconcile;
use super::selector::select_batch;
use crate::error::RefreshError;
use crate::models::{RefreshSummary, DEFAULT_BATCH_SIZE};
use crate::provider::QuoteProvider;
use crate::store::{DirectoryStore, SnapshotStore, StockDb};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, info_span, warn, Instrument};

/// Tunables for one refresh cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSettings {
    pub batch_size: usize,
    pub policy: FetchPolicy,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            policy: FetchPolicy::default(),
        }
    }
}

/// Runs SELECT → FETCH → RECONCILE → SUMMARY against one store.
pub struct Refresher {
    directory: DirectoryStore,
    snapshots: SnapshotStore,
    provider: Arc<dyn QuoteProvider>,
    settings: RefreshSettings,
    // Held for the whole cycle; overlapping upserts on one store are unsafe
    cycle_lock: Mutex<()>,
}

impl Refresher {
    pub fn new(db: StockDb, provider: Arc<dyn QuoteProvider>, mut settings: RefreshSettings) -> Self {
        if settings.batch_size == 0 {
            warn!("Batch size 0 would never refresh anything, using 1");
            settings.batch_size = 1;
        }
        Self {
            directory: DirectoryStore::new(db.clone()),
            snapshots: SnapshotStore::new(db),
            provider,
            settings,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Run one cycle unless another one is already in progress
    pub async fn run_exclusive(&self) -> Result<RefreshSummary, RefreshError> {
        let _guard = self
            .cycle_lock
            .try_lock()
            .map_err(|_| RefreshError::CycleInProgress)?;
        self.run_cycle_unlocked().await
    }

    /// Run one cycle, waiting for any cycle in progress to finish first
    pub async fn run_cycle(&self) -> Result<RefreshSummary, RefreshError> {
        let _guard = self.cycle_lock.lock().await;
        self.run_cycle_unlocked().await
    }

    async fn run_cycle_unlocked(&self) -> Result<RefreshSummary, RefreshError> {
        let span = info_span!("refresh_cycle", batch_size = self.settings.batch_size);
        async move {
            info!("🔄 Starting stock refresh cycle");

            let batch = select_batch(&self.directory, &self.snapshots, self.settings.batch_size)?;
            if batch.is_empty() {
                info!("All stocks seem to be up-to-date, no stocks to fetch");
                return Ok(RefreshSummary::nothing_to_do(batch.selection));
            }

            let report =
                execute_batch(self.provider.as_ref(), &batch.tickers, &self.settings.policy).await;
            let skipped_count = report.skipped.len();
            if report.fetched.is_empty() {
                info!(skipped = skipped_count, "No stocks fetched, skipping reconcile");
                return Ok(RefreshSummary {
                    skipped_count,
                    ..RefreshSummary::nothing_to_do(batch.selection)
                });
            }

            let updated_count = reconcile(&self.snapshots, &report.fetched)?;
            let updated_tickers: Vec<String> =
                report.fetched.into_iter().map(|s| s.ticker).collect();

            info!(
                updated = updated_count,
                skipped = skipped_count,
                "✅ Update finished, processed {} stocks",
                updated_count
            );
            Ok(RefreshSummary {
                selection: batch.selection,
                updated_count,
                updated_tickers,
                skipped_count,
            })
        }
        .instrument(span)
        .await
    }
}
