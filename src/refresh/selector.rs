use crate::error::RefreshError;
use crate::models::{Selection, TrackedTicker};
use crate::store::{DirectoryStore, SnapshotStore};
use tracing::{info, warn};

/// Tickers chosen for one refresh cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshBatch {
    pub selection: Selection,
    pub tickers: Vec<TrackedTicker>,
}

impl RefreshBatch {
    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }
}

/// Pick at most `batch_size` tickers to refresh.
///
/// Tickers that have never been stored always win. Only when every directory
/// entry has a snapshot does the selector rotate through the stalest rows.
pub fn select_batch(
    directory: &DirectoryStore,
    snapshots: &SnapshotStore,
    batch_size: usize,
) -> Result<RefreshBatch, RefreshError> {
    let tracked = directory.count().map_err(RefreshError::DirectoryUnavailable)?;
    if tracked == 0 {
        info!("Stock directory is empty, nothing to refresh");
        return Ok(RefreshBatch {
            selection: Selection::Empty,
            tickers: Vec::new(),
        });
    }
    if batch_size == 0 {
        warn!(tracked, "Batch size is 0, no tickers selected");
        return Ok(RefreshBatch {
            selection: Selection::Empty,
            tickers: Vec::new(),
        });
    }
    info!("Loaded {} stocks from the directory", tracked);

    let new_tickers = snapshots
        .list_missing_from_directory(batch_size)
        .map_err(RefreshError::StoreUnavailable)?;
    if !new_tickers.is_empty() {
        info!("Found {} NEW stocks to insert", new_tickers.len());
        return Ok(RefreshBatch {
            selection: Selection::NewTickers,
            tickers: new_tickers,
        });
    }

    let oldest = snapshots
        .list_oldest_updated(batch_size)
        .map_err(RefreshError::StoreUnavailable)?;
    info!("All stocks are populated, {} oldest entries selected for update", oldest.len());
    Ok(RefreshBatch {
        selection: Selection::Oldest,
        tickers: oldest,
    })
}
