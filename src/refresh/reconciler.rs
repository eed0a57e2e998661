use crate::error::RefreshError;
use crate::models::StockSnapshot;
use crate::store::SnapshotStore;
use tracing::{error, info};

/// Persist a batch of fetched snapshots all-or-nothing.
///
/// An empty batch touches nothing. On failure the store has already rolled
/// the transaction back; the error is passed up without retrying.
pub fn reconcile(store: &SnapshotStore, snapshots: &[StockSnapshot]) -> Result<usize, RefreshError> {
    if snapshots.is_empty() {
        return Ok(0);
    }

    match store.upsert_batch(snapshots) {
        Ok(_) => {
            info!("💾 Successfully upserted {} stocks", snapshots.len());
            Ok(snapshots.len())
        }
        Err(e) => {
            error!(
                attempted = snapshots.len(),
                error = %e,
                "Database upsert transaction failed, rolled back"
            );
            Err(RefreshError::Reconciliation(e))
        }
    }
}
