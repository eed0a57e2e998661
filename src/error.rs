//! Error taxonomy for the refresh pipeline.
//!
//! Per-ticker provider failures live in [`crate::provider::ProviderError`] and
//! never leave the executor. Everything here aborts the cycle it occurs in.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unauthorized: a valid secret key is required")]
    Unauthorized,

    #[error("stock directory unavailable: {0}")]
    DirectoryUnavailable(#[source] rusqlite::Error),

    #[error("snapshot store unavailable: {0}")]
    StoreUnavailable(#[source] rusqlite::Error),

    #[error("snapshot upsert rolled back: {0}")]
    Reconciliation(#[source] rusqlite::Error),

    #[error("a refresh cycle is already in progress")]
    CycleInProgress,
}

impl RefreshError {
    /// Safe to run the whole cycle again later without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RefreshError::DirectoryUnavailable(_)
                | RefreshError::StoreUnavailable(_)
                | RefreshError::Reconciliation(_)
                | RefreshError::CycleInProgress
        )
    }
}
