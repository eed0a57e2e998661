//! Stock refresh pipeline
//!
//! - `selector`: which tickers to refresh this cycle
//! - `executor`: paced provider fetches with per-ticker failure isolation
//! - `reconciler`: one atomic upsert of the successful results
//! - `orchestrator`: runs the phases in order and reports a summary

pub mod executor;
pub mod orchestrator;
pub mod reconciler;
pub mod selector;

pub use executor::{execute_batch, ExecutionReport, FetchPolicy, FetchResult, SkipReason};
pub use orchestrator::{RefreshSettings, Refresher};
pub use reconciler::reconcile;
pub use selector::{select_batch, RefreshBatch};
