//! Heatmap Backend Library
//!
//! Keeps the stock snapshot table behind the sector heatmap fresh: picks the
//! tickers due for an update, fetches them from Finnhub under a paced worker
//! pool and writes the results back in one transaction.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod provider;
pub mod refresh;
pub mod store;

pub use error::RefreshError;
