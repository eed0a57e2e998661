//! Tracked-ticker directory (`stock_list`).

use super::StockDb;
use crate::models::TrackedTicker;
use anyhow::{bail, Context, Result};
use rusqlite::{params, Row};
use std::collections::HashSet;

#[derive(Clone)]
pub struct DirectoryStore {
    db: StockDb,
}

impl DirectoryStore {
    pub fn new(db: StockDb) -> Self {
        Self { db }
    }

    /// All tracked tickers in insertion order
    pub fn list_tracked_tickers(&self) -> rusqlite::Result<Vec<TrackedTicker>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT ticker, name, sector FROM stock_list ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], Self::row_to_ticker)?;
        rows.collect()
    }

    pub fn count(&self) -> rusqlite::Result<usize> {
        let conn = self.db.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM stock_list", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Insert or rename directory entries in one transaction.
    ///
    /// Only the import command writes here; the refresh pipeline never does.
    pub fn upsert_tracked(&self, tickers: &[TrackedTicker]) -> rusqlite::Result<usize> {
        if tickers.is_empty() {
            return Ok(0);
        }

        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO stock_list (ticker, name, sector) VALUES (?1, ?2, ?3)
                 ON CONFLICT (ticker) DO UPDATE SET
                    name = excluded.name,
                    sector = excluded.sector",
            )?;
            for t in tickers {
                stmt.execute(params![&t.ticker, &t.name, &t.sector])?;
            }
        }
        tx.commit()?;
        Ok(tickers.len())
    }

    pub(crate) fn row_to_ticker(row: &Row<'_>) -> rusqlite::Result<TrackedTicker> {
        Ok(TrackedTicker {
            ticker: row.get(0)?,
            name: row.get(1)?,
            sector: row.get(2)?,
        })
    }
}

/// Parse a JSON array of `{ticker, name, sector}` into directory entries.
///
/// Tickers are trimmed and upper-cased; the first occurrence of a duplicate wins.
pub fn parse_directory_json(raw: &str) -> Result<Vec<TrackedTicker>> {
    let entries: Vec<TrackedTicker> =
        serde_json::from_str(raw).context("Directory file must be a JSON array of {ticker, name, sector}")?;

    let mut seen = HashSet::with_capacity(entries.len());
    let mut out = Vec::with_capacity(entries.len());
    for (i, entry) in entries.into_iter().enumerate() {
        let ticker = entry.ticker.trim().to_ascii_uppercase();
        if ticker.is_empty() {
            bail!("Entry {} has a blank ticker", i);
        }
        if !seen.insert(ticker.clone()) {
            continue;
        }
        out.push(TrackedTicker {
            ticker,
            name: entry.name.trim().to_string(),
            sector: entry.sector.trim().to_string(),
        });
    }
    Ok(out)
}
