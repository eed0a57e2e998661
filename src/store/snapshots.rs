//! Snapshot table (`stocks`): selection queries, the atomic batch upsert and
//! the chart read model.

use super::{DirectoryStore, StockDb};
use crate::models::{ChartRow, StockSnapshot, TrackedTicker};
use chrono::DateTime;
use rusqlite::{params, Row, TransactionBehavior};
use tracing::{debug, warn};

const UPSERT_SQL: &str = "INSERT INTO stocks
        (ticker, name, sector, market_cap, change_percent, logo, last_updated)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
     ON CONFLICT (ticker) DO UPDATE SET
        name = excluded.name,
        sector = excluded.sector,
        market_cap = excluded.market_cap,
        change_percent = excluded.change_percent,
        logo = excluded.logo,
        last_updated = excluded.last_updated";

#[derive(Clone)]
pub struct SnapshotStore {
    db: StockDb,
}

impl SnapshotStore {
    pub fn new(db: StockDb) -> Self {
        Self { db }
    }

    /// Directory tickers with no snapshot yet, in directory insertion order
    pub fn list_missing_from_directory(&self, limit: usize) -> rusqlite::Result<Vec<TrackedTicker>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT d.ticker, d.name, d.sector
             FROM stock_list AS d
             LEFT JOIN stocks AS s ON s.ticker = d.ticker
             WHERE s.ticker IS NULL
             ORDER BY d.rowid
             LIMIT ?1",
        )?;
        let tickers = stmt
            .query_map([limit as i64], DirectoryStore::row_to_ticker)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tickers)
    }

    /// Stored tickers, least recently updated first.
    ///
    /// Metadata comes from the directory so renames are picked up on refresh.
    /// Snapshots whose ticker left the directory are never selected.
    pub fn list_oldest_updated(&self, limit: usize) -> rusqlite::Result<Vec<TrackedTicker>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT d.ticker, d.name, d.sector
             FROM stocks AS s
             JOIN stock_list AS d ON d.ticker = s.ticker
             ORDER BY s.last_updated ASC NULLS FIRST, s.ticker ASC
             LIMIT ?1",
        )?;
        let tickers = stmt
            .query_map([limit as i64], DirectoryStore::row_to_ticker)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tickers)
    }

    /// Upsert every snapshot in a single immediate transaction.
    ///
    /// Either all rows are written or, on the first failing statement, the
    /// transaction is rolled back and the error returned.
    pub fn upsert_batch(&self, snapshots: &[StockSnapshot]) -> rusqlite::Result<usize> {
        if snapshots.is_empty() {
            return Ok(0);
        }

        let mut conn = self.db.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let written = {
            let mut stmt = tx.prepare_cached(UPSERT_SQL)?;
            let mut written = 0usize;
            let mut failure = None;
            for s in snapshots {
                let res = stmt.execute(params![
                    &s.ticker,
                    &s.name,
                    &s.sector,
                    s.market_cap,
                    s.change_percent,
                    &s.logo_url,
                    s.last_updated.timestamp(),
                ]);
                match res {
                    Ok(changes) => written += changes,
                    Err(e) => {
                        warn!(ticker = %s.ticker, error = %e, "Snapshot upsert failed, rolling back batch");
                        failure = Some(e);
                        break;
                    }
                }
            }
            match failure {
                Some(e) => Err(e),
                None => Ok(written),
            }
        };

        match written {
            Ok(n) => {
                tx.commit()?;
                debug!("📦 Upserted {} snapshots", n);
                Ok(n)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback() {
                    warn!(error = %rb, "Explicit rollback failed, transaction dropped");
                }
                Err(e)
            }
        }
    }

    pub fn get(&self, ticker: &str) -> rusqlite::Result<Option<StockSnapshot>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT ticker, name, sector, market_cap, change_percent, logo, last_updated
             FROM stocks WHERE ticker = ?1",
        )?;
        let mut rows = stmt.query_map([ticker], Self::row_to_snapshot)?;
        let snapshot = rows.next().transpose()?;
        Ok(snapshot)
    }

    pub fn count(&self) -> rusqlite::Result<usize> {
        let conn = self.db.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM stocks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Read model behind the heatmap chart
    pub fn chart_rows(&self) -> rusqlite::Result<Vec<ChartRow>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT ticker, name AS company, sector, market_cap, change_percent AS change_percentage
             FROM stocks
             ORDER BY sector, market_cap DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ChartRow {
                    ticker: row.get(0)?,
                    company: row.get(1)?,
                    sector: row.get(2)?,
                    market_cap: row.get(3)?,
                    change_percentage: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn row_to_snapshot(row: &Row<'_>) -> rusqlite::Result<StockSnapshot> {
        let ts: Option<i64> = row.get(6)?;
        let last_updated = ts
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_default();
        Ok(StockSnapshot {
            ticker: row.get(0)?,
            name: row.get(1)?,
            sector: row.get(2)?,
            market_cap: row.get(3)?,
            change_percent: row.get(4)?,
            logo_url: row.get(5)?,
            last_updated,
        })
    }
}
