//! SQLite persistence for the stock directory and snapshots.
//!
//! One process-wide [`StockDb`] handle is opened at startup and cloned into
//! each store. Every operation checks the connection out for its own duration.

pub mod directory;
pub mod snapshots;

pub use directory::{parse_directory_json, DirectoryStore};
pub use snapshots::SnapshotStore;

use anyhow::{Context, Result};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OpenFlags};
use std::sync::Arc;
use tracing::{info, warn};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

-- Tracked universe, maintained outside the refresh pipeline.
-- Kept as a rowid table so insertion order is stable.
CREATE TABLE IF NOT EXISTS stock_list (
    ticker TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    sector TEXT NOT NULL
);

-- Latest snapshot per ticker, written only by the reconciler
CREATE TABLE IF NOT EXISTS stocks (
    ticker TEXT PRIMARY KEY REFERENCES stock_list(ticker),
    name TEXT NOT NULL,
    sector TEXT NOT NULL,
    market_cap REAL NOT NULL DEFAULT 0 CHECK (market_cap >= 0),
    change_percent REAL NOT NULL DEFAULT 0,
    logo TEXT NOT NULL DEFAULT '',
    last_updated INTEGER
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_stocks_last_updated
    ON stocks(last_updated ASC, ticker);
"#;

/// Shared database handle
#[derive(Clone)]
pub struct StockDb {
    conn: Arc<Mutex<Connection>>,
}

impl StockDb {
    /// Open (or create) the database file and apply the schema
    pub fn open(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // We handle our own locking

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open database at {}", db_path))?;

        let db = Self::init(conn)?;
        info!("📊 Stock database initialized at: {}", db_path);
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize database schema")?;

        let fk_enabled: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap_or(0);
        if fk_enabled != 1 {
            warn!("Foreign keys not enforced, snapshot rows may outlive the directory");
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Check out the connection for one operation
    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}
