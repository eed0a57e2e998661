//! Environment-driven configuration.
//!
//! Everything is read once at startup. Unparsable numbers fall back to their
//! defaults; missing credentials are only fatal for the commands that need them.

use crate::error::RefreshError;
use crate::models::DEFAULT_BATCH_SIZE;
use crate::provider::finnhub::{FinnhubClient, FINNHUB_API_BASE};
use crate::refresh::{FetchPolicy, RefreshSettings};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DB_FILENAME: &str = "heatmap_stocks.db";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
// Ceilings for pacing values read from the environment
const MAX_GROUP_PAUSE_MS: u64 = 60_000;
const MAX_ITEM_TIMEOUT_SECS: u64 = 300;
const MAX_PERIOD_SECS: u64 = 7 * 24 * 3600;

/// How the executor paces provider requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FetchMode {
    /// Small concurrent groups with a pause between groups
    Grouped,
    /// One ticker at a time with a fixed delay
    Sequential,
}

impl FromStr for FetchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grouped" | "parallel" | "pool" => Ok(FetchMode::Grouped),
            "sequential" | "serial" => Ok(FetchMode::Sequential),
            other => Err(format!("unknown fetch mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: String,
    pub finnhub_api_key: Option<String>,
    pub finnhub_base_url: String,
    pub update_secret: Option<String>,
    pub bind_addr: String,
    pub fetch_mode: FetchMode,
    pub refresh: RefreshSettings,
    /// Background refresh period, `None` when disabled
    pub refresh_interval: Option<Duration>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parse_or = |key: &str, default: u64| -> u64 {
            non_empty(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };

        let db_path = resolve_data_path(
            non_empty("DATABASE_PATH").or_else(|| non_empty("DB_PATH")),
            DEFAULT_DB_FILENAME,
        );

        let batch_size = non_empty("REFRESH_BATCH_SIZE")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(DEFAULT_BATCH_SIZE);

        let fetch_mode = non_empty("FETCH_MODE")
            .and_then(|v| v.parse::<FetchMode>().ok())
            .unwrap_or(FetchMode::Grouped);
        let width = parse_or("FETCH_CONCURRENCY", 5).max(1) as usize;
        let pause = Duration::from_millis(
            parse_or("FETCH_GROUP_PAUSE_MS", 1000).min(MAX_GROUP_PAUSE_MS),
        );
        let item_timeout = Duration::from_secs(
            parse_or("FETCH_ITEM_TIMEOUT_SECS", 10).clamp(1, MAX_ITEM_TIMEOUT_SECS),
        );

        let policy = match fetch_mode {
            FetchMode::Grouped => FetchPolicy::grouped(width, pause, item_timeout),
            FetchMode::Sequential => FetchPolicy::sequential(pause, item_timeout),
        };
        let policy = match parse_or("FETCH_CYCLE_BUDGET_SECS", 0) {
            0 => policy,
            secs => policy.with_cycle_budget(Duration::from_secs(secs.min(MAX_PERIOD_SECS))),
        };

        let refresh_interval = match parse_or("REFRESH_INTERVAL_SECS", 0) {
            0 => None,
            secs => Some(Duration::from_secs(secs.min(MAX_PERIOD_SECS))),
        };

        Self {
            db_path,
            finnhub_api_key: non_empty("FINNHUB_API_KEY"),
            finnhub_base_url: non_empty("FINNHUB_BASE_URL")
                .unwrap_or_else(|| FINNHUB_API_BASE.to_string()),
            update_secret: non_empty("UPDATE_SECRET_KEY"),
            bind_addr: non_empty("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            fetch_mode,
            refresh: RefreshSettings { batch_size, policy },
            refresh_interval,
        }
    }

    /// Override the pacing mode, keeping the configured pause and timeout
    pub fn with_fetch_mode(mut self, mode: FetchMode) -> Self {
        let FetchPolicy {
            width,
            group_pause,
            item_timeout,
            cycle_budget,
        } = self.refresh.policy;
        let policy = match mode {
            FetchMode::Grouped if self.fetch_mode == FetchMode::Sequential => {
                FetchPolicy::grouped(FetchPolicy::default().width, group_pause, item_timeout)
            }
            FetchMode::Grouped => FetchPolicy::grouped(width, group_pause, item_timeout),
            FetchMode::Sequential => FetchPolicy::sequential(group_pause, item_timeout),
        };
        self.refresh.policy = FetchPolicy {
            cycle_budget,
            ..policy
        };
        self.fetch_mode = mode;
        self
    }

    pub fn require_update_secret(&self) -> Result<&str, RefreshError> {
        self.update_secret.as_deref().ok_or_else(|| {
            RefreshError::Configuration("UPDATE_SECRET_KEY is not configured".to_string())
        })
    }

    /// Build the Finnhub client; a missing key is fatal
    pub fn build_provider(&self) -> Result<FinnhubClient, RefreshError> {
        let key = self.finnhub_api_key.as_deref().unwrap_or_default();
        FinnhubClient::with_base_url(
            key,
            &self.finnhub_base_url,
            self.refresh.policy.item_timeout,
        )
    }
}

fn default_data_path(default_filename: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join(default_filename)
        .to_string_lossy()
        .to_string()
}

/// Relative paths resolve against the crate directory, not the caller's cwd
pub fn resolve_data_path(env_value: Option<String>, default_filename: &str) -> String {
    let Some(raw) = env_value.filter(|v| !v.trim().is_empty()) else {
        return default_data_path(default_filename);
    };

    let p = PathBuf::from(raw);
    if p.is_absolute() {
        return p.to_string_lossy().to_string();
    }

    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join(p)
        .to_string_lossy()
        .to_string()
}

pub fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv::dotenv();

    // 2) Also try the crate's own .env when launched from elsewhere
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidates = [manifest_dir.join(".env"), manifest_dir.join("../.env")];

    for p in candidates {
        if p.exists() {
            let _ = dotenv::from_path(&p);
        }
    }
}
