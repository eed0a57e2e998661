//! Heatmap backend
//!
//! `serve` exposes the refresh trigger over HTTP, `refresh` runs one cycle
//! from the command line and `import` loads the tracked-ticker directory.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{net::TcpListener, time::interval};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use heatmap_backend::{
    api::create_router,
    auth::UpdateSecret,
    config::{load_env, AppConfig, FetchMode},
    provider::QuoteProvider,
    refresh::Refresher,
    store::{parse_directory_json, DirectoryStore, StockDb},
    RefreshError,
};

#[derive(Parser)]
#[command(name = "heatmap", about = "Stock heatmap refresh service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Listen address, overrides the configured default
        #[arg(long, env = "BIND_ADDR")]
        bind: Option<String>,
    },
    /// Run one refresh cycle and print the summary as JSON
    Refresh {
        /// Override FETCH_MODE for this run
        #[arg(long, value_enum)]
        mode: Option<FetchMode>,
    },
    /// Load tracked tickers from a JSON file into the directory
    Import {
        /// JSON array of {ticker, name, sector}
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env();

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            let mut config = config;
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            serve(config).await
        }
        Command::Refresh { mode } => {
            let config = match mode {
                Some(mode) => config.with_fetch_mode(mode),
                None => config,
            };
            refresh_once(config).await
        }
        Command::Import { path } => import_directory(&config, &path),
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "heatmap_backend=info,heatmap=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn build_refresher(config: &AppConfig) -> Result<Arc<Refresher>> {
    let db = StockDb::open(&config.db_path)?;
    let provider: Arc<dyn QuoteProvider> = Arc::new(config.build_provider()?);
    info!(
        provider = provider.name(),
        mode = ?config.fetch_mode,
        width = config.refresh.policy.width,
        batch_size = config.refresh.batch_size,
        "Refresh pipeline configured"
    );
    Ok(Arc::new(Refresher::new(db, provider, config.refresh)))
}

async fn serve(config: AppConfig) -> Result<()> {
    info!("🚀 Heatmap backend starting");

    let secret = UpdateSecret::new(config.require_update_secret()?);
    let refresher = build_refresher(&config)?;

    if let Some(period) = config.refresh_interval {
        tokio::spawn(refresh_polling(refresher.clone(), period));
    }

    let app = create_router(refresher, secret);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("🎯 API server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Background refresh on a fixed period, sharing the trigger's cycle lock
async fn refresh_polling(refresher: Arc<Refresher>, period: Duration) {
    info!("⏱️  Scheduled refresh every {:?}", period);
    let mut ticker = interval(period);
    // The first tick fires immediately; leave the first cycle to the period
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match refresher.run_exclusive().await {
            Ok(summary) => debug!(
                updated = summary.updated_count,
                skipped = summary.skipped_count,
                "Scheduled refresh finished"
            ),
            Err(RefreshError::CycleInProgress) => {
                debug!("Refresh already running, skipping scheduled tick")
            }
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "Scheduled refresh failed, retrying next tick")
            }
            Err(e) => {
                error!("Scheduled refresh stopped: {}", e);
                break;
            }
        }
    }
}

async fn refresh_once(config: AppConfig) -> Result<()> {
    let refresher = build_refresher(&config)?;
    let summary = refresher.run_cycle().await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn import_directory(config: &AppConfig, path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let entries = parse_directory_json(&raw)?;
    if entries.is_empty() {
        warn!("{} contains no tickers, nothing imported", path.display());
        return Ok(());
    }

    let directory = DirectoryStore::new(StockDb::open(&config.db_path)?);
    let written = directory
        .upsert_tracked(&entries)
        .context("Failed to write directory entries")?;
    info!(
        imported = written,
        total = directory.count()?,
        "📥 Directory import finished"
    );
    Ok(())
}
