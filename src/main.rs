//! # Reachly: WhatsApp outreach engine
//!
//! Runs delayed campaign and workflow jobs against the WhatsApp Business
//! Cloud API with a bounded number of sends in flight.
//!
//! Usage:
//!   reachly                              # Run with ~/.reachly/config.toml
//!   reachly --config ./reachly.toml      # Custom config
//!   reachly --status                     # Print job counts and exit
//!   reachly --json                       # JSON log lines

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use reachly_channels::WhatsAppChannel;
use reachly_core::ReachlyConfig;
use reachly_scheduler::{change_feed, Engine, SqliteStore};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "reachly",
    version,
    about = "📣 Reachly, the delayed WhatsApp outreach engine"
)]
struct Cli {
    /// Config file (default: ~/.reachly/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print job counts by status, then exit
    #[arg(long)]
    status: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "reachly=debug,reachly_scheduler=debug,reachly_channels=debug"
    } else {
        "reachly=info,reachly_scheduler=info,reachly_channels=info"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    if cli.json {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let config = match &cli.config {
        Some(path) => ReachlyConfig::load_from(path)?,
        None => ReachlyConfig::load()?,
    };
    config.validate()?;

    let db_path = config.database.resolved_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // --status: report and exit
    if cli.status {
        let store = SqliteStore::open(&db_path, None)?;
        println!("📊 Reachly jobs ({})\n", db_path.display());
        let counts = store.status_counts()?;
        if counts.is_empty() {
            println!("   (no jobs)");
        }
        for (key, count) in counts {
            println!("   {key:<32} {count}");
        }
        return Ok(());
    }

    let (feed_tx, feed_rx) = change_feed();
    let store = Arc::new(SqliteStore::open(&db_path, Some(feed_tx))?);
    let whatsapp = Arc::new(WhatsAppChannel::new(&config.whatsapp)?);
    let engine = Engine::new(&config.engine, store, whatsapp)?;
    tracing::info!("🗄️ Database: {}", db_path.display());

    let report = engine.start_reconciliation().await?;
    tracing::info!(
        "🚀 Reachly running: {} job(s) dispatched, {} armed at boot",
        report.dispatched,
        report.armed
    );
    let listener = engine.listen(feed_rx);

    tokio::signal::ctrl_c().await?;
    tracing::info!("🛑 Shutdown requested");
    listener.abort();
    engine.shutdown().await;
    Ok(())
}
