//! txfeed replay daemon
//!
//! Replays wallet histories from JSON fixtures through the feed engine and
//! prints every display update as a JSON line on stdout.

mod config;
mod display;
mod replay;
mod shutdown;

use clap::Parser;
use config::ConfigLoader;
use display::run_display;
use replay::{FixtureFetcher, StaticRates};
use shutdown::{shutdown_signal, spawn_config_reload_handler};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use txfeed_core::config::ConfigStore;
use txfeed_core::events::{FeedHandle, feed_event_channel, feed_update_channel};
use txfeed_core::processors::FeedOrchestrator;

/// txfeed - merged multi-wallet transaction feed
#[derive(Parser, Debug)]
#[command(name = "txfeed")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "TXFEED_CONFIG", default_value = "./txfeed.toml")]
    config: PathBuf,

    /// Override the page size from the configuration file
    #[arg(short, long)]
    page_size: Option<usize>,

    /// Keep running after the feed is fully loaded (reload with SIGHUP)
    #[arg(short, long, default_value = "false")]
    follow: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting txfeed v{}", env!("CARGO_PKG_VERSION"));

    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.page_size));
    let loaded = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!(
        wallets = loaded.feed.wallets.len(),
        "Configuration loaded from {:?}",
        args.config
    );

    let fetcher = Arc::new(FixtureFetcher::load(&loaded.fixtures)?);
    let rates = Arc::new(StaticRates::new(&loaded.rates));
    let feed_config_store = ConfigStore::new(loaded.feed);

    let (event_tx, event_rx) = feed_event_channel();
    let (update_tx, update_rx) = feed_update_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let orchestrator = FeedOrchestrator::new(fetcher.clone(), rates.clone(), update_tx);
    let orchestrator_task = tokio::spawn(orchestrator.run(
        shutdown_rx,
        event_rx,
        feed_config_store.clone(),
        feed_config_store.subscribe(),
    ));

    let reload_notify =
        spawn_config_reload_handler(config_loader, feed_config_store, fetcher, rates)?;

    let display = run_display(
        update_rx,
        FeedHandle::new(event_tx),
        args.follow,
        std::io::stdout().lock(),
    );

    let result = tokio::select! {
        result = display => result,
        signal = shutdown_signal() => signal.map_err(Into::into),
    };

    reload_notify.notify_one();
    let _ = shutdown_tx.send(true);
    if let Err(e) = orchestrator_task.await {
        tracing::error!("Feed orchestrator task failed: {}", e);
    }
    tracing::info!("txfeed shutdown complete");

    result
}

/// Initialize the tracing subscriber with environment-based filtering.
///
/// Logs go to stderr; stdout carries the feed output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
