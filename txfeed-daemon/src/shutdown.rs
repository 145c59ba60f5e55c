//! Signal handling for graceful shutdown and config reload.

use crate::config::ConfigLoader;
use crate::replay::{FixtureFetcher, StaticRates};
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Notify;
use txfeed_core::config::{ConfigStore, FeedConfig};

/// Completes when a shutdown signal is received.
///
/// Listens for SIGTERM and SIGINT (Ctrl+C).
pub async fn shutdown_signal() -> std::io::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
    Ok(())
}

/// Spawns a task that listens for SIGHUP and reloads the configuration.
///
/// Fixtures and rates are reloaded before the new `FeedConfig` is
/// published, so the orchestrator's reload already sees the new data.
/// Returns a Notify that stops the task.
pub fn spawn_config_reload_handler(
    config_loader: Arc<ConfigLoader>,
    feed_config_store: ConfigStore<FeedConfig>,
    fetcher: Arc<FixtureFetcher>,
    rates: Arc<StaticRates>,
) -> std::io::Result<Arc<Notify>> {
    let shutdown_notify = Arc::new(Notify::new());
    let shutdown_notify_clone = shutdown_notify.clone();
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP, reloading configuration");
                    let loaded = match config_loader.reload() {
                        Ok(loaded) => loaded,
                        Err(e) => {
                            tracing::error!("Failed to reload configuration: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = fetcher.reload(&loaded.fixtures).await {
                        tracing::error!("Failed to reload fixtures: {}", e);
                        continue;
                    }
                    rates.reload(&loaded.rates).await;
                    feed_config_store.update(loaded.feed).await;
                    tracing::info!("Configuration reloaded successfully");
                }
                _ = shutdown_notify_clone.notified() => {
                    tracing::debug!("Config reload handler shutting down");
                    break;
                }
            }
        }
    });

    Ok(shutdown_notify)
}
