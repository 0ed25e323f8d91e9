// ABOUTME: run command - the long-lived sync daemon, or a single poll with --once
// ABOUTME: Wires the notification listener and Ctrl+C into SyncDaemon

use anyhow::Result;
use std::sync::Arc;

use super::{build_orchestrator, print_json};
use crate::config::SyncConfig;
use crate::postgres::spawn_listener;
use crate::sync::{DaemonConfig, SyncDaemon};

pub struct RunOptions {
    /// Poll the sheet once and exit
    pub once: bool,
    /// Push to the sheet when the store changes
    pub listen: bool,
}

pub async fn run(config: &SyncConfig, opts: RunOptions) -> Result<()> {
    let orchestrator = Arc::new(build_orchestrator(config).await?);

    if opts.once {
        let report = orchestrator.poll_inbound().await?;
        print_json(&report)?;
        report.into_result()?;
        return Ok(());
    }

    let (notifications, listener) = if opts.listen {
        let (rx, handle) =
            spawn_listener(config.database_url()?.to_string(), config.channel.clone())?;
        (Some(rx), Some(handle))
    } else {
        tracing::info!("Notification listener disabled, store changes need a manual push");
        (None, None)
    };

    let daemon = SyncDaemon::new(
        orchestrator,
        DaemonConfig {
            poll_interval: config.poll_interval(),
        },
    );

    tracing::info!("Starting continuous sync daemon...");
    tracing::info!("Press Ctrl+C to stop");

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received shutdown signal");
                let _ = shutdown_tx_clone.send(());
            }
            Err(e) => tracing::error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    let stats = daemon.run(shutdown_rx, notifications).await?;

    if let Some(handle) = listener {
        handle.abort();
    }

    tracing::info!("Sync daemon finished:");
    tracing::info!(
        "  Polls: {} ({} skipped, {} failed)",
        stats.polls,
        stats.polls_skipped,
        stats.poll_failures
    );
    tracing::info!("  Pushes: {} ({} failed)", stats.pushes, stats.push_failures);
    tracing::info!(
        "  Self-originated notifications ignored: {}",
        stats.notifications_ignored
    );
    Ok(())
}
