// ABOUTME: SyncDaemon - drives the orchestrator from a poll timer and store notifications
// ABOUTME: Both triggers are branches of one select loop that stops on shutdown

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};

use super::orchestrator::Orchestrator;
use crate::sheets::Spreadsheet;
use crate::store::{ChangeSignal, RecordStore};

/// Configuration for the SyncDaemon.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Interval between inbound polls
    pub poll_interval: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(6),
        }
    }
}

/// Counters collected over the daemon's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaemonStats {
    pub polls: u64,
    /// Timer ticks dropped because a sync was already running
    pub polls_skipped: u64,
    pub poll_failures: u64,
    pub pushes: u64,
    pub push_failures: u64,
    /// Notifications ignored because this service made the write
    pub notifications_ignored: u64,
}

impl DaemonStats {
    pub fn is_success(&self) -> bool {
        self.poll_failures == 0 && self.push_failures == 0
    }
}

/// Runs inbound polls on a timer and outbound pushes on store notifications.
pub struct SyncDaemon<S, P> {
    orchestrator: Arc<Orchestrator<S, P>>,
    config: DaemonConfig,
}

impl<S: RecordStore, P: Spreadsheet> SyncDaemon<S, P> {
    pub fn new(orchestrator: Arc<Orchestrator<S, P>>, config: DaemonConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    /// Run until `shutdown` fires.
    ///
    /// Without a notification receiver only the poll timer runs. If the
    /// receiver closes the daemon keeps polling.
    pub async fn run(
        &self,
        mut shutdown: broadcast::Receiver<()>,
        mut notifications: Option<mpsc::Receiver<ChangeSignal>>,
    ) -> Result<DaemonStats> {
        let mut stats = DaemonStats::default();
        let mut poll_interval = interval(self.config.poll_interval);
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            "Starting SyncDaemon with poll_interval={:?}, notifications={}",
            self.config.poll_interval,
            if notifications.is_some() { "on" } else { "off" }
        );

        loop {
            tokio::select! {
                biased; // Check shutdown first

                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, stopping SyncDaemon");
                    break;
                }
                signal = async {
                    match notifications.as_mut() {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending::<Option<ChangeSignal>>().await,
                    }
                } => {
                    let Some(signal) = signal else {
                        tracing::warn!("Notification stream closed, continuing with polling only");
                        notifications = None;
                        continue;
                    };

                    let needs_push = self.coalesce(signal, notifications.as_mut(), &mut stats);
                    if !needs_push {
                        continue;
                    }

                    tokio::select! {
                        biased;
                        _ = shutdown.recv() => {
                            tracing::info!("Shutdown signal received during push, aborting");
                            break;
                        }
                        result = self.orchestrator.push_outbound() => {
                            stats.pushes += 1;
                            if let Err(e) = result {
                                stats.push_failures += 1;
                                tracing::error!("Outbound push failed: {}", e);
                            }
                        }
                    }
                }
                _ = poll_interval.tick() => {
                    tokio::select! {
                        biased;
                        _ = shutdown.recv() => {
                            tracing::info!("Shutdown signal received during poll, aborting");
                            break;
                        }
                        result = self.orchestrator.try_poll_inbound() => {
                            match result {
                                None => {
                                    stats.polls_skipped += 1;
                                    tracing::debug!("Sync already in progress, skipping poll");
                                }
                                Some(Ok(report)) => {
                                    stats.polls += 1;
                                    if let Err(e) = report.into_result() {
                                        stats.poll_failures += 1;
                                        tracing::warn!("Inbound poll incomplete: {}", e);
                                    }
                                }
                                Some(Err(e)) => {
                                    stats.polls += 1;
                                    stats.poll_failures += 1;
                                    tracing::error!("Inbound poll failed: {}", e);
                                }
                            }
                        }
                    }
                }
            }
        }

        tracing::info!(
            "SyncDaemon stopped after {} polls and {} pushes",
            stats.polls,
            stats.pushes
        );
        Ok(stats)
    }

    /// Drain notifications already queued behind `first`. Returns whether any
    /// of them came from an outside writer.
    fn coalesce(
        &self,
        first: ChangeSignal,
        pending: Option<&mut mpsc::Receiver<ChangeSignal>>,
        stats: &mut DaemonStats,
    ) -> bool {
        let mut needs_push = false;
        let mut count = 0u64;
        let mut record = |signal: ChangeSignal, stats: &mut DaemonStats| {
            count += 1;
            if signal.origin.needs_push() {
                needs_push = true;
            } else {
                stats.notifications_ignored += 1;
            }
        };

        record(first, stats);
        if let Some(rx) = pending {
            while let Ok(signal) = rx.try_recv() {
                record(signal, stats);
            }
        }

        if needs_push {
            tracing::info!("Store changed ({} notifications), pushing to sheet", count);
        } else {
            tracing::debug!("Ignoring {} self-originated notifications", count);
        }
        needs_push
    }
}
