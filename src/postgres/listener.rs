// ABOUTME: LISTEN/NOTIFY listener that turns store notifications into ChangeSignals
// ABOUTME: Holds a dedicated connection and reconnects with backoff when it drops

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_postgres::AsyncMessage;

use super::make_tls_connector;
use crate::store::{ChangeSignal, WriteOrigin};
use crate::sync::state::sanitize_url;
use crate::utils::{quote_ident, validate_postgres_identifier};

const SIGNAL_BUFFER: usize = 64;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Start listening on `channel`.
///
/// Returns the receiving end of the signal stream and the listener task. The
/// task exits once the receiver is dropped.
pub fn spawn_listener(
    url: String,
    channel: String,
) -> Result<(mpsc::Receiver<ChangeSignal>, JoinHandle<()>)> {
    validate_postgres_identifier(&channel).context("Invalid notification channel name")?;

    let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);
    let handle = tokio::spawn(async move {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match listen(&url, &channel, &tx, &mut backoff).await {
                Ok(()) => {
                    tracing::debug!("Signal receiver dropped, stopping listener");
                    break;
                }
                Err(e) => {
                    if tx.is_closed() {
                        break;
                    }
                    tracing::warn!(
                        "Notification listener on '{}' failed: {:#}. Reconnecting in {:?}",
                        channel,
                        e,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    });

    Ok((rx, handle))
}

/// Listen on one connection until it fails (`Err`) or the receiver goes away (`Ok`).
async fn listen(
    url: &str,
    channel: &str,
    tx: &mpsc::Sender<ChangeSignal>,
    backoff: &mut Duration,
) -> Result<()> {
    let tls = make_tls_connector()?;
    let (client, mut connection) = tokio_postgres::connect(url, tls)
        .await
        .with_context(|| format!("Failed to connect to {}", sanitize_url(url)))?;

    // Notifications only surface through poll_message, so the connection is
    // driven here instead of being awaited as a plain future.
    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();
    let driver = tokio::spawn(async move {
        let mut messages = futures::stream::poll_fn(move |cx| connection.poll_message(cx)).boxed();
        while let Some(message) = messages.next().await {
            match message {
                Ok(AsyncMessage::Notification(n)) => {
                    if msg_tx.send(n).is_err() {
                        break;
                    }
                }
                Ok(AsyncMessage::Notice(notice)) => {
                    tracing::debug!("PostgreSQL notice: {}", notice.message());
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("Notification connection error: {}", e);
                    break;
                }
            }
        }
    });

    client
        .batch_execute(&format!("LISTEN {}", quote_ident(channel)))
        .await
        .with_context(|| format!("Failed to LISTEN on '{}'", channel))?;
    tracing::info!("Listening for store changes on channel '{}'", channel);
    *backoff = INITIAL_BACKOFF;

    while let Some(notification) = msg_rx.recv().await {
        let origin = WriteOrigin::from_payload(notification.payload());
        tracing::debug!(
            "Notification on '{}' from pid {} (origin: {})",
            notification.channel(),
            notification.process_id(),
            origin.as_str()
        );
        if tx.send(ChangeSignal { origin }).await.is_err() {
            driver.abort();
            return Ok(());
        }
    }

    drop(client);
    let _ = driver.await;
    bail!("notification connection closed")
}
