// ABOUTME: PostgreSQL connection helpers with TLS and retry
// ABOUTME: Spawns connection drivers and exposes the change-notification listener

pub mod listener;

use anyhow::{Context, Result};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::sync::OnceLock;
use std::time::Duration;
use tokio_postgres::Client;

use crate::sync::state::sanitize_url;
use crate::utils::retry_with_backoff;

pub use listener::spawn_listener;

static ALLOW_SELF_SIGNED: OnceLock<bool> = OnceLock::new();

/// Set the TLS certificate policy once at startup.
///
/// Later calls are ignored so the policy cannot change under live connections.
pub fn init_tls_policy(allow_self_signed_certs: bool) {
    let _ = ALLOW_SELF_SIGNED.set(allow_self_signed_certs);
    if allow_self_signed_certs {
        tracing::warn!("TLS certificate verification disabled (--allow-self-signed-certs)");
    }
}

pub(crate) fn make_tls_connector() -> Result<MakeTlsConnector> {
    let allow_self_signed = ALLOW_SELF_SIGNED.get().copied().unwrap_or(false);
    let connector = TlsConnector::builder()
        .danger_accept_invalid_certs(allow_self_signed)
        .build()
        .context("Failed to build TLS connector")?;
    Ok(MakeTlsConnector::new(connector))
}

/// Connect to PostgreSQL and drive the connection on a background task.
pub async fn connect(url: &str) -> Result<Client> {
    let tls = make_tls_connector()?;
    let (client, connection) = tokio_postgres::connect(url, tls)
        .await
        .with_context(|| format!("Failed to connect to {}", sanitize_url(url)))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("PostgreSQL connection error: {}", e);
        }
    });

    Ok(client)
}

/// Connect with exponential backoff (3 retries starting at 1s).
pub async fn connect_with_retry(url: &str) -> Result<Client> {
    retry_with_backoff(|| connect(url), 3, Duration::from_secs(1)).await
}
