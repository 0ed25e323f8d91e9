// ABOUTME: init command - creates the synced table and its notify trigger
// ABOUTME: Safe to run repeatedly; existing rows are left alone

use anyhow::{Context, Result};

use super::print_json;
use crate::config::SyncConfig;
use crate::store::ensure_schema;

pub async fn init(config: &SyncConfig) -> Result<()> {
    config.validate()?;
    let database_url = config.database_url()?;

    let client = crate::postgres::connect_with_retry(database_url)
        .await
        .context("Failed to connect to record store")?;
    ensure_schema(&client, &config.schema, &config.table, &config.channel).await?;

    tracing::info!(
        "Table {}.{} ready, notifications on '{}'",
        config.schema,
        config.table,
        config.channel
    );
    print_json(&serde_json::json!({
        "schema": config.schema,
        "table": config.table,
        "channel": config.channel,
    }))
}
