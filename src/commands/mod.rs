// ABOUTME: Command implementations for the sheet-sync CLI
// ABOUTME: Exports init, run, status, and the manual sync and mutation commands

pub mod init;
pub mod manual;
pub mod run;
pub mod status;

pub use init::init;
pub use manual::{create, delete, push, sync, update};
pub use run::{run, RunOptions};
pub use status::status;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::SyncConfig;
use crate::sheets::SheetsClient;
use crate::store::PgRecordStore;
use crate::sync::{Orchestrator, SheetState};

/// The orchestrator wired to the real adapters.
pub type PgOrchestrator = Orchestrator<PgRecordStore, SheetsClient>;

/// Connect both adapters and load the persisted snapshot.
pub async fn build_orchestrator(config: &SyncConfig) -> Result<PgOrchestrator> {
    config.validate()?;
    let database_url = config.database_url()?;
    let spreadsheet_id = config.spreadsheet_id()?;

    if config.sheets_token.is_none() {
        tracing::warn!("No Sheets access token configured; requests will be unauthenticated");
    }

    let client = crate::postgres::connect_with_retry(database_url)
        .await
        .context("Failed to connect to record store")?;
    let store = PgRecordStore::new(client, &config.schema, &config.table)?;

    let sheet = SheetsClient::new(
        &config.sheets_api_base,
        spreadsheet_id.to_string(),
        config.range.clone(),
        config.sheets_token.clone(),
        config.request_timeout(),
    )?;

    let state_path = config.state_path();
    let state =
        SheetState::load_or_new(&state_path, spreadsheet_id, &config.range, database_url).await;

    Ok(Orchestrator::new(
        store,
        sheet,
        state,
        config.policy(),
        Some(state_path),
    ))
}

/// Print a command result as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize result")?;
    println!("{}", out);
    Ok(())
}
