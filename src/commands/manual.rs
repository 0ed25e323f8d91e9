// ABOUTME: One-shot manual triggers - inbound sync, outbound push, and row mutations
// ABOUTME: Each prints its result as JSON and fails with a non-zero exit on error

use anyhow::Result;

use super::{build_orchestrator, print_json};
use crate::config::SyncConfig;
use crate::sync::{Mutation, Row};

/// Pull sheet edits into the store once.
pub async fn sync(config: &SyncConfig) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    let report = orchestrator.poll_inbound().await?;
    print_json(&report)?;
    report.into_result()?;
    Ok(())
}

/// Overwrite the sheet with the store once.
pub async fn push(config: &SyncConfig) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    let report = orchestrator.push_outbound().await?;
    print_json(&report)
}

pub async fn create(config: &SyncConfig, row: Row) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    report_mutation(orchestrator.create(row).await?)
}

pub async fn update(config: &SyncConfig, row: Row) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    report_mutation(orchestrator.update(row).await?)
}

pub async fn delete(config: &SyncConfig, id: &str) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    report_mutation(orchestrator.delete(id).await?)
}

fn report_mutation(mutation: Mutation) -> Result<()> {
    if let Some(ref err) = mutation.push_error {
        eprintln!(
            "warning: row {} was saved but the sheet was not updated: {}",
            mutation.row.id, err
        );
    }
    print_json(&mutation)
}
