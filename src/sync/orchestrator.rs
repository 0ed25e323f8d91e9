// ABOUTME: Orchestrator - owns the bidirectional sync policy between store and sheet
// ABOUTME: Serializes inbound polls, outbound pushes, and manual mutations behind one lock

use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::{Mutex, MutexGuard};

use super::detector::diff;
use super::row::{Row, Snapshot};
use super::state::{SheetState, StateLock};
use crate::error::{MalformedReason, SyncError};
use crate::sheets::Spreadsheet;
use crate::store::{RecordStore, WriteOrigin};
use crate::utils::AdapterPolicy;

/// A single row that could not be applied to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    pub id: String,
    pub operation: &'static str,
    pub error: String,
}

/// Outcome of one inbound poll (sheet → store).
#[derive(Debug, Clone, Default, Serialize)]
pub struct InboundReport {
    /// Ids upserted into the store
    pub upserted: Vec<String>,
    /// Ids deleted from the store
    pub deleted: Vec<String>,
    /// Sheet rows ignored for a missing or duplicate id
    pub skipped_rows: usize,
    pub failures: Vec<RowFailure>,
    /// The sheet was empty, nothing was done
    pub skipped_empty: bool,
    pub duration_ms: u64,
}

impl InboundReport {
    /// Check if every change was applied.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Turn a report with failures into `PartialBatchFailure`.
    pub fn into_result(self) -> Result<InboundReport, SyncError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(SyncError::PartialBatchFailure {
            succeeded: self.upserted.len() + self.deleted.len(),
            failed: self.failures.len(),
            errors: self
                .failures
                .iter()
                .map(|f| format!("{} {}: {}", f.operation, f.id, f.error))
                .collect(),
        })
    }
}

/// Outcome of one outbound push (store → sheet).
#[derive(Debug, Clone, Default, Serialize)]
pub struct OutboundReport {
    pub rows_written: usize,
    pub duration_ms: u64,
}

/// Result of a manual create/update/delete.
///
/// The store write has happened whenever this is returned. A failed push is
/// reported in `push_error`; the next push or notification repairs the sheet.
#[derive(Debug, Clone, Serialize)]
pub struct Mutation {
    pub row: Row,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pushed: Option<OutboundReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_error: Option<String>,
}

/// Owns the bidirectional sync between one store table and one sheet range.
///
/// Every operation takes the state lock for its whole duration, so at most one
/// sync is in flight and the `previous` snapshot is never read mid-update.
/// With a state file, the lock also covers other processes sharing that file:
/// each operation holds a [`StateLock`] and starts from the newest saved state.
pub struct Orchestrator<S, P> {
    store: S,
    sheet: P,
    policy: AdapterPolicy,
    state: Mutex<SheetState>,
    state_path: Option<PathBuf>,
}

impl<S: RecordStore, P: Spreadsheet> Orchestrator<S, P> {
    /// Build an orchestrator. With `state_path` set, the snapshot is saved
    /// there after every change to it.
    pub fn new(
        store: S,
        sheet: P,
        state: SheetState,
        policy: AdapterPolicy,
        state_path: Option<PathBuf>,
    ) -> Self {
        Self {
            store,
            sheet,
            policy,
            state: Mutex::new(state),
            state_path,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sheet(&self) -> &P {
        &self.sheet
    }

    /// The last known sheet content.
    pub async fn previous_snapshot(&self) -> Snapshot {
        self.state.lock().await.previous.clone()
    }

    /// Inbound sync: apply spreadsheet changes to the store.
    pub async fn poll_inbound(&self) -> Result<InboundReport, SyncError> {
        let mut state = self.state.lock().await;
        let _file_lock = self.enter(&mut state).await?;
        self.poll_locked(&mut state).await
    }

    /// Like [`poll_inbound`](Self::poll_inbound), but returns `None` instead of
    /// waiting when another sync is in flight.
    pub async fn try_poll_inbound(&self) -> Option<Result<InboundReport, SyncError>> {
        let mut state = self.state.try_lock().ok()?;
        let _file_lock = match self.state_path {
            Some(ref path) => match StateLock::try_acquire(path) {
                Ok(Some(lock)) => {
                    state.refresh_from(path).await;
                    Some(lock)
                }
                Ok(None) => return None,
                Err(e) => return Some(Err(lock_error(e))),
            },
            None => None,
        };
        Some(self.poll_locked(&mut state).await)
    }

    /// Outbound sync: overwrite the sheet range with the full store.
    pub async fn push_outbound(&self) -> Result<OutboundReport, SyncError> {
        let mut state = self.state.lock().await;
        let _file_lock = self.enter(&mut state).await?;
        self.push_locked(&mut state).await
    }

    /// Insert a new row, then push.
    pub async fn create(&self, row: Row) -> Result<Mutation, SyncError> {
        require_id(&row)?;
        let mut state = self.state.lock().await;
        let _file_lock = self.enter(&mut state).await?;

        self.tag_writes(WriteOrigin::Manual).await;
        // Inserts are not idempotent, so no retries
        let result = self
            .policy
            .store_once("insert row", self.store.insert(&row))
            .await;
        self.tag_writes(WriteOrigin::External).await;

        let created = result?;
        tracing::info!("Created row {}", created.id);
        Ok(self.finish_mutation(&mut state, created).await)
    }

    /// Replace name/age/email of an existing row, then push.
    pub async fn update(&self, row: Row) -> Result<Mutation, SyncError> {
        require_id(&row)?;
        let mut state = self.state.lock().await;
        let _file_lock = self.enter(&mut state).await?;

        self.tag_writes(WriteOrigin::Manual).await;
        let result = self
            .policy
            .store("update row", || self.store.update(&row))
            .await;
        self.tag_writes(WriteOrigin::External).await;

        let updated = result?
            .ok_or_else(|| SyncError::ConflictOrConstraint(format!("no row with id {}", row.id)))?;
        tracing::info!("Updated row {}", updated.id);
        Ok(self.finish_mutation(&mut state, updated).await)
    }

    /// Delete a row by id, then push.
    pub async fn delete(&self, id: &str) -> Result<Mutation, SyncError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(SyncError::MalformedRow {
                reason: MalformedReason::MissingId,
                cells: vec![],
            });
        }
        let mut state = self.state.lock().await;
        let _file_lock = self.enter(&mut state).await?;

        self.tag_writes(WriteOrigin::Manual).await;
        // A retry after a timed-out delete that did commit would find no row
        let result = self
            .policy
            .store_once("delete row", self.store.delete(id))
            .await;
        self.tag_writes(WriteOrigin::External).await;

        let deleted = result?
            .ok_or_else(|| SyncError::ConflictOrConstraint(format!("no row with id {}", id)))?;
        tracing::info!("Deleted row {}", deleted.id);
        Ok(self.finish_mutation(&mut state, deleted).await)
    }

    async fn poll_locked(
        &self,
        state: &mut MutexGuard<'_, SheetState>,
    ) -> Result<InboundReport, SyncError> {
        let start = Instant::now();
        let mut report = InboundReport::default();

        let cells = self
            .policy
            .sheet("read sheet range", || self.sheet.read_range())
            .await?;
        let current: Snapshot = cells.iter().map(|c| Row::from_cells(c)).collect();

        if current.is_empty() {
            tracing::info!("No data found in sheet, skipping inbound sync");
            report.skipped_empty = true;
            report.duration_ms = start.elapsed().as_millis() as u64;
            return Ok(report);
        }

        let changes = diff(&state.previous, &current);
        report.skipped_rows = changes.skipped.len();

        if !changes.is_empty() {
            tracing::info!(
                "Sheet changes detected: {} upserts, {} deletions",
                changes.upserts.len(),
                changes.deleted_ids.len()
            );

            self.tag_writes(WriteOrigin::Inbound).await;

            for id in &changes.deleted_ids {
                match self.policy.store("delete row", || self.store.delete(id)).await {
                    Ok(_) => report.deleted.push(id.clone()),
                    Err(e) => {
                        tracing::error!("Failed to delete row {} from store: {}", id, e);
                        report.failures.push(RowFailure {
                            id: id.clone(),
                            operation: "delete",
                            error: e.to_string(),
                        });
                    }
                }
            }

            for row in &changes.upserts {
                match self.policy.store("upsert row", || self.store.upsert(row)).await {
                    Ok(()) => report.upserted.push(row.id.clone()),
                    Err(e) => {
                        tracing::error!("Failed to upsert row {} into store: {}", row.id, e);
                        report.failures.push(RowFailure {
                            id: row.id.clone(),
                            operation: "upsert",
                            error: e.to_string(),
                        });
                    }
                }
            }

            self.tag_writes(WriteOrigin::External).await;
        }

        // Advance even after partial failure; failed rows are not retried
        // until they change again in the sheet.
        let changed = state.previous != current;
        state.record_inbound(current);
        if changed {
            self.save_state(state).await;
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        if report.is_success() {
            tracing::info!(
                "Inbound sync complete: {} upserted, {} deleted in {}ms",
                report.upserted.len(),
                report.deleted.len(),
                report.duration_ms
            );
        } else {
            tracing::warn!(
                "Inbound sync finished with {} failed rows",
                report.failures.len()
            );
        }
        Ok(report)
    }

    async fn push_locked(
        &self,
        state: &mut MutexGuard<'_, SheetState>,
    ) -> Result<OutboundReport, SyncError> {
        let start = Instant::now();

        let rows = self
            .policy
            .store("read store", || self.store.select_all())
            .await?;
        let cells: Vec<Vec<String>> = rows.iter().map(Row::to_cells).collect();

        self.policy
            .sheet("clear sheet range", || self.sheet.clear_range())
            .await?;
        if !cells.is_empty() {
            self.policy
                .sheet("write sheet range", || self.sheet.write_range(&cells))
                .await?;
        }

        let report = OutboundReport {
            rows_written: rows.len(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        state.record_outbound(rows);
        self.save_state(state).await;

        tracing::info!(
            "Outbound sync complete: {} rows written to sheet in {}ms",
            report.rows_written,
            report.duration_ms
        );
        Ok(report)
    }

    async fn finish_mutation(&self, state: &mut MutexGuard<'_, SheetState>, row: Row) -> Mutation {
        match self.push_locked(state).await {
            Ok(report) => Mutation {
                row,
                pushed: Some(report),
                push_error: None,
            },
            Err(e) => {
                tracing::warn!("Row {} was written but the sheet push failed: {}", row.id, e);
                Mutation {
                    row,
                    pushed: None,
                    push_error: Some(e.to_string()),
                }
            }
        }
    }

    /// Take the cross-process state lock and pick up any newer saved state.
    async fn enter(&self, state: &mut SheetState) -> Result<Option<StateLock>, SyncError> {
        let Some(ref path) = self.state_path else {
            return Ok(None);
        };
        let lock = StateLock::acquire(path).await.map_err(lock_error)?;
        state.refresh_from(path).await;
        Ok(Some(lock))
    }

    /// Tag store writes so change notifications name their origin. Failure
    /// only costs a redundant push, so it is logged and ignored.
    async fn tag_writes(&self, origin: WriteOrigin) {
        if let Err(e) = self
            .policy
            .store("tag write origin", || self.store.set_write_origin(origin))
            .await
        {
            tracing::warn!("Failed to tag store writes as {}: {}", origin.as_str(), e);
        }
    }

    async fn save_state(&self, state: &SheetState) {
        if let Some(ref path) = self.state_path {
            if let Err(e) = state.save(path).await {
                tracing::warn!("Failed to save sheet state: {:#}", e);
            }
        }
    }
}

fn lock_error(err: anyhow::Error) -> SyncError {
    SyncError::StateUnavailable(format!("{:#}", err))
}

fn require_id(row: &Row) -> Result<(), SyncError> {
    if row.has_id() {
        return Ok(());
    }
    Err(SyncError::MalformedRow {
        reason: MalformedReason::MissingId,
        cells: row.to_cells(),
    })
}
