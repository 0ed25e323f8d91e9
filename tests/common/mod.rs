// ABOUTME: In-memory record store and spreadsheet used by the integration tests
// ABOUTME: Both support fault injection and record the calls made against them

#![allow(dead_code)]

use async_trait::async_trait;
use sheet_sync::error::SyncError;
use sheet_sync::sheets::Spreadsheet;
use sheet_sync::store::{RecordStore, WriteOrigin};
use sheet_sync::sync::{Orchestrator, Row, SheetState};
use sheet_sync::utils::AdapterPolicy;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn row(id: &str, name: &str, age: &str, email: &str) -> Row {
    Row::new(id, name, age, email)
}

pub fn cells(rows: &[&[&str]]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|r| r.iter().map(|c| c.to_string()).collect())
        .collect()
}

/// Policy with short timeouts and delays so failure tests stay fast.
pub fn fast_policy() -> AdapterPolicy {
    AdapterPolicy {
        timeout: Duration::from_secs(2),
        max_retries: 2,
        retry_delay: Duration::from_millis(1),
    }
}

pub fn state_with(previous: Vec<Row>) -> SheetState {
    let mut state = SheetState::new("sheet-1", "Sheet1!A2:D", "postgresql://localhost/test");
    state.previous = previous;
    state
}

pub fn orchestrator(
    store: MemoryStore,
    sheet: MemorySheet,
    previous: Vec<Row>,
) -> Orchestrator<MemoryStore, MemorySheet> {
    Orchestrator::new(store, sheet, state_with(previous), fast_policy(), None)
}

pub fn orchestrator_with_policy(
    store: MemoryStore,
    sheet: MemorySheet,
    policy: AdapterPolicy,
) -> Orchestrator<MemoryStore, MemorySheet> {
    Orchestrator::new(store, sheet, state_with(vec![]), policy, None)
}

pub fn orchestrator_with_state_file(
    store: MemoryStore,
    sheet: MemorySheet,
    path: PathBuf,
) -> Orchestrator<MemoryStore, MemorySheet> {
    Orchestrator::new(store, sheet, state_with(vec![]), fast_policy(), Some(path))
}

#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<String, Row>>,
    rejected: Mutex<HashSet<String>>,
    origins: Mutex<Vec<WriteOrigin>>,
    writes: AtomicU32,
    delete_delay: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn with_rows(rows: Vec<Row>) -> Self {
        let store = Self::default();
        {
            let mut map = store.rows.lock().unwrap();
            for row in rows {
                map.insert(row.id.clone(), row);
            }
        }
        store
    }

    /// Make every write to `id` fail with a constraint error.
    pub fn reject(&self, id: &str) {
        self.rejected.lock().unwrap().insert(id.to_string());
    }

    /// Deletes commit, then take `delay` before returning.
    pub fn delay_deletes(&self, delay: Duration) {
        *self.delete_delay.lock().unwrap() = Some(delay);
    }

    pub fn rows(&self) -> Vec<Row> {
        self.rows.lock().unwrap().values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<Row> {
        self.rows.lock().unwrap().get(id).cloned()
    }

    pub fn origins(&self) -> Vec<WriteOrigin> {
        self.origins.lock().unwrap().clone()
    }

    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(&self, id: &str) -> Result<(), SyncError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.rejected.lock().unwrap().contains(id) {
            return Err(SyncError::ConflictOrConstraint(format!(
                "invalid input syntax for type integer (row {})",
                id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, row: &Row) -> Result<Row, SyncError> {
        self.check(&row.id)?;
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&row.id) {
            return Err(SyncError::ConflictOrConstraint(format!(
                "duplicate key value violates unique constraint (id {})",
                row.id
            )));
        }
        rows.insert(row.id.clone(), row.clone());
        Ok(row.clone())
    }

    async fn upsert(&self, row: &Row) -> Result<(), SyncError> {
        self.check(&row.id)?;
        self.rows
            .lock()
            .unwrap()
            .insert(row.id.clone(), row.clone());
        Ok(())
    }

    async fn update(&self, row: &Row) -> Result<Option<Row>, SyncError> {
        self.check(&row.id)?;
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&row.id) {
            Some(existing) => {
                *existing = row.clone();
                Ok(Some(row.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &str) -> Result<Option<Row>, SyncError> {
        self.check(id)?;
        let removed = self.rows.lock().unwrap().remove(id);
        let delay = *self.delete_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(removed)
    }

    async fn select_all(&self) -> Result<Vec<Row>, SyncError> {
        Ok(self.rows())
    }

    async fn set_write_origin(&self, origin: WriteOrigin) -> Result<(), SyncError> {
        self.origins.lock().unwrap().push(origin);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySheet {
    cells: Mutex<Vec<Vec<String>>>,
    failing_reads: AtomicU32,
    failing_writes: AtomicU32,
    reads: AtomicU32,
    clears: AtomicU32,
    writes: AtomicU32,
    read_delay: Mutex<Option<Duration>>,
}

impl MemorySheet {
    pub fn with_cells(cells: Vec<Vec<String>>) -> Self {
        let sheet = Self::default();
        sheet.set_cells(cells);
        sheet
    }

    pub fn set_cells(&self, cells: Vec<Vec<String>>) {
        *self.cells.lock().unwrap() = cells;
    }

    pub fn cells(&self) -> Vec<Vec<String>> {
        self.cells.lock().unwrap().clone()
    }

    /// The next `n` reads fail as unavailable.
    pub fn fail_reads(&self, n: u32) {
        self.failing_reads.store(n, Ordering::SeqCst);
    }

    /// The next `n` writes fail as unavailable.
    pub fn fail_writes(&self, n: u32) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    pub fn delay_reads(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = Some(delay);
    }

    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> u32 {
        self.clears.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }
}

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl Spreadsheet for MemorySheet {
    async fn read_range(&self) -> Result<Vec<Vec<String>>, SyncError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.read_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if take_failure(&self.failing_reads) {
            return Err(SyncError::sheet_unavailable("connection reset"));
        }
        Ok(self.cells())
    }

    async fn clear_range(&self) -> Result<(), SyncError> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.cells.lock().unwrap().clear();
        Ok(())
    }

    async fn write_range(&self, rows: &[Vec<String>]) -> Result<(), SyncError> {
        if take_failure(&self.failing_writes) {
            return Err(SyncError::sheet_unavailable("quota exceeded"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        *self.cells.lock().unwrap() = rows.to_vec();
        Ok(())
    }
}
