// ABOUTME: Record store seam - row-level CRUD plus full-table snapshot reads
// ABOUTME: Also defines the write-origin tags carried by change notifications

pub mod postgres;

use async_trait::async_trait;

use crate::error::SyncError;
use crate::sync::row::Row;

pub use postgres::{ensure_schema, PgRecordStore};

/// Who caused a store write. Carried as the payload of change notifications
/// so the listener can tell its own writes apart from everyone else's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrigin {
    /// Any writer that is not this service
    External,
    /// Rows applied by an inbound poll
    Inbound,
    /// Rows written through a manual mutation
    Manual,
}

impl WriteOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteOrigin::External => "external",
            WriteOrigin::Inbound => "inbound",
            WriteOrigin::Manual => "manual",
        }
    }

    /// Parse a notification payload. Anything unrecognized counts as external.
    pub fn from_payload(payload: &str) -> Self {
        match payload.trim() {
            "inbound" => WriteOrigin::Inbound,
            "manual" => WriteOrigin::Manual,
            _ => WriteOrigin::External,
        }
    }

    /// Only writes this service did not make need to be pushed to the sheet;
    /// its own writes are pushed (or came from the sheet) already.
    pub fn needs_push(&self) -> bool {
        matches!(self, WriteOrigin::External)
    }
}

/// A change notification emitted by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSignal {
    pub origin: WriteOrigin,
}

/// Row-level access to the authoritative table.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new row; fails with `ConflictOrConstraint` if the id exists.
    async fn insert(&self, row: &Row) -> Result<Row, SyncError>;

    /// Insert a row, or replace it in place if its id already exists.
    async fn upsert(&self, row: &Row) -> Result<(), SyncError>;

    /// Update name/age/email of an existing row. `None` if no such id.
    async fn update(&self, row: &Row) -> Result<Option<Row>, SyncError>;

    /// Delete by id, returning the deleted row. `None` if no such id.
    async fn delete(&self, id: &str) -> Result<Option<Row>, SyncError>;

    /// Every row in the table, ordered by id.
    async fn select_all(&self) -> Result<Vec<Row>, SyncError>;

    /// Tag subsequent writes on this connection with `origin`.
    async fn set_write_origin(&self, origin: WriteOrigin) -> Result<(), SyncError>;
}
