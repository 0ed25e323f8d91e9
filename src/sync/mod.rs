// ABOUTME: Bidirectional sync core - change detection, orchestration, and triggers
// ABOUTME: Adapters live in store and sheets; this module only sees their traits

pub mod daemon;
pub mod detector;
pub mod orchestrator;
pub mod row;
pub mod state;

pub use daemon::{DaemonConfig, DaemonStats, SyncDaemon};
pub use detector::{diff, ChangeSet, SkippedRow};
pub use orchestrator::{InboundReport, Mutation, Orchestrator, OutboundReport, RowFailure};
pub use row::{normalize_age, Row, Snapshot};
pub use state::SheetState;
