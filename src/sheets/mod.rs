// ABOUTME: Spreadsheet seam - read a value range and overwrite it wholesale
// ABOUTME: Implemented over the Google Sheets values API by SheetsClient

pub mod client;
pub mod models;

use async_trait::async_trait;

use crate::error::SyncError;

pub use client::SheetsClient;

/// A rectangular, row-major value range.
#[async_trait]
pub trait Spreadsheet: Send + Sync {
    /// Every row in the range, as cell text. Trailing empty rows are omitted.
    async fn read_range(&self) -> Result<Vec<Vec<String>>, SyncError>;

    /// Remove all values from the range (formatting is kept).
    async fn clear_range(&self) -> Result<(), SyncError>;

    /// Write `rows` starting at the top-left of the range.
    async fn write_range(&self, rows: &[Vec<String>]) -> Result<(), SyncError>;
}
