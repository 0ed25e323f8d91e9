// ABOUTME: Library root for sheet-sync
// ABOUTME: Keeps a PostgreSQL table and a Google Sheets range in bidirectional sync

pub mod commands;
pub mod config;
pub mod error;
pub mod postgres;
pub mod sheets;
pub mod store;
pub mod sync;
pub mod utils;

pub use error::SyncError;
