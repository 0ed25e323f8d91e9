// ABOUTME: SheetState - the last known spreadsheet snapshot and sync timestamps
// ABOUTME: Persisted as JSON so restarts diff against the sheet as it was, not an empty one

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::fs;

use super::row::{Row, Snapshot};

/// State carried across poll cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetState {
    /// Spreadsheet the snapshot was read from
    pub spreadsheet_id: String,
    /// A1 range the snapshot covers
    pub range: String,
    /// Store database URL (sanitized - no password)
    pub database_url: String,
    /// Last spreadsheet content seen or written
    pub previous: Snapshot,
    pub last_inbound_at: Option<DateTime<Utc>>,
    pub last_outbound_at: Option<DateTime<Utc>>,
    /// Version of the state format for future migrations
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SheetState {
    pub fn new(spreadsheet_id: &str, range: &str, database_url: &str) -> Self {
        let now = Utc::now();
        Self {
            spreadsheet_id: spreadsheet_id.to_string(),
            range: range.to_string(),
            database_url: sanitize_url(database_url),
            previous: Vec::new(),
            last_inbound_at: None,
            last_outbound_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this state was recorded for the given sheet range.
    pub fn matches(&self, spreadsheet_id: &str, range: &str) -> bool {
        self.spreadsheet_id == spreadsheet_id && self.range == range
    }

    /// Record a completed inbound poll.
    pub fn record_inbound(&mut self, current: Vec<Row>) {
        let now = Utc::now();
        self.previous = current;
        self.last_inbound_at = Some(now);
        self.updated_at = now;
    }

    /// Record a completed outbound push of `written` rows.
    pub fn record_outbound(&mut self, written: Vec<Row>) {
        let now = Utc::now();
        self.previous = written;
        self.last_outbound_at = Some(now);
        self.updated_at = now;
    }

    /// Load state from a JSON file
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read sheet state from {:?}", path))?;
        let state: SheetState = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse sheet state from {:?}", path))?;
        Ok(state)
    }

    /// Save state to a JSON file
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create directory {:?}", parent))?;
            }
        }

        let contents =
            serde_json::to_string_pretty(self).context("Failed to serialize sheet state")?;
        // Write then rename so a crash never leaves a truncated file behind.
        let tmp = temp_path(path);
        fs::write(&tmp, contents)
            .await
            .with_context(|| format!("Failed to write sheet state to {:?}", tmp))?;
        fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to move sheet state into {:?}", path))?;
        Ok(())
    }

    /// Load the state at `path` if it belongs to this sheet range, otherwise start fresh.
    pub async fn load_or_new(
        path: &Path,
        spreadsheet_id: &str,
        range: &str,
        database_url: &str,
    ) -> Self {
        if path.exists() {
            match Self::load(path).await {
                Ok(state) if state.matches(spreadsheet_id, range) => {
                    tracing::info!(
                        "Loaded sheet state from {:?} ({} rows)",
                        path,
                        state.previous.len()
                    );
                    return state;
                }
                Ok(state) => {
                    tracing::warn!(
                        "Ignoring sheet state in {:?}: recorded for {} {}, not {} {}",
                        path,
                        state.spreadsheet_id,
                        state.range,
                        spreadsheet_id,
                        range
                    );
                }
                Err(e) => {
                    tracing::warn!("{:#}. Creating new state.", e);
                }
            }
        }

        tracing::info!("Creating new sheet state");
        Self::new(spreadsheet_id, range, database_url)
    }

    /// Adopt the state at `path` if another process saved a newer one for
    /// the same sheet range. Call with the [`StateLock`] held.
    pub async fn refresh_from(&mut self, path: &Path) {
        if !path.exists() {
            return;
        }
        match Self::load(path).await {
            Ok(disk) if disk.matches(&self.spreadsheet_id, &self.range) => {
                if disk.updated_at > self.updated_at {
                    tracing::debug!("Sheet state in {:?} is newer, reloading", path);
                    *self = disk;
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("{:#}. Keeping in-memory sheet state.", e),
        }
    }

    /// Get the default state file path for the current directory
    pub fn default_path() -> PathBuf {
        PathBuf::from(".sheet-sync/sheet-state.json")
    }
}

/// Temp file for an atomic save, unique per process.
fn temp_path(path: &Path) -> PathBuf {
    path.with_extension(format!("json.{}.tmp", std::process::id()))
}

/// Exclusive advisory lock next to a state file.
///
/// Every process sharing the state file takes it around a whole sync, so a
/// manual command and a running daemon never interleave. Released on drop.
#[derive(Debug)]
pub struct StateLock {
    file: File,
    path: PathBuf,
}

impl StateLock {
    pub fn lock_path(state_path: &Path) -> PathBuf {
        state_path.with_extension("lock")
    }

    /// Wait until the lock is free.
    pub async fn acquire(state_path: &Path) -> Result<Self> {
        let path = Self::lock_path(state_path);
        tokio::task::spawn_blocking(move || -> Result<Self> {
            let file = open_lock_file(&path)?;
            file.lock_exclusive()
                .with_context(|| format!("Failed to lock {:?}", path))?;
            Ok(Self { file, path })
        })
        .await
        .context("State lock task panicked")?
    }

    /// Take the lock if it is free, `None` if another holder has it.
    pub fn try_acquire(state_path: &Path) -> Result<Option<Self>> {
        let path = Self::lock_path(state_path);
        let file = open_lock_file(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file, path })),
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to lock {:?}", path)),
        }
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!("Failed to release {:?}: {}", self.path, e);
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
    }
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("Failed to open lock file {:?}", path))
}

/// Sanitize a database URL by removing the password component
pub fn sanitize_url(url: &str) -> String {
    if let Ok(mut parsed) = url::Url::parse(url) {
        if parsed.password().is_some() {
            let _ = parsed.set_password(Some("***"));
        }
        parsed.to_string()
    } else {
        // Key/value connection strings are left alone
        url.to_string()
    }
}
