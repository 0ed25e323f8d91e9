// ABOUTME: Sync configuration loaded from an optional TOML file
// ABOUTME: CLI flags and environment variables are layered on top in main

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sheets::client::DEFAULT_API_BASE;
use crate::sync::state::SheetState;
use crate::utils::{validate_postgres_identifier, AdapterPolicy};

/// Everything needed to connect the store to the sheet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// PostgreSQL connection string
    pub database_url: Option<String>,
    pub schema: String,
    pub table: String,
    /// LISTEN/NOTIFY channel carrying change notifications
    pub channel: String,

    pub spreadsheet_id: Option<String>,
    /// A1 range holding the rows, without a header row
    pub range: String,
    /// Bearer token for the Sheets API, obtained elsewhere
    pub sheets_token: Option<String>,
    pub sheets_api_base: String,

    #[serde(alias = "pollIntervalSeconds")]
    pub poll_interval_seconds: u64,
    pub request_timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,

    pub state_file: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            schema: "public".to_string(),
            table: "users".to_string(),
            channel: "data_change".to_string(),
            spreadsheet_id: None,
            range: "Sheet1!A2:D".to_string(),
            sheets_token: None,
            sheets_api_base: DEFAULT_API_BASE.to_string(),
            poll_interval_seconds: 6,
            request_timeout_seconds: 30,
            max_retries: 3,
            retry_delay_ms: 500,
            state_file: None,
        }
    }
}

impl SyncConfig {
    /// Reject settings that cannot work before anything connects.
    pub fn validate(&self) -> Result<()> {
        validate_postgres_identifier(&self.schema).context("Invalid schema name")?;
        validate_postgres_identifier(&self.table).context("Invalid table name")?;
        validate_postgres_identifier(&self.channel).context("Invalid notification channel")?;

        if self.range.trim().is_empty() {
            bail!("Sheet range cannot be empty");
        }
        if self.poll_interval_seconds == 0 {
            bail!("poll_interval_seconds must be at least 1");
        }
        if self.request_timeout_seconds == 0 {
            bail!("request_timeout_seconds must be at least 1");
        }
        Ok(())
    }

    pub fn database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .context("No database URL configured. Pass --database-url or set DATABASE_URL")
    }

    pub fn spreadsheet_id(&self) -> Result<&str> {
        self.spreadsheet_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .context("No spreadsheet configured. Pass --spreadsheet-id or set SPREADSHEET_ID")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn policy(&self) -> AdapterPolicy {
        AdapterPolicy {
            timeout: self.request_timeout(),
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(SheetState::default_path)
    }
}

/// Load a config file. Missing keys take their defaults.
pub fn load_config_from_file(path: impl AsRef<Path>) -> Result<SyncConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    parse_config(&contents).with_context(|| format!("Failed to parse config file {:?}", path))
}

pub fn parse_config(contents: &str) -> Result<SyncConfig> {
    let config: SyncConfig = toml::from_str(contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.table, "users");
        assert_eq!(config.channel, "data_change");
        assert_eq!(config.poll_interval(), Duration::from_secs(6));
        assert_eq!(config.policy(), AdapterPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_file() {
        let config = parse_config(
            r#"
            database_url = "postgresql://sync@localhost/app"
            spreadsheet_id = "abc123"
            range = "People!A2:D"
            pollIntervalSeconds = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.database_url().unwrap(), "postgresql://sync@localhost/app");
        assert_eq!(config.spreadsheet_id().unwrap(), "abc123");
        assert_eq!(config.range, "People!A2:D");
        assert_eq!(config.poll_interval_seconds, 60);
        assert_eq!(config.schema, "public");
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(parse_config("poll_every = 5").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = SyncConfig {
            table: "users; DROP TABLE x".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SyncConfig {
            poll_interval_seconds: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_connection_settings() {
        let config = SyncConfig::default();
        assert!(config.database_url().is_err());
        assert!(config.spreadsheet_id().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "table = \"people\"\nmax_retries = 0").unwrap();
        let config = load_config_from_file(file.path()).unwrap();
        assert_eq!(config.table, "people");
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.state_path(), SheetState::default_path());
    }
}
