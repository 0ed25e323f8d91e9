// ABOUTME: Error taxonomy for sync operations
// ABOUTME: Classifies adapter failures so callers can decide whether to retry

use thiserror::Error;

/// Why a spreadsheet row was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    MissingId,
    DuplicateId,
}

impl std::fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MalformedReason::MissingId => write!(f, "missing id"),
            MalformedReason::DuplicateId => write!(f, "duplicate id"),
        }
    }
}

/// All errors that can surface from the sync core.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// The store or spreadsheet could not be reached (network, auth, timeout).
    #[error("{adapter} unavailable: {message}")]
    AdapterUnavailable {
        adapter: &'static str,
        message: String,
    },

    /// The adapter answered but refused the request (bad range, unknown
    /// spreadsheet, expired token). Retrying cannot help.
    #[error("{adapter} rejected request: {message}")]
    RequestRejected {
        adapter: &'static str,
        message: String,
    },

    /// The local state file could not be locked.
    #[error("sheet state unavailable: {0}")]
    StateUnavailable(String),

    /// The store rejected a write.
    #[error("store rejected write: {0}")]
    ConflictOrConstraint(String),

    /// A row with a missing or invalid id.
    #[error("malformed row ({reason}): {cells:?}")]
    MalformedRow {
        reason: MalformedReason,
        cells: Vec<String>,
    },

    /// Some rows of a batch failed while others were applied.
    #[error("{failed} of {} rows failed: {}", .succeeded + .failed, .errors.join("; "))]
    PartialBatchFailure {
        succeeded: usize,
        failed: usize,
        errors: Vec<String>,
    },
}

impl SyncError {
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        SyncError::AdapterUnavailable {
            adapter: "record store",
            message: message.into(),
        }
    }

    pub fn sheet_unavailable(message: impl Into<String>) -> Self {
        SyncError::AdapterUnavailable {
            adapter: "spreadsheet",
            message: message.into(),
        }
    }

    pub fn sheet_rejected(message: impl Into<String>) -> Self {
        SyncError::RequestRejected {
            adapter: "spreadsheet",
            message: message.into(),
        }
    }

    /// Transient failures are worth retrying; constraint violations are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::AdapterUnavailable { .. })
    }
}

impl From<tokio_postgres::Error> for SyncError {
    fn from(err: tokio_postgres::Error) -> Self {
        match err.as_db_error() {
            // Class 23 is integrity constraint violation, 22 is data exception
            // (e.g. a non-numeric age).
            Some(db) if db.code().code().starts_with("23") || db.code().code().starts_with("22") => {
                SyncError::ConflictOrConstraint(db.message().to_string())
            }
            Some(db) => SyncError::store_unavailable(db.message().to_string()),
            None => SyncError::store_unavailable(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::sheet_unavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_unavailable_is_transient() {
        assert!(SyncError::store_unavailable("connection reset").is_transient());
        assert!(SyncError::sheet_unavailable("503").is_transient());
    }

    #[test]
    fn test_constraint_is_not_transient() {
        let err = SyncError::ConflictOrConstraint("duplicate key".to_string());
        assert!(!err.is_transient());
        let err = SyncError::MalformedRow {
            reason: MalformedReason::MissingId,
            cells: vec![],
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_rejected_request_is_not_transient() {
        let err = SyncError::sheet_rejected("404 Requested entity was not found");
        assert!(!err.is_transient());
        assert_eq!(
            err.to_string(),
            "spreadsheet rejected request: 404 Requested entity was not found"
        );
        assert!(!SyncError::StateUnavailable("locked".to_string()).is_transient());
    }

    #[test]
    fn test_partial_batch_failure_message() {
        let err = SyncError::PartialBatchFailure {
            succeeded: 3,
            failed: 1,
            errors: vec!["upsert 7: bad age".to_string()],
        };
        assert_eq!(err.to_string(), "1 of 4 rows failed: upsert 7: bad age");
    }
}
