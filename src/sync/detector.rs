// ABOUTME: Change detection between two spreadsheet snapshots
// ABOUTME: Keys rows by id to find upserts and deletions; first occurrence of an id wins

use std::collections::{HashMap, HashSet};

use crate::error::MalformedReason;

use super::row::Row;

/// A spreadsheet row that was left out of the diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    /// Zero-based position in the current snapshot
    pub position: usize,
    pub reason: MalformedReason,
    pub row: Row,
}

/// Changes needed to bring the record store in line with the current snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// New or modified rows, in current-snapshot order
    pub upserts: Vec<Row>,
    /// Ids present in the previous snapshot but gone from the current one
    pub deleted_ids: Vec<String>,
    pub skipped: Vec<SkippedRow>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deleted_ids.is_empty()
    }
}

/// Compute the changes between `previous` and `current`.
///
/// Rows without an id are skipped. When an id occurs more than once, the first
/// occurrence is used and later ones are skipped as duplicates; the same rule
/// picks the baseline row out of `previous`.
pub fn diff(previous: &[Row], current: &[Row]) -> ChangeSet {
    let mut baseline: HashMap<&str, &Row> = HashMap::with_capacity(previous.len());
    for row in previous.iter().filter(|r| r.has_id()) {
        baseline.entry(row.id.as_str()).or_insert(row);
    }

    let mut changes = ChangeSet::default();
    let mut seen: HashSet<&str> = HashSet::with_capacity(current.len());

    for (position, row) in current.iter().enumerate() {
        if !row.has_id() {
            tracing::warn!("Skipping sheet row {} with missing id: {:?}", position + 1, row);
            changes.skipped.push(SkippedRow {
                position,
                reason: MalformedReason::MissingId,
                row: row.clone(),
            });
            continue;
        }

        if !seen.insert(row.id.as_str()) {
            tracing::warn!(
                "Skipping sheet row {}: id {} already appeared earlier in the sheet",
                position + 1,
                row.id
            );
            changes.skipped.push(SkippedRow {
                position,
                reason: MalformedReason::DuplicateId,
                row: row.clone(),
            });
            continue;
        }

        match baseline.get(row.id.as_str()) {
            Some(prev) if !prev.differs_from(row) => {}
            Some(_) => {
                tracing::debug!("Detected change in sheet for id {}", row.id);
                changes.upserts.push(row.clone());
            }
            None => {
                tracing::debug!("Detected new sheet row for id {}", row.id);
                changes.upserts.push(row.clone());
            }
        }
    }

    let mut reported: HashSet<&str> = HashSet::new();
    for row in previous.iter().filter(|r| r.has_id()) {
        if !seen.contains(row.id.as_str()) && reported.insert(row.id.as_str()) {
            tracing::debug!("Detected deletion in sheet for id {}", row.id);
            changes.deleted_ids.push(row.id.clone());
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, name: &str, age: &str, email: &str) -> Row {
        Row::new(id, name, age, email)
    }

    fn ids(rows: &[Row]) -> HashSet<String> {
        rows.iter().map(|r| r.id.clone()).collect()
    }

    #[test]
    fn test_diff_same_snapshot_is_empty() {
        let snapshot = vec![row("1", "Ann", "30", "a@x.com"), row("2", "Bo", "22", "b@x.com")];
        let changes = diff(&snapshot, &snapshot);
        assert!(changes.is_empty());
        assert!(changes.skipped.is_empty());
    }

    #[test]
    fn test_diff_detects_insert_and_update() {
        let previous = vec![row("1", "Ann", "30", "a@x.com")];
        let current = vec![row("1", "Ann", "31", "a@x.com"), row("2", "Bo", "22", "b@x.com")];

        let changes = diff(&previous, &current);
        assert_eq!(changes.upserts.len(), 2);
        assert_eq!(ids(&changes.upserts), ids(&current));
        assert!(changes.upserts.contains(&row("1", "Ann", "31", "a@x.com")));
        assert!(changes.deleted_ids.is_empty());
    }

    #[test]
    fn test_diff_detects_deletion() {
        let previous = vec![row("1", "Ann", "30", "a@x.com"), row("2", "Bo", "22", "b@x.com")];
        let current = vec![row("1", "Ann", "30", "a@x.com")];

        let changes = diff(&previous, &current);
        assert!(changes.upserts.is_empty());
        assert_eq!(changes.deleted_ids, vec!["2".to_string()]);
    }

    #[test]
    fn test_diff_deleted_ids_never_upserted() {
        let previous = vec![row("1", "A", "1", ""), row("2", "B", "2", ""), row("3", "C", "3", "")];
        let current = vec![row("3", "C", "4", ""), row("4", "D", "5", "")];

        let changes = diff(&previous, &current);
        assert_eq!(changes.deleted_ids, vec!["1".to_string(), "2".to_string()]);
        for id in &changes.deleted_ids {
            assert!(!changes.upserts.iter().any(|r| &r.id == id));
        }
    }

    #[test]
    fn test_diff_skips_missing_ids() {
        let previous = vec![row("", "ghost", "", "")];
        let current = vec![row("", "Nobody", "40", ""), row("5", "Eve", "50", "")];

        let changes = diff(&previous, &current);
        assert_eq!(changes.upserts, vec![row("5", "Eve", "50", "")]);
        assert!(changes.deleted_ids.is_empty());
        assert_eq!(changes.skipped.len(), 1);
        assert_eq!(changes.skipped[0].position, 0);
        assert_eq!(changes.skipped[0].reason, MalformedReason::MissingId);
    }

    #[test]
    fn test_diff_first_duplicate_wins() {
        let current = vec![
            row("1", "First", "10", ""),
            row("1", "Second", "20", ""),
        ];
        let changes = diff(&[], &current);
        assert_eq!(changes.upserts, vec![row("1", "First", "10", "")]);
        assert_eq!(changes.skipped.len(), 1);
        assert_eq!(changes.skipped[0].reason, MalformedReason::DuplicateId);
        assert_eq!(changes.skipped[0].row.name, "Second");
    }

    #[test]
    fn test_diff_duplicate_in_previous_uses_first_as_baseline() {
        let previous = vec![row("1", "Ann", "30", ""), row("1", "Other", "99", "")];
        let current = vec![row("1", "Ann", "30", "")];
        let changes = diff(&previous, &current);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_diff_ignores_age_representation() {
        let previous = vec![row("1", "Ann", "30", "a@x.com")];
        let current = vec![row("1", "Ann", "30.0", "a@x.com")];
        assert!(diff(&previous, &current).is_empty());
    }

    #[test]
    fn test_diff_from_empty_previous_upserts_everything() {
        let current = vec![row("1", "Ann", "30", ""), row("2", "Bo", "22", "")];
        let changes = diff(&[], &current);
        assert_eq!(changes.upserts, current);
    }
}
