// ABOUTME: Row model shared by the record store and the spreadsheet
// ABOUTME: Normalizes cell values so both sides compare equal when they mean the same thing

use serde::{Deserialize, Serialize};

/// One `(id, name, age, email)` record.
///
/// Fields are carried as text. Construct rows through [`Row::new`] or
/// [`Row::from_cells`] so values are normalized; comparisons between the store
/// and the spreadsheet rely on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub id: String,
    pub name: String,
    pub age: String,
    pub email: String,
}

/// Full spreadsheet content at one moment, in sheet order.
pub type Snapshot = Vec<Row>;

impl Row {
    pub fn new(
        id: impl AsRef<str>,
        name: impl AsRef<str>,
        age: impl AsRef<str>,
        email: impl AsRef<str>,
    ) -> Self {
        Self {
            id: id.as_ref().trim().to_string(),
            name: name.as_ref().trim().to_string(),
            age: normalize_age(age.as_ref()),
            email: email.as_ref().trim().to_string(),
        }
    }

    /// Build a row from a spreadsheet line. Missing trailing cells are empty,
    /// cells past the fourth are ignored.
    pub fn from_cells(cells: &[String]) -> Self {
        let cell = |idx: usize| cells.get(idx).map(String::as_str).unwrap_or("");
        Self::new(cell(0), cell(1), cell(2), cell(3))
    }

    pub fn to_cells(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            self.age.clone(),
            self.email.clone(),
        ]
    }

    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }

    /// True when the non-key columns differ.
    pub fn differs_from(&self, other: &Row) -> bool {
        self.name != other.name || self.age != other.age || self.email != other.email
    }
}

/// Canonicalize an age cell.
///
/// Integral numbers in any textual form ("31", " 31 ", "31.0", "+31") become
/// "31". Anything else is trimmed and kept as-is.
pub fn normalize_age(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return n.to_string();
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
            (f as i64).to_string()
        }
        _ => trimmed.to_string(),
    }
}
