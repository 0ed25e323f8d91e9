// ABOUTME: Data structures for the Google Sheets values API
// ABOUTME: Converts between JSON cell values and the text cells the sync core uses

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Position of the age cell in a row.
const AGE_COLUMN: usize = 2;

/// Body of `values.get` and `values.update`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub major_dimension: Option<String>,
    /// Absent in responses when the range is empty
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

impl ValueRange {
    /// Row-major value range for a write. Only the age column may become a
    /// number; ids and text columns always go out as strings.
    pub fn rows(range: &str, cells: &[Vec<String>]) -> Self {
        Self {
            range: Some(range.to_string()),
            major_dimension: Some("ROWS".to_string()),
            values: cells
                .iter()
                .map(|row| {
                    row.iter()
                        .enumerate()
                        .map(|(column, cell)| match column {
                            AGE_COLUMN => cell_to_value(cell),
                            _ => Value::String(cell.clone()),
                        })
                        .collect()
                })
                .collect(),
        }
    }

    /// Cell text of every returned row.
    pub fn into_cells(self) -> Vec<Vec<String>> {
        self.values
            .into_iter()
            .map(|row| row.iter().map(value_to_cell).collect())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateValuesResponse {
    pub updated_range: Option<String>,
    pub updated_rows: Option<u64>,
    pub updated_cells: Option<u64>,
}

/// Render a JSON cell as text. Whole floats lose their fraction so `31.0`
/// reads the same as `31`.
pub fn value_to_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                (f as i64).to_string()
            }
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Cells holding a canonical integer are written as numbers, the rest as text.
pub fn cell_to_value(cell: &str) -> Value {
    match cell.parse::<i64>() {
        Ok(n) if n.to_string() == cell => Value::from(n),
        _ => Value::String(cell.to_string()),
    }
}
