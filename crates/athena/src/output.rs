use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Athena pricing: $5 per TB scanned.
const DOLLARS_PER_BYTE: f64 = 5.0 / (1024.0 * 1024.0 * 1024.0 * 1024.0);

/// Structured result set from a completed query.
///
/// Each row maps column name to a typed value; ordering within the result
/// follows `columns`. SQL NULL and empty cells are `Value::Null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutput {
    /// Athena query execution ID.
    pub query_id: String,
    /// Column names in result-set order.
    pub columns: Vec<String>,
    /// Row data, capped at the configured row limit.
    pub rows: Vec<serde_json::Map<String, Value>>,
    /// Total bytes scanned during execution.
    pub bytes_scanned: u64,
    /// Engine execution time in milliseconds.
    pub engine_ms: u64,
}

impl QueryOutput {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Estimated query cost in USD under Athena's $5/TB pricing.
    pub fn cost_estimate_usd(&self) -> f64 {
        self.bytes_scanned as f64 * DOLLARS_PER_BYTE
    }
}

/// Coerce one raw cell: try integer, then real, then keep as text.
/// Missing and empty cells become NULL.
pub fn coerce_cell(raw: Option<&str>) -> Value {
    let s = match raw {
        Some(s) if !s.is_empty() => s,
        _ => return Value::Null,
    };
    if let Ok(i) = s.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(s.to_string())
}

/// Zip one raw row onto the column names. Short rows pad with NULL;
/// excess cells are dropped.
pub fn zip_row(columns: &[String], cells: &[Option<String>]) -> serde_json::Map<String, Value> {
    let mut row = serde_json::Map::new();
    for (i, col) in columns.iter().enumerate() {
        let cell = cells.get(i).and_then(|c| c.as_deref());
        row.insert(col.clone(), coerce_cell(cell));
    }
    row
}
