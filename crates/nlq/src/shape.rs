use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result payload shape: a bare scalar for 1×1 results, tabular otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shaped {
    pub kind: ResultKind,
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Scalar,
    Table,
}

/// Collapse a single-row, single-column result to scalar form.
pub fn shape(columns: Vec<String>, rows: Vec<serde_json::Map<String, Value>>) -> Shaped {
    if rows.len() == 1 && columns.len() == 1 {
        let value = rows[0].get(&columns[0]).cloned().unwrap_or(Value::Null);
        return Shaped {
            kind: ResultKind::Scalar,
            columns,
            rows,
            value: Some(value),
        };
    }
    Shaped {
        kind: ResultKind::Table,
        columns,
        rows,
        value: None,
    }
}
