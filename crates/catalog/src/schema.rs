use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Errors that can occur while loading the analytics table schema.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The catalog call failed or the table is unusable.
    #[error("schema unavailable for {database}.{table}: {reason}")]
    Unavailable {
        database: String,
        table: String,
        reason: String,
    },
}

/// A named, typed column (or partition key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
}

/// The analytics table definition as discovered from the metadata catalog.
///
/// `columns` and `partitions` are sorted by name on construction so that
/// the compact rendering, and therefore the schema hash, is stable under
/// any input ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub database: String,
    pub table: String,
    pub location: String,
    pub columns: Vec<ColumnDef>,
    pub partitions: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn new(
        database: impl Into<String>,
        table: impl Into<String>,
        location: impl Into<String>,
        mut columns: Vec<ColumnDef>,
        mut partitions: Vec<ColumnDef>,
    ) -> Self {
        columns.sort_by(|a, b| a.name.cmp(&b.name));
        partitions.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            database: database.into(),
            table: table.into(),
            location: location.into(),
            columns,
            partitions,
        }
    }

    /// Compact textual rendering embedded in prompts and hashed for the cache key.
    ///
    /// ```text
    /// DATABASE analytics
    /// TABLE daily_metrics (
    ///   dt date,
    ///   net_revenue double
    /// )
    /// PARTITIONED BY (dt date)
    /// LOCATION s3://bucket/path/
    /// ```
    pub fn compact(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("DATABASE {}\n", self.database));
        out.push_str(&format!("TABLE {} (\n", self.table));
        for (i, col) in self.columns.iter().enumerate() {
            let sep = if i + 1 < self.columns.len() { "," } else { "" };
            out.push_str(&format!("  {} {}{}\n", col.name, col.data_type, sep));
        }
        out.push_str(")\n");
        if !self.partitions.is_empty() {
            let parts: Vec<String> = self
                .partitions
                .iter()
                .map(|p| format!("{} {}", p.name, p.data_type))
                .collect();
            out.push_str(&format!("PARTITIONED BY ({})\n", parts.join(", ")));
        }
        out.push_str(&format!("LOCATION {}\n", self.location));
        out
    }

    /// SHA-256 hex digest of the compact rendering.
    pub fn hash(&self) -> String {
        let digest = Sha256::digest(self.compact().as_bytes());
        format!("{digest:x}")
    }
}

/// Seam for loading the table schema, so the pipeline can run against a
/// fixed schema in tests.
#[async_trait::async_trait]
pub trait TableCatalog: Send + Sync {
    async fn load(&self) -> Result<TableSchema, SchemaError>;
}
