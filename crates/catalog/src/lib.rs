//! Analytics table schema discovery.
//!
//! Loads the partitioned warehouse table's definition from the Glue Data
//! Catalog and renders it into the compact, deterministic text embedded in
//! LLM prompts. The SHA-256 of that rendering doubles as the cache
//! invalidation hash: any column change produces a new hash and silently
//! retires stale cached answers.

pub mod glue;
pub mod schema;

pub use glue::GlueCatalog;
pub use schema::{ColumnDef, SchemaError, TableCatalog, TableSchema};
