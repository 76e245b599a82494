//! Glue Data Catalog backend for [`TableCatalog`].

use aws_config::BehaviorVersion;
use tracing::{debug, info};

use shopsight_core::config::CatalogConfig;

use crate::schema::{ColumnDef, SchemaError, TableCatalog, TableSchema};

/// Loads the analytics table definition from the AWS Glue Data Catalog.
pub struct GlueCatalog {
    config: CatalogConfig,
    client: aws_sdk_glue::Client,
}

impl GlueCatalog {
    /// Create a new catalog reader using ambient AWS credentials/region.
    pub async fn new(config: CatalogConfig) -> Self {
        let aws_cfg = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let client = aws_sdk_glue::Client::new(&aws_cfg);

        info!(
            database = %config.database,
            table = %config.table,
            "GlueCatalog initialised"
        );

        Self { config, client }
    }

    fn unavailable(&self, reason: impl Into<String>) -> SchemaError {
        SchemaError::Unavailable {
            database: self.config.database.clone(),
            table: self.config.table.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait::async_trait]
impl TableCatalog for GlueCatalog {
    async fn load(&self) -> Result<TableSchema, SchemaError> {
        let resp = self
            .client
            .get_table()
            .database_name(&self.config.database)
            .name(&self.config.table)
            .send()
            .await
            .map_err(|e| self.unavailable(e.to_string()))?;

        let table = resp
            .table()
            .ok_or_else(|| self.unavailable("no table in response"))?;

        let sd = table
            .storage_descriptor()
            .ok_or_else(|| self.unavailable("no storage descriptor"))?;

        let columns: Vec<ColumnDef> = sd
            .columns()
            .iter()
            .map(|c| ColumnDef {
                name: c.name().to_string(),
                data_type: c.r#type().unwrap_or("string").to_string(),
            })
            .collect();

        if columns.is_empty() {
            return Err(self.unavailable("table has no columns"));
        }

        let partitions: Vec<ColumnDef> = table
            .partition_keys()
            .iter()
            .map(|c| ColumnDef {
                name: c.name().to_string(),
                data_type: c.r#type().unwrap_or("string").to_string(),
            })
            .collect();

        let location = sd.location().unwrap_or_default().to_string();

        let schema = TableSchema::new(
            self.config.database.clone(),
            self.config.table.clone(),
            location,
            columns,
            partitions,
        );

        debug!(
            columns = schema.columns.len(),
            partitions = schema.partitions.len(),
            hash = %schema.hash(),
            "Loaded table schema"
        );

        Ok(schema)
    }
}
