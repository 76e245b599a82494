//! DynamoDB-backed shop directory.
//!
//! Table layout: partition key = caller identity, one item per accessible
//! shop, each item exposing a `shop` string attribute.

use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::types::AttributeValue;
use tracing::{debug, info};

use shopsight_core::Caller;

use crate::{ShopDirectory, TenancyError};

pub struct DynamoShopDirectory {
    table: String,
    client: aws_sdk_dynamodb::Client,
}

impl DynamoShopDirectory {
    pub async fn new(table: String) -> Self {
        let aws_cfg = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let client = aws_sdk_dynamodb::Client::new(&aws_cfg);

        info!(table = %table, "DynamoShopDirectory initialised");

        Self { table, client }
    }

    /// For wiring against a pre-built client (local stacks, tests).
    pub fn with_client(table: String, client: aws_sdk_dynamodb::Client) -> Self {
        Self { table, client }
    }
}

#[async_trait::async_trait]
impl ShopDirectory for DynamoShopDirectory {
    async fn shops_for(&self, caller: &Caller) -> Result<Vec<String>, TenancyError> {
        let resp = self
            .client
            .query()
            .table_name(&self.table)
            .key_condition_expression("#u = :uid")
            .expression_attribute_names("#u", "user_id")
            .expression_attribute_values(":uid", AttributeValue::S(caller.user_id.clone()))
            .send()
            .await
            .map_err(|e| TenancyError::Store(e.to_string()))?;

        let shops: Vec<String> = resp
            .items()
            .iter()
            .filter_map(|item| item.get("shop"))
            .filter_map(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .collect();

        debug!(
            user_id = %caller.user_id,
            shops = shops.len(),
            "Resolved caller shops"
        );

        Ok(shops)
    }
}
