//! Content-addressed, per-caller result cache.
//!
//! Keys fold in the sorted allowlist and the schema hash: two callers with
//! identical permissions never share a slot unless their identity matches,
//! and any schema change silently retires every prior entry. Only
//! successful `result` envelopes are stored, and a write failure must never
//! fail the request it caches.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::envelope::AskResponse;

/// Lowercase and collapse whitespace so trivially-different phrasings of
/// the same question share a cache slot.
pub fn normalize_question(q: &str) -> String {
    q.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Identity of one cacheable answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    caller_id: String,
    allowed_shops: Vec<String>,
    question: String,
    today: NaiveDate,
    max_days_lookback: u32,
    schema_hash: String,
}

impl CacheKey {
    pub fn new(
        caller_id: impl Into<String>,
        allowed_shops: &[String],
        question: &str,
        today: NaiveDate,
        max_days_lookback: u32,
        schema_hash: impl Into<String>,
    ) -> Self {
        let mut shops: Vec<String> = allowed_shops.iter().map(|s| s.to_lowercase()).collect();
        shops.sort();
        shops.dedup();
        Self {
            caller_id: caller_id.into(),
            allowed_shops: shops,
            question: normalize_question(question),
            today,
            max_days_lookback,
            schema_hash: schema_hash.into(),
        }
    }

    /// Partition key for the store: the caller identity.
    pub fn partition_key(&self) -> &str {
        &self.caller_id
    }

    /// Sort key: `NLQ#<sha256 of the key material>`.
    pub fn sort_key(&self) -> String {
        let material = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            self.caller_id,
            self.allowed_shops.join(","),
            self.question,
            self.today,
            self.max_days_lookback,
            self.schema_hash,
        );
        let digest = Sha256::digest(material.as_bytes());
        format!("NLQ#{digest:x}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache store error: {0}")]
    Store(String),
    #[error("cache payload error: {0}")]
    Codec(String),
}

/// Seam over the cache store.
#[async_trait::async_trait]
pub trait ResponseCache: Send + Sync {
    /// Look up an unexpired entry. `None` is a miss.
    async fn get(&self, key: &CacheKey) -> Result<Option<AskResponse>, CacheError>;
    /// Store a successful envelope under the key.
    async fn put(&self, key: &CacheKey, response: &AskResponse) -> Result<(), CacheError>;
}

fn epoch_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ---------------------------------------------------------------------------
// DynamoDB store
// ---------------------------------------------------------------------------

/// DynamoDB-backed cache. Table layout: `CallerId` partition key,
/// `EntryKey` sort key, `Payload`/`CreatedAt`/`ExpiresAt` attributes, with
/// native TTL on `ExpiresAt`.
pub struct DynamoCache {
    table: String,
    ttl_seconds: u64,
    client: aws_sdk_dynamodb::Client,
}

impl DynamoCache {
    pub async fn new(table: String, ttl_seconds: u64) -> Self {
        let aws_cfg = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let client = aws_sdk_dynamodb::Client::new(&aws_cfg);

        info!(table = %table, ttl_seconds, "DynamoCache initialised");

        Self {
            table,
            ttl_seconds,
            client,
        }
    }

    pub fn with_client(table: String, ttl_seconds: u64, client: aws_sdk_dynamodb::Client) -> Self {
        Self {
            table,
            ttl_seconds,
            client,
        }
    }
}

#[async_trait::async_trait]
impl ResponseCache for DynamoCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<AskResponse>, CacheError> {
        let resp = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("CallerId", AttributeValue::S(key.partition_key().to_string()))
            .key("EntryKey", AttributeValue::S(key.sort_key()))
            .send()
            .await
            .map_err(|e| CacheError::Store(e.to_string()))?;

        let Some(item) = resp.item() else {
            return Ok(None);
        };

        // DynamoDB TTL deletion is lazy; an expired item may still be read.
        let expires_at: u64 = item
            .get("ExpiresAt")
            .and_then(|v| v.as_n().ok())
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        if expires_at <= epoch_now() {
            debug!("Cache item present but expired");
            return Ok(None);
        }

        let payload = item
            .get("Payload")
            .and_then(|v| v.as_s().ok())
            .ok_or_else(|| CacheError::Codec("missing Payload attribute".into()))?;

        let response: AskResponse =
            serde_json::from_str(payload).map_err(|e| CacheError::Codec(e.to_string()))?;
        Ok(Some(response))
    }

    async fn put(&self, key: &CacheKey, response: &AskResponse) -> Result<(), CacheError> {
        let payload =
            serde_json::to_string(response).map_err(|e| CacheError::Codec(e.to_string()))?;
        let now = epoch_now();

        self.client
            .put_item()
            .table_name(&self.table)
            .item("CallerId", AttributeValue::S(key.partition_key().to_string()))
            .item("EntryKey", AttributeValue::S(key.sort_key()))
            .item("Payload", AttributeValue::S(payload))
            .item("CreatedAt", AttributeValue::N(now.to_string()))
            .item(
                "ExpiresAt",
                AttributeValue::N((now + self.ttl_seconds).to_string()),
            )
            .send()
            .await
            .map_err(|e| CacheError::Store(e.to_string()))?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Process-local cache for tests and local development.
pub struct MemoryCache {
    ttl_seconds: u64,
    entries: Mutex<HashMap<(String, String), (String, u64)>>,
}

impl MemoryCache {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            ttl_seconds,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl ResponseCache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<AskResponse>, CacheError> {
        let entries = self.entries.lock().unwrap();
        let Some((payload, expires_at)) =
            entries.get(&(key.partition_key().to_string(), key.sort_key()))
        else {
            return Ok(None);
        };
        if *expires_at <= epoch_now() {
            return Ok(None);
        }
        let response: AskResponse =
            serde_json::from_str(payload).map_err(|e| CacheError::Codec(e.to_string()))?;
        Ok(Some(response))
    }

    async fn put(&self, key: &CacheKey, response: &AskResponse) -> Result<(), CacheError> {
        let payload =
            serde_json::to_string(response).map_err(|e| CacheError::Codec(e.to_string()))?;
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            (key.partition_key().to_string(), key.sort_key()),
            (payload, epoch_now() + self.ttl_seconds),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::shape;

    fn key(caller: &str, shops: &[&str], question: &str, schema_hash: &str) -> CacheKey {
        let shops: Vec<String> = shops.iter().map(|s| s.to_string()).collect();
        CacheKey::new(
            caller,
            &shops,
            question,
            NaiveDate::from_ymd_opt(2026, 1, 19).unwrap(),
            90,
            schema_hash,
        )
    }

    fn result_envelope() -> AskResponse {
        AskResponse::Result {
            cached: false,
            sql: "SELECT 1".into(),
            assumptions: vec![],
            confidence: 1.0,
            result: shape(vec![], vec![]),
            query_id: "q-1".into(),
            scanned_bytes: 0,
            exec_ms: 0,
        }
    }

    #[test]
    fn normalize_question_folds_case_and_whitespace() {
        assert_eq!(
            normalize_question("  Total   NET revenue\tlast month? "),
            "total net revenue last month?"
        );
    }

    #[test]
    fn normalize_question_is_idempotent() {
        let once = normalize_question("Total   Net  Revenue");
        assert_eq!(normalize_question(&once), once);
    }

    #[test]
    fn sort_key_is_stable_under_shop_permutation() {
        let a = key("u-1", &["b.myshopify.com", "a.myshopify.com"], "q", "h");
        let b = key("u-1", &["a.myshopify.com", "B.MYSHOPIFY.COM"], "q", "h");
        assert_eq!(a.sort_key(), b.sort_key());
    }

    #[test]
    fn sort_key_differs_per_caller_and_schema() {
        let base = key("u-1", &["a.myshopify.com"], "q", "h1");
        assert_ne!(
            base.sort_key(),
            key("u-2", &["a.myshopify.com"], "q", "h1").sort_key()
        );
        assert_ne!(
            base.sort_key(),
            key("u-1", &["a.myshopify.com"], "q", "h2").sort_key()
        );
        assert_ne!(
            base.sort_key(),
            key("u-1", &["b.myshopify.com"], "q", "h1").sort_key()
        );
    }

    #[test]
    fn sort_key_shape() {
        let k = key("u-1", &["a.myshopify.com"], "q", "h");
        let sk = k.sort_key();
        assert!(sk.starts_with("NLQ#"));
        assert_eq!(sk.len(), 4 + 64);
    }

    #[tokio::test]
    async fn memory_cache_round_trip() {
        let cache = MemoryCache::new(600);
        let k = key("u-1", &["a.myshopify.com"], "q", "h");

        assert!(cache.get(&k).await.unwrap().is_none());

        cache.put(&k, &result_envelope()).await.unwrap();
        let hit = cache.get(&k).await.unwrap().unwrap();
        assert!(hit.is_cacheable());
    }

    #[tokio::test]
    async fn memory_cache_put_is_idempotent() {
        let cache = MemoryCache::new(600);
        let k = key("u-1", &["a.myshopify.com"], "q", "h");

        cache.put(&k, &result_envelope()).await.unwrap();
        cache.put(&k, &result_envelope()).await.unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn memory_cache_expires() {
        let cache = MemoryCache::new(0);
        let k = key("u-1", &["a.myshopify.com"], "q", "h");

        cache.put(&k, &result_envelope()).await.unwrap();
        assert!(cache.get(&k).await.unwrap().is_none());
    }
}
