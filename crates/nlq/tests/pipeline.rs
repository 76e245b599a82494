//! End-to-end pipeline scenarios against scripted collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;

use shopsight_athena::{ExecError, ExecState, QueryOutput, QueryRunner};
use shopsight_catalog::{ColumnDef, SchemaError, TableCatalog, TableSchema};
use shopsight_core::config::PolicyConfig;
use shopsight_core::{AskRequest, Caller};
use shopsight_llm::{Decoding, LlmError, LlmProvider, NlqModel, Prompt};
use shopsight_nlq::{MemoryCache, NlqPipeline};
use shopsight_tenancy::{ShopDirectory, TenancyError};

const TODAY: &str = "2026-01-19";

// ── Doubles ──────────────────────────────────────────────────────

struct StaticCatalog;

#[async_trait]
impl TableCatalog for StaticCatalog {
    async fn load(&self) -> Result<TableSchema, SchemaError> {
        Ok(TableSchema::new(
            "analytics",
            "daily_metrics",
            "s3://warehouse/daily_metrics/",
            vec![
                ColumnDef { name: "shop_id".into(), data_type: "string".into() },
                ColumnDef { name: "net_revenue".into(), data_type: "double".into() },
                ColumnDef { name: "order_count".into(), data_type: "bigint".into() },
            ],
            vec![ColumnDef { name: "dt".into(), data_type: "date".into() }],
        ))
    }
}

struct StaticDirectory {
    shops: Vec<String>,
}

#[async_trait]
impl ShopDirectory for StaticDirectory {
    async fn shops_for(&self, _caller: &Caller) -> Result<Vec<String>, TenancyError> {
        Ok(self.shops.clone())
    }
}

struct ScriptedModel {
    replies: Mutex<Vec<Result<String, LlmError>>>,
}

#[async_trait]
impl LlmProvider for ScriptedModel {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, _prompt: &Prompt, _decoding: &Decoding) -> Result<String, LlmError> {
        self.replies.lock().unwrap().remove(0)
    }
}

struct CountingRunner {
    outcomes: Mutex<Vec<Result<QueryOutput, ExecError>>>,
    calls: AtomicUsize,
}

impl CountingRunner {
    fn new(outcomes: Vec<Result<QueryOutput, ExecError>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes),
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryRunner for CountingRunner {
    async fn run(&self, _sql: &str) -> Result<QueryOutput, ExecError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcomes.lock().unwrap().remove(0)
    }
}

// ── Fixtures ─────────────────────────────────────────────────────

fn policy() -> PolicyConfig {
    PolicyConfig {
        max_days_lookback: 90,
        timezone: "Asia/Ho_Chi_Minh".into(),
        max_fix_attempts: 2,
        cache_ttl_seconds: 600,
    }
}

fn sql_reply(sql: &str) -> Result<String, LlmError> {
    Ok(serde_json::json!({
        "sql": sql,
        "confidence": 0.9,
        "assumptions": ["revenue means net_revenue"],
        "needs_clarification": false,
    })
    .to_string())
}

fn scalar_output() -> QueryOutput {
    let mut row = serde_json::Map::new();
    row.insert("total_net_revenue".into(), serde_json::Value::from(12345.67));
    QueryOutput {
        query_id: "q-1".into(),
        columns: vec!["total_net_revenue".into()],
        rows: vec![row],
        bytes_scanned: 2048,
        engine_ms: 640,
    }
}

const GOOD_SQL: &str = "SELECT COALESCE(SUM(net_revenue),0) AS total_net_revenue \
                        FROM daily_metrics WHERE dt >= date '2025-10-21' \
                        AND shop_id IN ('a.myshopify.com')";

fn pipeline(
    replies: Vec<Result<String, LlmError>>,
    runner: Arc<CountingRunner>,
    cache: Arc<MemoryCache>,
) -> NlqPipeline {
    let model = NlqModel::new(
        Box::new(ScriptedModel {
            replies: Mutex::new(replies),
        }),
        0.0,
        1200,
    );
    NlqPipeline::new(
        Arc::new(StaticCatalog),
        Arc::new(StaticDirectory {
            shops: vec!["a.myshopify.com".into(), "b.myshopify.com".into()],
        }),
        cache,
        model,
        runner,
        policy(),
    )
}

fn ask(question: &str) -> AskRequest {
    serde_json::from_value(serde_json::json!({ "question": question })).unwrap()
}

fn today() -> NaiveDate {
    TODAY.parse().unwrap()
}

// ── Scenarios ────────────────────────────────────────────────────

#[tokio::test]
async fn happy_path_scalar() {
    let runner = CountingRunner::new(vec![Ok(scalar_output())]);
    let p = pipeline(vec![sql_reply(GOOD_SQL)], runner.clone(), Arc::new(MemoryCache::new(600)));

    let resp = p
        .answer_at(&Caller::new("u-1"), &ask("total net revenue?"), today())
        .await
        .unwrap();

    let json = serde_json::to_value(&resp).unwrap();
    assert_eq!(json["type"], "result");
    assert_eq!(json["cached"], false);
    assert_eq!(json["result"]["kind"], "scalar");
    assert_eq!(json["result"]["value"], 12345.67);
    assert_eq!(json["query_id"], "q-1");
    assert_eq!(json["scanned_bytes"], 2048);
    assert_eq!(runner.call_count(), 1);
}

#[tokio::test]
async fn tenant_violation_is_rejected() {
    let runner = CountingRunner::new(vec![]);
    let bad = "SELECT SUM(net_revenue) FROM daily_metrics \
               WHERE shop_id = 'c.myshopify.com' AND dt >= date '2026-01-01'";
    let p = pipeline(vec![sql_reply(bad)], runner.clone(), Arc::new(MemoryCache::new(600)));

    let resp = p
        .answer_at(&Caller::new("u-1"), &ask("revenue for shop c?"), today())
        .await
        .unwrap();

    let json = serde_json::to_value(&resp).unwrap();
    assert_eq!(json["type"], "sql_rejected");
    assert!(json["reason"]
        .as_str()
        .unwrap()
        .contains("shop_id value not allowed"));
    assert_eq!(runner.call_count(), 0);
}

#[tokio::test]
async fn missing_partition_lower_bound_is_rejected() {
    let runner = CountingRunner::new(vec![]);
    let bad = "SELECT SUM(net_revenue) FROM daily_metrics \
               WHERE dt <= date '2026-01-19' AND shop_id IN ('a.myshopify.com')";
    let p = pipeline(vec![sql_reply(bad)], runner.clone(), Arc::new(MemoryCache::new(600)));

    let resp = p
        .answer_at(&Caller::new("u-1"), &ask("all-time revenue?"), today())
        .await
        .unwrap();

    let json = serde_json::to_value(&resp).unwrap();
    assert_eq!(json["type"], "sql_rejected");
    assert!(json["reason"]
        .as_str()
        .unwrap()
        .contains("lower bound"));
}

#[tokio::test]
async fn self_correction_recovers() {
    let runner = CountingRunner::new(vec![
        Err(ExecError {
            state: ExecState::Failed,
            reason: "SYNTAX_ERROR: column netrevenue does not exist".into(),
            query_id: Some("q-0".into()),
        }),
        Ok(scalar_output()),
    ]);
    let broken = "SELECT COALESCE(SUM(netrevenue),0) AS total_net_revenue \
                  FROM daily_metrics WHERE dt >= date '2025-10-21' \
                  AND shop_id IN ('a.myshopify.com')";
    let p = pipeline(
        vec![sql_reply(broken), sql_reply(GOOD_SQL)],
        runner.clone(),
        Arc::new(MemoryCache::new(600)),
    );

    let resp = p
        .answer_at(&Caller::new("u-1"), &ask("total net revenue?"), today())
        .await
        .unwrap();

    let json = serde_json::to_value(&resp).unwrap();
    assert_eq!(json["type"], "result");
    assert_eq!(json["cached"], false);
    assert_eq!(runner.call_count(), 2);
}

#[tokio::test]
async fn cache_hit_skips_executor() {
    let cache = Arc::new(MemoryCache::new(600));
    let runner = CountingRunner::new(vec![Ok(scalar_output())]);
    let p = pipeline(vec![sql_reply(GOOD_SQL)], runner.clone(), cache.clone());

    let first = p
        .answer_at(&Caller::new("u-1"), &ask("Total Net Revenue?"), today())
        .await
        .unwrap();
    assert_eq!(serde_json::to_value(&first).unwrap()["cached"], false);
    assert_eq!(runner.call_count(), 1);

    // Same question differing only in case/whitespace: same cache slot.
    let second = p
        .answer_at(&Caller::new("u-1"), &ask("  total   net revenue? "), today())
        .await
        .unwrap();

    let json = serde_json::to_value(&second).unwrap();
    assert_eq!(json["type"], "result");
    assert_eq!(json["cached"], true);
    assert_eq!(json["result"]["value"], 12345.67);
    // Executor was not invoked again.
    assert_eq!(runner.call_count(), 1);
}

#[tokio::test]
async fn clarification_is_not_cached() {
    let cache = Arc::new(MemoryCache::new(600));
    let runner = CountingRunner::new(vec![]);
    let reply = serde_json::json!({
        "needs_clarification": true,
        "clarifying_question": "Which metric defines best? net revenue, gross, or order count?",
        "confidence": 0.2,
    })
    .to_string();
    let p = pipeline(vec![Ok(reply)], runner.clone(), cache.clone());

    let resp = p
        .answer_at(&Caller::new("u-1"), &ask("best shop?"), today())
        .await
        .unwrap();

    let json = serde_json::to_value(&resp).unwrap();
    assert_eq!(json["type"], "clarification");
    assert_eq!(
        json["clarifying_question"],
        "Which metric defines best? net revenue, gross, or order count?"
    );
    assert!(cache.is_empty());
    assert_eq!(runner.call_count(), 0);
}

#[tokio::test]
async fn exhausted_repairs_surface_athena_failed() {
    let engine_err = || {
        Err(ExecError {
            state: ExecState::Failed,
            reason: "SYNTAX_ERROR: line 1".into(),
            query_id: Some("q-0".into()),
        })
    };
    let runner = CountingRunner::new(vec![engine_err(), engine_err(), engine_err()]);
    let cache = Arc::new(MemoryCache::new(600));
    let p = pipeline(
        vec![sql_reply(GOOD_SQL), sql_reply(GOOD_SQL), sql_reply(GOOD_SQL)],
        runner.clone(),
        cache.clone(),
    );

    let resp = p
        .answer_at(&Caller::new("u-1"), &ask("total net revenue?"), today())
        .await
        .unwrap();

    let json = serde_json::to_value(&resp).unwrap();
    assert_eq!(json["type"], "athena_failed");
    assert!(json["error"].as_str().unwrap().contains("SYNTAX_ERROR"));
    // max_fix_attempts + 1 executions, nothing cached.
    assert_eq!(runner.call_count(), 3);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn requested_subset_scopes_the_allowlist() {
    let runner = CountingRunner::new(vec![]);
    // Requests shop b only; the model emits shop a, which must be rejected.
    let p = pipeline(
        vec![sql_reply(GOOD_SQL)],
        runner.clone(),
        Arc::new(MemoryCache::new(600)),
    );

    let req: AskRequest = serde_json::from_value(serde_json::json!({
        "question": "total net revenue?",
        "shop_ids": ["b.myshopify.com"],
    }))
    .unwrap();

    let resp = p.answer_at(&Caller::new("u-1"), &req, today()).await.unwrap();
    let json = serde_json::to_value(&resp).unwrap();
    assert_eq!(json["type"], "sql_rejected");
}

#[tokio::test]
async fn disjoint_request_yields_no_shops() {
    let runner = CountingRunner::new(vec![]);
    let p = pipeline(vec![], runner.clone(), Arc::new(MemoryCache::new(600)));

    let req: AskRequest = serde_json::from_value(serde_json::json!({
        "question": "total net revenue?",
        "shop_ids": ["c.myshopify.com"],
    }))
    .unwrap();

    let resp = p.answer_at(&Caller::new("u-1"), &req, today()).await.unwrap();
    let json = serde_json::to_value(&resp).unwrap();
    assert_eq!(json["type"], "no_shops");
}

#[tokio::test]
async fn blank_question_is_invalid_input() {
    let runner = CountingRunner::new(vec![]);
    let p = pipeline(vec![], runner.clone(), Arc::new(MemoryCache::new(600)));

    let err = p
        .answer_at(&Caller::new("u-1"), &ask("   "), today())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("question is empty"));
}

#[tokio::test]
async fn different_callers_do_not_share_cache() {
    let cache = Arc::new(MemoryCache::new(600));
    let runner = CountingRunner::new(vec![Ok(scalar_output()), Ok(scalar_output())]);
    let p = pipeline(
        vec![sql_reply(GOOD_SQL), sql_reply(GOOD_SQL)],
        runner.clone(),
        cache.clone(),
    );

    p.answer_at(&Caller::new("u-1"), &ask("total net revenue?"), today())
        .await
        .unwrap();
    let second = p
        .answer_at(&Caller::new("u-2"), &ask("total net revenue?"), today())
        .await
        .unwrap();

    assert_eq!(serde_json::to_value(&second).unwrap()["cached"], false);
    assert_eq!(runner.call_count(), 2);
    assert_eq!(cache.len(), 2);
}
