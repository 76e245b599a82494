//! HTTP router construction.
//!
//! Assembles the Axum routes, middleware, and OpenAPI docs into a single `Router`.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::api;
use crate::state::AppState;

/// Build the complete application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/ask", post(api::ask))
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(Scalar::with_url("/docs", api::ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    use shopsight_athena::{ExecError, QueryOutput, QueryRunner};
    use shopsight_catalog::{ColumnDef, SchemaError, TableCatalog, TableSchema};
    use shopsight_core::config::PolicyConfig;
    use shopsight_core::Caller;
    use shopsight_llm::{Decoding, LlmError, LlmProvider, NlqModel, Prompt};
    use shopsight_nlq::{MemoryCache, NlqPipeline};
    use shopsight_tenancy::{ShopDirectory, TenancyError};

    struct StaticCatalog;

    #[async_trait]
    impl TableCatalog for StaticCatalog {
        async fn load(&self) -> Result<TableSchema, SchemaError> {
            Ok(TableSchema::new(
                "analytics",
                "daily_metrics",
                "s3://warehouse/daily_metrics/",
                vec![ColumnDef { name: "net_revenue".into(), data_type: "double".into() }],
                vec![ColumnDef { name: "dt".into(), data_type: "date".into() }],
            ))
        }
    }

    struct StaticDirectory;

    #[async_trait]
    impl ShopDirectory for StaticDirectory {
        async fn shops_for(&self, _caller: &Caller) -> Result<Vec<String>, TenancyError> {
            Ok(vec!["a.myshopify.com".into()])
        }
    }

    struct OneShotModel {
        reply: Mutex<Option<String>>,
    }

    #[async_trait]
    impl LlmProvider for OneShotModel {
        fn name(&self) -> &'static str {
            "one-shot"
        }

        async fn complete(
            &self,
            _prompt: &Prompt,
            _decoding: &Decoding,
        ) -> Result<String, LlmError> {
            Ok(self.reply.lock().unwrap().take().expect("model called twice"))
        }
    }

    struct FixedRunner;

    #[async_trait]
    impl QueryRunner for FixedRunner {
        async fn run(&self, _sql: &str) -> Result<QueryOutput, ExecError> {
            let mut row = serde_json::Map::new();
            row.insert("total".into(), serde_json::Value::from(42));
            Ok(QueryOutput {
                query_id: "q-1".into(),
                columns: vec!["total".into()],
                rows: vec![row],
                bytes_scanned: 100,
                engine_ms: 10,
            })
        }
    }

    fn test_state(reply: Option<String>) -> Arc<AppState> {
        let pipeline = reply.map(|r| {
            let model = NlqModel::new(
                Box::new(OneShotModel {
                    reply: Mutex::new(Some(r)),
                }),
                0.0,
                1200,
            );
            NlqPipeline::new(
                Arc::new(StaticCatalog),
                Arc::new(StaticDirectory),
                Arc::new(MemoryCache::new(600)),
                model,
                Arc::new(FixedRunner),
                PolicyConfig {
                    max_days_lookback: 90,
                    timezone: "Asia/Ho_Chi_Minh".into(),
                    max_fix_attempts: 2,
                    cache_ttl_seconds: 600,
                },
            )
        });
        Arc::new(AppState { pipeline })
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_answers() {
        let app = build_router(test_state(None));
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["service"], "shopsight");
    }

    #[tokio::test]
    async fn ask_without_identity_is_unauthorized() {
        let app = build_router(test_state(None));
        let resp = app
            .oneshot(
                Request::post("/ask")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"question": "revenue?"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn ask_without_pipeline_is_service_unavailable() {
        let app = build_router(test_state(None));
        let resp = app
            .oneshot(
                Request::post("/ask")
                    .header("content-type", "application/json")
                    .header("x-user-id", "u-1")
                    .body(Body::from(r#"{"question": "revenue?"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn ask_happy_path() {
        // The pipeline computes "today" in the configured zone at request
        // time; build the SQL's dt bound relative to that.
        let today = chrono::Utc::now()
            .with_timezone(&chrono_tz::Asia::Ho_Chi_Minh)
            .date_naive();
        let bound = today - chrono::Duration::days(30);
        let sql = format!(
            "SELECT COALESCE(SUM(net_revenue),0) AS total FROM daily_metrics \
             WHERE dt >= date '{}' AND shop_id = 'a.myshopify.com'",
            bound
        );
        let reply = serde_json::json!({
            "sql": sql,
            "confidence": 0.9,
            "assumptions": [],
            "needs_clarification": false,
        })
        .to_string();

        let app = build_router(test_state(Some(reply)));
        let resp = app
            .oneshot(
                Request::post("/ask")
                    .header("content-type", "application/json")
                    .header("x-user-id", "u-1")
                    .body(Body::from(r#"{"question": "total revenue last 30 days?"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["type"], "result");
        assert_eq!(json["result"]["kind"], "scalar");
        assert_eq!(json["result"]["value"], 42);
    }
}
