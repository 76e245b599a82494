//! Request orchestration: one call per question, end to end.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

use shopsight_athena::QueryRunner;
use shopsight_catalog::{SchemaError, TableCatalog};
use shopsight_core::config::PolicyConfig;
use shopsight_core::{AskRequest, Caller};
use shopsight_llm::{ModelError, NlqModel};
use shopsight_sqlguard::ValidateOptions;
use shopsight_tenancy::{effective_allowlist, ShopDirectory, TenancyError};

use crate::cache::{CacheKey, ResponseCache};
use crate::controller::{correct_and_execute, Outcome};
use crate::envelope::AskResponse;
use crate::prompt::PromptContext;
use crate::shape::shape;

/// Failures that surface as HTTP errors rather than answer envelopes.
#[derive(Debug, thiserror::Error)]
pub enum AskError {
    #[error("invalid input: {0}")]
    InputInvalid(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("tenancy lookup failed: {0}")]
    TenancyStore(String),

    #[error(transparent)]
    Model(ModelError),
}

/// The wired NLQ pipeline. Stateless across requests; every field is a
/// shared, concurrency-safe collaborator.
pub struct NlqPipeline {
    catalog: Arc<dyn TableCatalog>,
    directory: Arc<dyn ShopDirectory>,
    cache: Arc<dyn ResponseCache>,
    model: NlqModel,
    runner: Arc<dyn QueryRunner>,
    policy: PolicyConfig,
}

impl NlqPipeline {
    pub fn new(
        catalog: Arc<dyn TableCatalog>,
        directory: Arc<dyn ShopDirectory>,
        cache: Arc<dyn ResponseCache>,
        model: NlqModel,
        runner: Arc<dyn QueryRunner>,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            catalog,
            directory,
            cache,
            model,
            runner,
            policy,
        }
    }

    /// Answer one question, computing "today" in the configured timezone
    /// at the start of the request.
    pub async fn answer(&self, caller: &Caller, req: &AskRequest) -> Result<AskResponse, AskError> {
        let today = Utc::now().with_timezone(&self.policy.tz()).date_naive();
        self.answer_at(caller, req, today).await
    }

    /// Answer with an explicit request date. Split out so tests can pin the
    /// calendar.
    pub async fn answer_at(
        &self,
        caller: &Caller,
        req: &AskRequest,
        today: NaiveDate,
    ) -> Result<AskResponse, AskError> {
        if req.is_blank() {
            return Err(AskError::InputInvalid("question is empty".into()));
        }

        // ── Tenancy ──────────────────────────────────────────────
        let allowed = self
            .directory
            .shops_for(caller)
            .await
            .map_err(|e| AskError::TenancyStore(e.to_string()))?;

        let effective = match effective_allowlist(caller, &req.shop_ids, &allowed) {
            Ok(shops) => shops,
            Err(e @ TenancyError::NotAuthorized(_))
            | Err(e @ TenancyError::NoAllowedShopsInRequest) => {
                info!(user_id = %caller.user_id, "Request has no accessible shops");
                return Ok(AskResponse::NoShops {
                    error: e.to_string(),
                });
            }
            Err(TenancyError::Store(msg)) => return Err(AskError::TenancyStore(msg)),
        };

        // ── Schema ───────────────────────────────────────────────
        let schema = self.catalog.load().await?;
        let schema_text = schema.compact();
        let schema_hash = schema.hash();

        // ── Cache lookup ─────────────────────────────────────────
        let key = CacheKey::new(
            &caller.user_id,
            &effective,
            &req.question,
            today,
            self.policy.max_days_lookback,
            &schema_hash,
        );

        match self.cache.get(&key).await {
            Ok(Some(hit)) => {
                info!(user_id = %caller.user_id, "Cache hit");
                return Ok(hit.mark_cached());
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Cache read failed, continuing"),
        }

        // ── Generate, validate, execute ──────────────────────────
        let opts = ValidateOptions {
            allowed_shops: effective.clone(),
            require_partition_filter: true,
            max_days_lookback: self.policy.max_days_lookback,
            today,
        };
        let ctx = PromptContext {
            question: &req.question,
            schema_text: &schema_text,
            allowed_shops: &effective,
            today,
            max_days_lookback: self.policy.max_days_lookback,
            timezone: &self.policy.timezone,
        };

        let outcome = correct_and_execute(
            &self.model,
            self.runner.as_ref(),
            &opts,
            &ctx,
            self.policy.max_fix_attempts,
        )
        .await
        .map_err(AskError::Model)?;

        let response = match outcome {
            Outcome::Done { output, sql, reply } => AskResponse::Result {
                cached: false,
                sql,
                assumptions: reply.assumptions,
                confidence: reply.confidence,
                result: shape(output.columns, output.rows),
                query_id: output.query_id,
                scanned_bytes: output.bytes_scanned,
                exec_ms: output.engine_ms,
            },
            Outcome::Clarify { reply } => AskResponse::Clarification {
                clarifying_question: reply.clarifying_question.unwrap_or_default(),
                assumptions: reply.assumptions,
                confidence: reply.confidence,
            },
            Outcome::Rejected { reason, sql, reply } => {
                debug!(reason = %reason, "Returning sql_rejected");
                AskResponse::SqlRejected {
                    reason: reason.to_string(),
                    model_sql: sql,
                    assumptions: reply.assumptions,
                    confidence: reply.confidence,
                }
            }
            Outcome::Failed {
                last_sql,
                last_error,
                reply,
            } => AskResponse::AthenaFailed {
                error: last_error,
                last_sql,
                assumptions: reply.assumptions,
                confidence: reply.confidence,
            },
        };

        // ── Cache store (success only, best effort) ──────────────
        if response.is_cacheable() {
            if let Err(e) = self.cache.put(&key, &response).await {
                warn!(error = %e, "Cache write failed, ignoring");
            }
        }

        Ok(response)
    }
}
