//! Query execution lifecycle: submit, poll, page.

use std::time::{Duration, Instant};

use aws_config::BehaviorVersion;
use aws_sdk_athena::types::QueryExecutionState;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::AthenaConfig;
use crate::output::{zip_row, QueryOutput};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Terminal disposition of a failed execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecState {
    /// The engine reported FAILED; the reason is its verbatim message.
    Failed,
    /// The engine (or an operator) cancelled the query.
    Cancelled,
    /// Polling hit the configured deadline.
    Timeout,
    /// SDK or transport failure outside the engine's state machine.
    Internal,
}

/// Errors that can occur while running a query.
#[derive(Debug, Clone, thiserror::Error)]
#[error("query {} {state:?}: {reason}", query_id.as_deref().unwrap_or("(not started)"))]
pub struct ExecError {
    pub state: ExecState,
    pub reason: String,
    pub query_id: Option<String>,
}

impl ExecError {
    fn internal(reason: impl Into<String>) -> Self {
        Self {
            state: ExecState::Internal,
            reason: reason.into(),
            query_id: None,
        }
    }

    /// Only engine-reported FAILED carries a message the model can act on;
    /// timeouts and cancellations are not worth a repair round.
    pub fn is_repairable(&self) -> bool {
        self.state == ExecState::Failed
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Seam over query execution so the correction loop can run against a
/// scripted engine in tests.
#[async_trait::async_trait]
pub trait QueryRunner: Send + Sync {
    async fn run(&self, sql: &str) -> Result<QueryOutput, ExecError>;
}

/// Executes SQL against AWS Athena.
///
/// The full lifecycle per query:
/// 1. Start query execution; capture the query ID.
/// 2. Poll at a fixed interval until a terminal state or the deadline.
/// 3. On SUCCEEDED, page through results (header row dropped, cells
///    coerced, capped at `max_rows`).
pub struct AthenaRunner {
    config: AthenaConfig,
    client: aws_sdk_athena::Client,
}

impl AthenaRunner {
    /// Create a new runner from the given configuration.
    pub async fn new(config: AthenaConfig) -> Self {
        let region = aws_sdk_athena::config::Region::new(config.region.clone());
        let aws_cfg = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .load()
            .await;

        let client = aws_sdk_athena::Client::new(&aws_cfg);

        info!(
            region = %config.region,
            database = %config.database,
            workgroup = %config.workgroup,
            "AthenaRunner initialised"
        );

        Self { config, client }
    }

    async fn submit(&self, sql: &str) -> Result<String, ExecError> {
        let start_resp = self
            .client
            .start_query_execution()
            .query_string(sql)
            .query_execution_context(
                aws_sdk_athena::types::QueryExecutionContext::builder()
                    .database(&self.config.database)
                    .build(),
            )
            .result_configuration(
                aws_sdk_athena::types::ResultConfiguration::builder()
                    .output_location(&self.config.output_location)
                    .build(),
            )
            .work_group(&self.config.workgroup)
            .send()
            .await
            .map_err(|e| ExecError::internal(e.to_string()))?;

        start_resp
            .query_execution_id()
            .map(|s| s.to_string())
            .ok_or_else(|| ExecError::internal("no query execution ID returned"))
    }

    /// Poll `GetQueryExecution` at the configured interval until the query
    /// reaches a terminal state or the deadline passes. On deadline the
    /// query is cancelled best-effort and TIMEOUT is reported.
    async fn poll_until_complete(
        &self,
        query_id: &str,
    ) -> Result<aws_sdk_athena::types::QueryExecution, ExecError> {
        let start = Instant::now();
        let deadline = Duration::from_millis(self.config.max_wait_ms);
        let interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            let resp = self
                .client
                .get_query_execution()
                .query_execution_id(query_id)
                .send()
                .await
                .map_err(|e| ExecError {
                    state: ExecState::Internal,
                    reason: e.to_string(),
                    query_id: Some(query_id.to_string()),
                })?;

            let qe = resp
                .query_execution()
                .ok_or_else(|| ExecError {
                    state: ExecState::Internal,
                    reason: "no query execution in response".into(),
                    query_id: Some(query_id.to_string()),
                })?
                .clone();

            let state = qe
                .status()
                .and_then(|s| s.state())
                .cloned()
                .unwrap_or(QueryExecutionState::Queued);

            debug!(
                query_id = %query_id,
                state = ?state,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Polling query status"
            );

            match state {
                QueryExecutionState::Succeeded => return Ok(qe),

                QueryExecutionState::Failed => {
                    let reason = qe
                        .status()
                        .and_then(|s| s.state_change_reason())
                        .unwrap_or("unknown")
                        .to_string();

                    error!(query_id = %query_id, reason = %reason, "Query failed");
                    return Err(ExecError {
                        state: ExecState::Failed,
                        reason,
                        query_id: Some(query_id.to_string()),
                    });
                }

                QueryExecutionState::Cancelled => {
                    let reason = qe
                        .status()
                        .and_then(|s| s.state_change_reason())
                        .unwrap_or("cancelled")
                        .to_string();

                    warn!(query_id = %query_id, "Query was cancelled");
                    return Err(ExecError {
                        state: ExecState::Cancelled,
                        reason,
                        query_id: Some(query_id.to_string()),
                    });
                }

                // Queued | Running | unknown future variant
                _ => {}
            }

            if start.elapsed() + interval > deadline {
                warn!(
                    query_id = %query_id,
                    max_wait_ms = self.config.max_wait_ms,
                    "Query deadline reached, cancelling"
                );
                // Best-effort cancel — ignore errors from the cancel itself
                let _ = self
                    .client
                    .stop_query_execution()
                    .query_execution_id(query_id)
                    .send()
                    .await;
                return Err(ExecError {
                    state: ExecState::Timeout,
                    reason: format!("no terminal state within {}ms", self.config.max_wait_ms),
                    query_id: Some(query_id.to_string()),
                });
            }

            tokio::time::sleep(interval).await;
        }
    }

    /// Page through `GetQueryResults`, dropping the header row and capping
    /// at `max_rows`. Pages past the cap are never requested.
    async fn page_results(
        &self,
        query_id: &str,
        qe: &aws_sdk_athena::types::QueryExecution,
    ) -> Result<QueryOutput, ExecError> {
        let mut columns: Vec<String> = Vec::new();
        let mut rows: Vec<serde_json::Map<String, serde_json::Value>> = Vec::new();
        let mut next_token: Option<String> = None;
        let mut first_page = true;

        loop {
            let mut req = self
                .client
                .get_query_results()
                .query_execution_id(query_id)
                .max_results((self.config.max_rows as i32 + 1).min(1000));
            if let Some(tok) = &next_token {
                req = req.next_token(tok);
            }

            let output = req.send().await.map_err(|e| ExecError {
                state: ExecState::Internal,
                reason: e.to_string(),
                query_id: Some(query_id.to_string()),
            })?;

            let result_set = output.result_set().ok_or_else(|| ExecError {
                state: ExecState::Internal,
                reason: "no result set in response".into(),
                query_id: Some(query_id.to_string()),
            })?;

            if columns.is_empty() {
                columns = result_set
                    .result_set_metadata()
                    .map(|meta| {
                        meta.column_info()
                            .iter()
                            .map(|ci| ci.name().to_string())
                            .collect()
                    })
                    .unwrap_or_default();
            }

            // The first row of the first page echoes the column headers.
            let skip = if first_page { 1 } else { 0 };
            first_page = false;

            for raw in result_set.rows().iter().skip(skip) {
                if rows.len() >= self.config.max_rows {
                    break;
                }
                let cells: Vec<Option<String>> = raw
                    .data()
                    .iter()
                    .map(|datum| datum.var_char_value().map(|v| v.to_string()))
                    .collect();
                rows.push(zip_row(&columns, &cells));
            }

            next_token = output.next_token().map(|s| s.to_string());
            if next_token.is_none() || rows.len() >= self.config.max_rows {
                break;
            }
        }

        let stats = qe.statistics();
        let out = QueryOutput {
            query_id: query_id.to_string(),
            columns,
            rows,
            bytes_scanned: stats.and_then(|s| s.data_scanned_in_bytes()).unwrap_or(0) as u64,
            engine_ms: stats
                .and_then(|s| s.engine_execution_time_in_millis())
                .unwrap_or(0) as u64,
        };

        info!(
            query_id = %query_id,
            rows = out.rows.len(),
            bytes_scanned = out.bytes_scanned,
            engine_ms = out.engine_ms,
            cost_usd = format!("{:.6}", out.cost_estimate_usd()),
            "Query completed"
        );

        Ok(out)
    }
}

#[async_trait::async_trait]
impl QueryRunner for AthenaRunner {
    async fn run(&self, sql: &str) -> Result<QueryOutput, ExecError> {
        debug!(sql = %sql, "Starting Athena query");

        let query_id = self.submit(sql).await?;
        let qe = self.poll_until_complete(&query_id).await?;
        self.page_results(&query_id, &qe).await
    }
}

// ---------------------------------------------------------------------------
// Tests — error semantics only, no AWS calls
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_failed_is_repairable() {
        let failed = ExecError {
            state: ExecState::Failed,
            reason: "SYNTAX_ERROR: column netrevenue does not exist".into(),
            query_id: Some("q-1".into()),
        };
        assert!(failed.is_repairable());

        for state in [ExecState::Cancelled, ExecState::Timeout, ExecState::Internal] {
            let err = ExecError {
                state,
                reason: "x".into(),
                query_id: None,
            };
            assert!(!err.is_repairable());
        }
    }

    #[test]
    fn error_display_carries_reason_and_id() {
        let err = ExecError {
            state: ExecState::Failed,
            reason: "SYNTAX_ERROR: bad column".into(),
            query_id: Some("abc-123".into()),
        };
        let text = err.to_string();
        assert!(text.contains("abc-123"));
        assert!(text.contains("SYNTAX_ERROR"));

        let err = ExecError::internal("no credentials");
        assert!(err.to_string().contains("(not started)"));
    }
}
