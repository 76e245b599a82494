//! Natural-language query endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use tracing::info;

use shopsight_core::{AskRequest, Caller};
use shopsight_nlq::{AskError, AskResponse};

use crate::state::AppState;

use super::ErrorResponse;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn err(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: msg.into() }))
}

/// The gateway authenticates the request and forwards the identity in
/// headers; we only read them.
fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, ApiError> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(StatusCode::UNAUTHORIZED, "missing caller identity"))?;

    let email = headers
        .get("x-user-email")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    Ok(Caller {
        user_id: user_id.to_string(),
        email,
    })
}

/// Ask a business question
///
/// Translates the question into tenant-scoped, partition-pruned SQL,
/// executes it, and returns the result with provenance.
#[utoipa::path(
    post,
    path = "/ask",
    tag = "NLQ",
    responses(
        (status = 200, description = "Answer envelope", body = Object),
        (status = 400, description = "Invalid input", body = Object),
        (status = 401, description = "Missing caller identity", body = Object),
        (status = 503, description = "Pipeline not configured", body = Object)
    )
)]
pub async fn ask(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let caller = caller_from_headers(&headers)?;

    let pipeline = state.pipeline.as_ref().ok_or_else(|| {
        err(
            StatusCode::SERVICE_UNAVAILABLE,
            "NLQ pipeline not configured. Set LLM credentials and ATHENA_OUTPUT_LOCATION.",
        )
    })?;

    info!(user_id = %caller.user_id, "Handling /ask");

    let response = pipeline.answer(&caller, &req).await.map_err(|e| match e {
        AskError::InputInvalid(msg) => err(StatusCode::BAD_REQUEST, msg),
        AskError::Schema(e) => err(StatusCode::BAD_GATEWAY, e.to_string()),
        AskError::TenancyStore(msg) => err(StatusCode::INTERNAL_SERVER_ERROR, msg),
        AskError::Model(e) => err(StatusCode::BAD_GATEWAY, e.to_string()),
    })?;

    Ok(Json(response))
}
