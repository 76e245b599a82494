pub mod ask;
pub mod health;

use serde::Serialize;
use utoipa::OpenApi;

pub use ask::ask;
pub use health::health;

/// Error body for non-envelope failures.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(OpenApi)]
#[openapi(
    paths(ask::ask, health::health),
    tags(
        (name = "NLQ", description = "Natural-language analytics queries"),
        (name = "Ops", description = "Service health")
    )
)]
pub struct ApiDoc;
