use axum::Json;

/// Service liveness
///
/// Returns the service name and version.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Ops",
    responses((status = 200, description = "Service is up", body = Object))
)]
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "shopsight",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "ok",
    }))
}
