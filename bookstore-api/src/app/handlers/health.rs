use axum::http::{StatusCode, Uri};
use axum::Json;
use serde_json::json;

use super::super::middleware::ClientIp;

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Fallback for unknown routes; logged since scanners tend to show up here.
pub async fn handler_404(
    uri: Uri,
    ClientIp(ip): ClientIp,
) -> (StatusCode, Json<serde_json::Value>) {
    tracing::warn!(path = %uri.path(), ip = %ip, "no route matched");
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "code": "NotFound",
            "message": "resource not found"
        })),
    )
}
