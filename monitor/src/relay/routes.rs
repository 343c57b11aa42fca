//! HTTP route handlers for the monitoring relay.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tracing::warn;

use super::AppState;
use crate::ports::PortAssignment;

/// Error response for the ingress API
#[derive(Debug, Serialize)]
pub struct IngressErrorResponse {
    pub error: String,
    pub code: String,
}

impl IngressErrorResponse {
    fn malformed_payload(e: serde_json::Error) -> Self {
        Self {
            error: format!("request body is not valid JSON: {}", e),
            code: "malformed_payload".to_string(),
        }
    }
}

impl IntoResponse for IngressErrorResponse {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct IngressResponse {
    pub status: &'static str,
}

/// POST /monitoring/update - inject an event into the broadcast stream.
///
/// The body is required to parse as JSON but is otherwise schema-free; it is
/// forwarded to subscribers byte-for-byte (re-serializing would reorder keys).
/// Unknown fields are the norm here, not an error.
pub async fn ingress_update(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<IngressResponse>, IngressErrorResponse> {
    if let Err(e) = serde_json::from_str::<serde_json::Value>(&body) {
        warn!("Rejected malformed ingress payload: {}", e);
        return Err(IngressErrorResponse::malformed_payload(e));
    }

    let delivered = state.registry.broadcast(&body).await;
    tracing::debug!("Ingress event delivered to {} clients", delivered);

    Ok(Json(IngressResponse { status: "success" }))
}

/// GET /server_ports.json - relay address discovery for external collaborators.
pub async fn server_ports(State(state): State<AppState>) -> Json<PortAssignment> {
    Json(state.ports)
}

/// Build the monitoring routes; the caller layers CORS and tracing on top.
pub fn monitoring_routes() -> Router<AppState> {
    Router::new()
        .route("/monitoring/update", post(ingress_update))
        .route("/server_ports.json", get(server_ports))
}
