//! Health check handler.

use crate::models::HealthResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /health
///
/// Liveness only: provisioning is lazy, so a healthy gatekeeper may still
/// hold policies that fail on first use.
///
/// ```json
/// { "status": "healthy", "policies": ["admins", "default"] }
/// ```
#[instrument(skip_all, name = "gk.health.check")]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        policies: state.registry.policy_names().await,
    })
}
