//! Gatekeeper response models.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Health check response.
///
/// Returned by the `/health` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service health status.
    pub status: String,

    /// Registered policy names.
    pub policies: Vec<String>,
}

/// Response for `{route}/whoami`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhoAmIResponse {
    /// Policy that authenticated the request.
    pub policy: String,

    /// Identity id (email).
    pub id: String,

    /// Identity metadata (roles, name, email).
    pub metadata: BTreeMap<String, String>,

    /// Token subject, present when the policy passes claims.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}
