//! Current user handler.
//!
//! Returns the identity the policy middleware attached to the request.

use crate::middleware::auth::PolicyName;
use crate::models::WhoAmIResponse;
use crate::provider::UserIdentity;
use axum::{Extension, Json};
use common::jwt::UserClaims;
use tracing::instrument;

/// Handler for GET {route}/whoami
///
/// Requires the policy middleware. `sub` is only present when the policy
/// passes claims to the request.
#[instrument(skip_all, name = "gk.handlers.whoami")]
pub async fn whoami(
    Extension(policy): Extension<PolicyName>,
    Extension(identity): Extension<UserIdentity>,
    claims: Option<Extension<UserClaims>>,
) -> Json<WhoAmIResponse> {
    tracing::debug!(target: "gk.handlers.whoami", policy = %policy.0, "Returning identity");

    Json(WhoAmIResponse {
        policy: policy.0,
        id: identity.id,
        metadata: identity.metadata,
        sub: claims.map(|Extension(c)| c.sub),
    })
}
