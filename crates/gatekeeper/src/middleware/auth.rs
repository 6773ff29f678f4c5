//! Policy enforcement middleware for protected routes.
//!
//! Runs the instance's `AuthProvider` over the request head. Rejections are
//! returned as-is; authenticated requests continue with the `UserIdentity`
//! in request extensions.

use crate::provider::{AuthOutcome, AuthProvider};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the policy middleware.
#[derive(Clone)]
pub struct AuthState {
    /// Provider for the mounted instance.
    pub provider: Arc<AuthProvider>,
}

/// Name of the policy that authenticated the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyName(pub String);

/// Middleware enforcing a policy.
///
/// # Response
///
/// - The provider's rejection (302 login redirect, 303/403 forbidden, 500)
/// - Otherwise the inner handler's response
#[instrument(skip_all, name = "gk.middleware.auth")]
pub async fn require_policy(
    State(state): State<Arc<AuthState>>,
    req: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = req.into_parts();

    match state.provider.authenticate(&mut parts).await {
        AuthOutcome::Authenticated(identity) => {
            parts.extensions.insert(identity);
            parts
                .extensions
                .insert(PolicyName(state.provider.name().to_string()));
            next.run(Request::from_parts(parts, body)).await
        }
        AuthOutcome::Rejected { response, error } => {
            if let Some(e) = error {
                tracing::debug!(target: "gk.middleware.auth", error = %e, status = %response.status(), "Request rejected");
            }
            response
        }
    }
}
