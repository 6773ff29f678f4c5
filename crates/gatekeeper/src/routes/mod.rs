//! HTTP routes for Gatekeeper.
//!
//! Defines the Axum router, application state and the mounting of policy
//! instances under their routes.

use crate::errors::GateError;
use crate::handlers;
use crate::middleware::{require_policy, AuthState};
use crate::policy::PolicyConfig;
use crate::provider::AuthProvider;
use crate::registry::ProviderRegistry;
use axum::{middleware, routing::get, Router};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Policy registry shared by every mounted instance.
    pub registry: Arc<ProviderRegistry>,
}

/// A policy instance mounted under a route prefix.
#[derive(Clone)]
pub struct Mount {
    pub route: String,
    pub provider: Arc<AuthProvider>,
}

/// Register every instance and collect the ones that declare a route.
///
/// # Errors
///
/// - Registration errors from the registry
/// - `GateError::Registration` for an invalid or duplicate route
pub async fn register_instances(
    registry: &Arc<ProviderRegistry>,
    instances: &[PolicyConfig],
) -> Result<Vec<Mount>, GateError> {
    let mut seen = HashSet::new();
    let mut mounts = Vec::new();

    for config in instances {
        let provider = Arc::new(AuthProvider::register(Arc::clone(registry), config).await?);

        let Some(route) = config.route.as_deref() else {
            continue;
        };
        let route = normalize_route(route)?;
        if !seen.insert(route.clone()) {
            return Err(GateError::Registration(format!(
                "route '{route}' is mounted by more than one instance"
            )));
        }
        mounts.push(Mount { route, provider });
    }

    Ok(mounts)
}

/// Trim a trailing slash and check the route is a plain path prefix.
fn normalize_route(route: &str) -> Result<String, GateError> {
    let valid = route.starts_with('/')
        && route
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.'));
    if !valid {
        return Err(GateError::Registration(format!("invalid route '{route}'")));
    }
    Ok(route.trim_end_matches('/').to_string())
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Health check endpoint (public)
/// - `{route}/whoami` - Per-instance identity endpoint behind the policy
/// - TraceLayer for request logging
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, mounts: Vec<Mount>) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .with_state(state);

    let protected_routes = mounts.into_iter().fold(Router::new(), |router, mount| {
        let auth_state = Arc::new(AuthState {
            provider: mount.provider,
        });
        router.merge(
            Router::new()
                .route(&format!("{}/whoami", mount.route), get(handlers::whoami))
                .layer(middleware::from_fn_with_state(auth_state, require_policy)),
        )
    });

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    public_routes
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::TokenDefaults;
    use common::jwt::DEFAULT_CLOCK_SKEW;
    use common::secret::SecretString;

    fn registry() -> Arc<ProviderRegistry> {
        Arc::new(ProviderRegistry::with_jwt(
            TokenDefaults {
                token_name: "access_token".to_string(),
                token_secret: SecretString::from("routes-secret"),
            },
            DEFAULT_CLOCK_SKEW,
        ))
    }

    fn instance(name: &str, primary: bool, route: Option<&str>) -> PolicyConfig {
        PolicyConfig {
            name: name.to_string(),
            primary,
            route: route.map(str::to_string),
            ..PolicyConfig::default()
        }
    }

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn test_normalize_route() {
        assert_eq!(normalize_route("/app/").unwrap(), "/app");
        assert_eq!(normalize_route("/").unwrap(), "");
        assert!(normalize_route("app").is_err());
        assert!(normalize_route("/:id").is_err());
    }

    #[tokio::test]
    async fn test_register_instances_mounts_routed_instances() {
        let reg = registry();
        let mounts = register_instances(
            &reg,
            &[
                instance("p", true, Some("/a")),
                instance("p", false, Some("/b")),
                instance("p", false, None),
            ],
        )
        .await
        .unwrap();

        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[1].route, "/b");
        assert_eq!(reg.instance_count("p").await, 3);
    }

    #[tokio::test]
    async fn test_duplicate_route_rejected() {
        let result = register_instances(
            &registry(),
            &[instance("p", true, Some("/a")), instance("q", true, Some("/a/"))],
        )
        .await;

        assert!(matches!(result, Err(GateError::Registration(_))));
    }
}
