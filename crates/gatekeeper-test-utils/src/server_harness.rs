//! In-process router harness.
//!
//! Provides `TestGate`, the full Gatekeeper router built from policy
//! instances and driven with `tower::ServiceExt::oneshot`.

use crate::token_builders::TEST_TOKEN_SECRET;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use gatekeeper::config::TokenDefaults;
use gatekeeper::policy::PolicyConfig;
use gatekeeper::registry::ProviderRegistry;
use gatekeeper::routes::{self, AppState};
use http_body_util::BodyExt;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// A response with its body read into a string.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("response body should be JSON")
    }
}

/// Policy instance with defaults for everything but name, primary and route.
pub fn policy_instance(name: &str, primary: bool, route: &str) -> PolicyConfig {
    PolicyConfig {
        name: name.to_string(),
        primary,
        route: Some(route.to_string()),
        ..PolicyConfig::default()
    }
}

/// Gatekeeper router for tests.
///
/// # Example
/// ```rust,ignore
/// let gate = TestGate::new(&[policy_instance("default", true, "/app")]).await;
/// let response = gate.get("/health", None).await;
/// assert_eq!(response.status, 200);
/// ```
pub struct TestGate {
    router: Router,
    registry: Arc<ProviderRegistry>,
}

impl TestGate {
    /// Build a gate whose default token secret is `TEST_TOKEN_SECRET`.
    pub async fn new(instances: &[PolicyConfig]) -> Self {
        Self::with_secret(instances, TEST_TOKEN_SECRET).await
    }

    /// Build a gate with the given default token secret (may be empty).
    pub async fn with_secret(instances: &[PolicyConfig], secret: &str) -> Self {
        let defaults = TokenDefaults {
            token_name: "access_token".to_string(),
            token_secret: SecretString::from(secret),
        };
        let registry = Arc::new(ProviderRegistry::with_jwt(defaults, Duration::from_secs(300)));
        Self::with_registry(registry, instances).await
    }

    /// Build a gate over an existing registry.
    pub async fn with_registry(registry: Arc<ProviderRegistry>, instances: &[PolicyConfig]) -> Self {
        let mounts = routes::register_instances(&registry, instances)
            .await
            .expect("policy instances should register");
        let router = routes::build_routes(
            Arc::new(AppState {
                registry: Arc::clone(&registry),
            }),
            mounts,
        );
        Self { router, registry }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// GET `uri`, sending `token` as a Bearer token when given.
    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty()).expect("request should build"))
            .await
    }

    /// Send an arbitrary request through the router.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let (parts, body) = response.into_parts();
        let bytes = body.collect().await.expect("body should read").to_bytes();

        TestResponse {
            status: parts.status,
            headers: parts.headers,
            body: String::from_utf8(bytes.to_vec()).expect("body should be UTF-8"),
        }
    }
}
