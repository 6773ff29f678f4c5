//! Authentication decision engine.
//!
//! An `AuthProvider` is one plugin instance bound to a policy name. On each
//! request it fetches the provisioned policy from the registry, runs the
//! policy's validator and classifies the answer into exactly one outcome:
//! an authenticated identity or a ready-made rejection response.

use crate::errors::GateError;
use crate::policy::{PolicyConfig, ProvisionedPolicy};
use crate::redirect::login_location;
use crate::registry::ProviderRegistry;
use crate::validator::{TokenValidator, ValidationError, ValidatorOptions};
use axum::http::{header, request::Parts, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use common::jwt::UserClaims;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;

pub const USER_NAME_HEADER: HeaderName = HeaderName::from_static("x-token-user-name");
pub const USER_EMAIL_HEADER: HeaderName = HeaderName::from_static("x-token-user-email");
pub const USER_ROLES_HEADER: HeaderName = HeaderName::from_static("x-token-user-roles");
pub const SUBJECT_HEADER: HeaderName = HeaderName::from_static("x-token-subject");

const EXPIRED_COOKIE_SUFFIX: &str = "=delete; path=/; expires=Thu, 01 Jan 1970 00:00:00 GMT";

/// Identity handed to the protected handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserIdentity {
    /// The user's email address.
    pub id: String,

    /// `roles` (space-joined), plus `name` and `email` when present.
    pub metadata: BTreeMap<String, String>,
}

impl UserIdentity {
    fn from_claims(claims: &UserClaims) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("roles".to_string(), claims.roles_joined());
        if !claims.name.is_empty() {
            metadata.insert("name".to_string(), claims.name.clone());
        }
        if !claims.email.is_empty() {
            metadata.insert("email".to_string(), claims.email.clone());
        }

        Self {
            id: claims.email.clone(),
            metadata,
        }
    }
}

/// Result of authenticating one request.
#[derive(Debug)]
pub enum AuthOutcome {
    Authenticated(UserIdentity),
    Rejected {
        response: Response,
        error: Option<GateError>,
    },
}

impl AuthOutcome {
    fn rejected(response: Response, error: Option<GateError>) -> Self {
        AuthOutcome::Rejected { response, error }
    }
}

/// A plugin instance bound to a named policy.
#[derive(Clone)]
pub struct AuthProvider {
    name: String,
    registry: Arc<ProviderRegistry>,
}

impl AuthProvider {
    /// Register `config` with the registry and bind a provider to its policy.
    ///
    /// # Errors
    ///
    /// Whatever `ProviderRegistry::register` rejects.
    pub async fn register(
        registry: Arc<ProviderRegistry>,
        config: &PolicyConfig,
    ) -> Result<Self, GateError> {
        registry.register(config).await?;
        Ok(Self {
            name: config.name.clone(),
            registry,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Authenticate a request head.
    ///
    /// On success the head is updated in place for forwarding (identity
    /// headers, claims extension, stripped token) as the policy asks.
    #[instrument(skip_all, name = "gk.provider.authenticate", fields(policy = %self.name))]
    pub async fn authenticate(&self, parts: &mut Parts) -> AuthOutcome {
        let policy = match self.registry.provision(&self.name).await {
            Ok(policy) => policy,
            Err(e) => {
                tracing::error!(target: "gk.provider", policy = %self.name, error = %e, "Policy unavailable");
                return AuthOutcome::rejected(
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response(),
                    Some(e),
                );
            }
        };

        let options: Cow<'_, ValidatorOptions> = if policy.options.validate_method_path {
            Cow::Owned(policy.options.for_request(&parts.method, parts.uri.path()))
        } else {
            Cow::Borrowed(&policy.options)
        };

        let authorization = match policy.validator.authorize(parts, &options).await {
            Ok(authorization) => authorization,
            Err(ValidationError::Forbidden(reason)) => {
                tracing::debug!(target: "gk.provider", policy = %self.name, "User forbidden by access list");
                return AuthOutcome::rejected(
                    forbidden_response(&policy),
                    Some(GateError::Forbidden(reason)),
                );
            }
            Err(e) => {
                tracing::debug!(target: "gk.provider", policy = %self.name, error = %e, "Token validation failed");
                return AuthOutcome::rejected(
                    unauthorized_response(&policy, parts, "Unauthorized"),
                    Some(e.into()),
                );
            }
        };

        if !authorization.valid_user {
            tracing::debug!(target: "gk.provider", policy = %self.name, "Claims do not identify a user");
            return AuthOutcome::rejected(
                unauthorized_response(&policy, parts, "Unauthorized User"),
                None,
            );
        }

        let Some(claims) = authorization.claims else {
            tracing::debug!(target: "gk.provider", policy = %self.name, "Validator returned no claims");
            return AuthOutcome::rejected(
                unauthorized_response(&policy, parts, "User Unauthorized"),
                None,
            );
        };

        let identity = UserIdentity::from_claims(&claims);
        forward_claims(&policy, parts, claims);

        tracing::debug!(target: "gk.provider", policy = %self.name, "Request authenticated");
        AuthOutcome::Authenticated(identity)
    }
}

fn forbidden_response(policy: &ProvisionedPolicy) -> Response {
    if let Some(url) = &policy.forbidden_url {
        if let Ok(location) = HeaderValue::from_str(url) {
            let mut response = (StatusCode::SEE_OTHER, "Forbidden").into_response();
            response.headers_mut().insert(header::LOCATION, location);
            return response;
        }
        tracing::warn!(target: "gk.provider", policy = %policy.name, "forbidden_url is not a valid header value");
    }
    (StatusCode::FORBIDDEN, "Forbidden").into_response()
}

fn unauthorized_response(
    policy: &ProvisionedPolicy,
    parts: &Parts,
    body: &'static str,
) -> Response {
    let mut response = (StatusCode::FOUND, body).into_response();
    let headers = response.headers_mut();

    for name in expire_cookie_values(policy.validator.as_ref()) {
        headers.append(header::SET_COOKIE, name);
    }

    let location = login_location(
        &policy.auth_url_path,
        policy.disable_auth_redirect_query,
        &policy.auth_redirect_query_param,
        &parts.uri,
    );
    match HeaderValue::from_str(&location) {
        Ok(value) => {
            headers.insert(header::LOCATION, value);
        }
        Err(e) => {
            tracing::warn!(target: "gk.provider", policy = %policy.name, error = %e, "Login location is not a valid header value");
        }
    }

    response
}

fn expire_cookie_values(validator: &dyn TokenValidator) -> Vec<HeaderValue> {
    validator
        .cookie_names()
        .iter()
        .filter_map(|name| HeaderValue::from_str(&format!("{name}{EXPIRED_COOKIE_SUFFIX}")).ok())
        .collect()
}

fn forward_claims(policy: &ProvisionedPolicy, parts: &mut Parts, claims: UserClaims) {
    if policy.pass_claims_with_headers {
        // Identity headers only ever come from the verified claims.
        for name in [&USER_NAME_HEADER, &USER_EMAIL_HEADER, &USER_ROLES_HEADER, &SUBJECT_HEADER] {
            parts.headers.remove(name);
        }

        let fields = [
            (USER_NAME_HEADER, &claims.name),
            (USER_EMAIL_HEADER, &claims.email),
            (USER_ROLES_HEADER, &claims.roles_joined()),
            (SUBJECT_HEADER, &claims.sub),
        ];
        for (name, value) in fields {
            if value.is_empty() {
                continue;
            }
            match HeaderValue::from_str(value) {
                Ok(value) => {
                    parts.headers.insert(name, value);
                }
                Err(_) => {
                    tracing::debug!(target: "gk.provider", header = %name, "Claim is not a valid header value, skipped");
                }
            }
        }
    }

    if policy.strip_token {
        parts.headers.remove(header::AUTHORIZATION);
    }

    if policy.pass_claims {
        parts.extensions.insert(claims);
    }
}
