//! Token validator contract and the JWT validator.
//!
//! A validator receives the request head plus per-request options and
//! answers with either an `Authorization` (claims plus a valid-user flag) or a
//! `ValidationError`. The decision engine in `provider` turns these into HTTP
//! responses.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (via `common::jwt`)
//! - Only trusted tokens whose methods include the token's algorithm are tried
//! - Expiration and issued-at claims are validated with clock skew tolerance
//! - Error messages are generic; details are logged at debug level

use crate::acl::{AccessList, AclDecision};
use crate::errors::GateError;
use crate::policy::TokenSource;
use async_trait::async_trait;
use axum::http::{header, request::Parts, Method};
use common::jwt::{token_method, validate_iat, SigningMethod, UserClaims};
use common::secret::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Metadata key carrying the request method.
pub const METHOD_KEY: &str = "method";

/// Metadata key carrying the request path.
pub const PATH_KEY: &str = "path";

/// Why a validator refused a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Token is valid but the access list denies the user.
    #[error("user role is valid, but not allowed by access list: {0}")]
    Forbidden(String),

    /// No token found in any configured source.
    #[error("no token found")]
    MissingToken,

    /// Token failed verification.
    #[error("{0}")]
    InvalidToken(String),
}

impl From<ValidationError> for GateError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::Forbidden(reason) => GateError::Forbidden(reason),
            ValidationError::MissingToken => GateError::InvalidToken("no token found".to_string()),
            ValidationError::InvalidToken(reason) => GateError::InvalidToken(reason),
        }
    }
}

/// Successful validator answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    /// Verified claims, if the validator produced any.
    pub claims: Option<UserClaims>,

    /// Whether the claims identify a usable user.
    pub valid_user: bool,
}

impl Authorization {
    pub fn valid(claims: UserClaims) -> Self {
        Self {
            claims: Some(claims),
            valid_user: true,
        }
    }

    pub fn invalid_user(claims: Option<UserClaims>) -> Self {
        Self {
            claims,
            valid_user: false,
        }
    }
}

/// Per-request validator options.
///
/// The policy-level options are shared; `for_request` returns a copy carrying
/// the request method and path when `validate_method_path` is on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorOptions {
    pub validate_method_path: bool,
    pub metadata: HashMap<String, String>,
}

impl ValidatorOptions {
    pub fn new(validate_method_path: bool) -> Self {
        Self {
            validate_method_path,
            metadata: HashMap::new(),
        }
    }

    /// Copy of these options carrying request method and path metadata.
    pub fn for_request(&self, method: &Method, path: &str) -> Self {
        let mut options = self.clone();
        options
            .metadata
            .insert(METHOD_KEY.to_string(), method.as_str().to_string());
        options
            .metadata
            .insert(PATH_KEY.to_string(), path.to_string());
        options
    }

    pub fn method(&self) -> Option<&str> {
        self.metadata.get(METHOD_KEY).map(String::as_str)
    }

    pub fn path(&self) -> Option<&str> {
        self.metadata.get(PATH_KEY).map(String::as_str)
    }
}

/// Validates a request against a provisioned policy.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Authorize the request head.
    async fn authorize(
        &self,
        request: &Parts,
        options: &ValidatorOptions,
    ) -> Result<Authorization, ValidationError>;

    /// Cookie names the validator reads tokens from.
    ///
    /// Each is cleared on the client when authorization fails.
    fn cookie_names(&self) -> &[String];
}

/// A shared secret trusted to sign tokens.
#[derive(Clone)]
pub struct TrustedKey {
    pub name: String,
    pub secret: SecretString,
    pub methods: Vec<SigningMethod>,
}

impl fmt::Debug for TrustedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustedKey")
            .field("name", &self.name)
            .field("secret", &"[REDACTED]")
            .field("methods", &self.methods)
            .finish()
    }
}

/// JWT validator over HMAC trusted keys.
#[derive(Debug)]
pub struct JwtValidator {
    keys: Vec<TrustedKey>,
    sources: Vec<TokenSource>,
    access_list: AccessList,
    clock_skew: Duration,
    cookie_names: Vec<String>,
}

impl JwtValidator {
    /// Create a validator.
    ///
    /// Token names of the trusted keys double as cookie and query parameter
    /// names.
    pub fn new(
        keys: Vec<TrustedKey>,
        sources: Vec<TokenSource>,
        access_list: AccessList,
        clock_skew: Duration,
    ) -> Self {
        let mut cookie_names: Vec<String> = Vec::new();
        for key in &keys {
            if !cookie_names.contains(&key.name) {
                cookie_names.push(key.name.clone());
            }
        }

        Self {
            keys,
            sources,
            access_list,
            clock_skew,
            cookie_names,
        }
    }

    fn find_token(&self, request: &Parts) -> Option<String> {
        self.sources.iter().find_map(|source| match source {
            TokenSource::Header => bearer_token(request),
            TokenSource::Cookie => cookie_token(request, &self.cookie_names),
            TokenSource::Query => query_token(request, &self.cookie_names),
        })
    }

    fn verify(&self, token: &str) -> Result<UserClaims, ValidationError> {
        let invalid = |e: common::jwt::JwtValidationError| ValidationError::InvalidToken(e.to_string());

        let method = token_method(token).map_err(invalid)?;

        let mut last_error = None;
        for key in self.keys.iter().filter(|k| k.methods.contains(&method)) {
            match UserClaims::verify(token, &key.methods, key.secret.expose_secret().as_bytes()) {
                Ok(claims) => {
                    tracing::debug!(target: "gk.validator", key = %key.name, "Token verified");
                    return Ok(claims);
                }
                Err(e) => last_error = Some(e),
            }
        }

        match last_error {
            Some(e) => Err(invalid(e)),
            None => {
                tracing::debug!(target: "gk.validator", method = %method, "No trusted key accepts token method");
                Err(invalid(common::jwt::JwtValidationError::AlgorithmNotAllowed))
            }
        }
    }
}

#[async_trait]
impl TokenValidator for JwtValidator {
    #[instrument(skip_all, name = "gk.validator.authorize")]
    async fn authorize(
        &self,
        request: &Parts,
        options: &ValidatorOptions,
    ) -> Result<Authorization, ValidationError> {
        let Some(token) = self.find_token(request) else {
            tracing::debug!(target: "gk.validator", "No token found in configured sources");
            return Err(ValidationError::MissingToken);
        };

        let claims = self.verify(&token)?;

        if let Err(e) = validate_iat(claims.iat, self.clock_skew) {
            tracing::debug!(target: "gk.validator", error = ?e, "Token iat validation failed");
            return Err(ValidationError::InvalidToken(e.to_string()));
        }

        if claims.sub.is_empty() && claims.email.is_empty() {
            tracing::debug!(target: "gk.validator", "Token carries no subject or email");
            return Ok(Authorization::invalid_user(Some(claims)));
        }

        let (method, path) = if options.validate_method_path {
            (options.method(), options.path())
        } else {
            (None, None)
        };

        if self.access_list.evaluate(&claims.roles, method, path) == AclDecision::Deny {
            tracing::debug!(target: "gk.validator", roles = %claims.roles_joined(), "Access list denied user");
            return Err(ValidationError::Forbidden(claims.roles_joined()));
        }

        Ok(Authorization::valid(claims))
    }

    fn cookie_names(&self) -> &[String] {
        &self.cookie_names
    }
}

fn bearer_token(request: &Parts) -> Option<String> {
    request
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn cookie_token(request: &Parts, names: &[String]) -> Option<String> {
    request
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| names.iter().any(|n| n == name) && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

fn query_token(request: &Parts, names: &[String]) -> Option<String> {
    let query = request.uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, value)| names.iter().any(|n| n == name) && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::acl::AccessListEntry;
    use crate::grantor::TokenGrantor;
    use axum::http::Request;

    const SECRET: &str = "validator-test-secret";

    fn key(methods: &[SigningMethod]) -> TrustedKey {
        TrustedKey {
            name: "access_token".to_string(),
            secret: SecretString::from(SECRET),
            methods: methods.to_vec(),
        }
    }

    fn validator(acl: &[AccessListEntry]) -> JwtValidator {
        JwtValidator::new(
            vec![key(&[SigningMethod::HS256, SigningMethod::HS512])],
            vec![TokenSource::Header, TokenSource::Cookie, TokenSource::Query],
            AccessList::compile(acl).unwrap(),
            Duration::from_secs(300),
        )
    }

    fn claims(sub: &str, roles: &[&str]) -> UserClaims {
        let now = chrono::Utc::now().timestamp();
        let mut claims = UserClaims::new(sub, now + 3600);
        claims.iat = now;
        claims.email = format!("{sub}@example.com");
        claims.roles = roles.iter().map(|r| (*r).to_string()).collect();
        claims
    }

    fn sign(claims: &UserClaims, method: SigningMethod, secret: &str) -> String {
        claims.sign(method, secret.as_bytes()).unwrap()
    }

    fn parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_bearer_token_authorizes() {
        let v = validator(&[AccessListEntry::allow_roles(&["user"])]);
        let token = sign(&claims("alice", &["user"]), SigningMethod::HS512, SECRET);
        let req = parts(Request::get("/").header("Authorization", format!("Bearer {token}")));

        let auth = v.authorize(&req, &ValidatorOptions::default()).await.unwrap();
        assert!(auth.valid_user);
        assert_eq!(auth.claims.unwrap().sub, "alice");
    }

    #[tokio::test]
    async fn test_granted_token_yields_equal_claims() {
        let v = validator(&[AccessListEntry::allow_roles(&["user"])]);
        let mut issued = claims("carol", &["user", "ops"]);
        issued.name = "Carol".to_string();
        issued.iss = Some("login".to_string());
        issued.jti = Some("jti-1".to_string());

        let token = TokenGrantor::new(SecretString::from(SECRET))
            .grant_token("HS512", Some(&issued))
            .unwrap();
        let req = parts(Request::get("/").header("Authorization", format!("Bearer {token}")));

        let auth = v.authorize(&req, &ValidatorOptions::default()).await.unwrap();
        assert!(auth.valid_user);
        assert_eq!(auth.claims, Some(issued));
    }

    #[tokio::test]
    async fn test_cookie_and_query_sources() {
        let v = validator(&[AccessListEntry::allow_roles(&["*"])]);
        let token = sign(&claims("bob", &["user"]), SigningMethod::HS256, SECRET);

        let req = parts(Request::get("/").header("Cookie", format!("theme=dark; access_token={token}")));
        assert!(v.authorize(&req, &ValidatorOptions::default()).await.is_ok());

        let req = parts(Request::get(format!("/page?access_token={token}&x=1")));
        assert!(v.authorize(&req, &ValidatorOptions::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_disabled_source_is_ignored() {
        let v = JwtValidator::new(
            vec![key(&[SigningMethod::HS512])],
            vec![TokenSource::Header],
            AccessList::compile(&[AccessListEntry::allow_roles(&["*"])]).unwrap(),
            Duration::from_secs(300),
        );
        let token = sign(&claims("bob", &["user"]), SigningMethod::HS512, SECRET);
        let req = parts(Request::get(format!("/?access_token={token}")));

        assert_eq!(
            v.authorize(&req, &ValidatorOptions::default()).await,
            Err(ValidationError::MissingToken)
        );
    }

    #[tokio::test]
    async fn test_missing_token() {
        let v = validator(&[AccessListEntry::allow_roles(&["*"])]);
        let req = parts(Request::get("/"));

        assert_eq!(
            v.authorize(&req, &ValidatorOptions::default()).await,
            Err(ValidationError::MissingToken)
        );
    }

    #[tokio::test]
    async fn test_wrong_secret_is_invalid() {
        let v = validator(&[AccessListEntry::allow_roles(&["*"])]);
        let token = sign(&claims("eve", &["user"]), SigningMethod::HS512, "other-secret");
        let req = parts(Request::get("/").header("Authorization", format!("Bearer {token}")));

        assert!(matches!(
            v.authorize(&req, &ValidatorOptions::default()).await,
            Err(ValidationError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_method_not_trusted_is_invalid() {
        let v = validator(&[AccessListEntry::allow_roles(&["*"])]);
        let token = sign(&claims("eve", &["user"]), SigningMethod::HS384, SECRET);
        let req = parts(Request::get("/").header("Authorization", format!("Bearer {token}")));

        assert!(matches!(
            v.authorize(&req, &ValidatorOptions::default()).await,
            Err(ValidationError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_future_iat_is_invalid() {
        let v = validator(&[AccessListEntry::allow_roles(&["*"])]);
        let mut future = claims("eve", &["user"]);
        future.iat = chrono::Utc::now().timestamp() + 3600;
        let token = sign(&future, SigningMethod::HS512, SECRET);
        let req = parts(Request::get("/").header("Authorization", format!("Bearer {token}")));

        assert!(matches!(
            v.authorize(&req, &ValidatorOptions::default()).await,
            Err(ValidationError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_anonymous_claims_are_invalid_user() {
        let v = validator(&[AccessListEntry::allow_roles(&["*"])]);
        let mut anonymous = claims("", &["guest"]);
        anonymous.email = String::new();
        let token = sign(&anonymous, SigningMethod::HS512, SECRET);
        let req = parts(Request::get("/").header("Authorization", format!("Bearer {token}")));

        let auth = v.authorize(&req, &ValidatorOptions::default()).await.unwrap();
        assert!(!auth.valid_user);
        assert!(auth.claims.is_some());
    }

    #[tokio::test]
    async fn test_access_list_denial_is_forbidden() {
        let v = validator(&[AccessListEntry::allow_roles(&["admin"])]);
        let token = sign(&claims("carol", &["user"]), SigningMethod::HS512, SECRET);
        let req = parts(Request::get("/").header("Authorization", format!("Bearer {token}")));

        assert!(matches!(
            v.authorize(&req, &ValidatorOptions::default()).await,
            Err(ValidationError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_method_path_checked_only_when_enabled() {
        let entry = AccessListEntry {
            path: Some("/api/*".to_string()),
            ..AccessListEntry::allow_roles(&["user"])
        };
        let v = validator(&[entry]);
        let token = sign(&claims("dave", &["user"]), SigningMethod::HS512, SECRET);
        let req = parts(Request::get("/admin").header("Authorization", format!("Bearer {token}")));

        let disabled = ValidatorOptions::new(false).for_request(&Method::GET, "/admin");
        assert!(v.authorize(&req, &disabled).await.is_ok());

        let enabled = ValidatorOptions::new(true).for_request(&Method::GET, "/admin");
        assert!(matches!(
            v.authorize(&req, &enabled).await,
            Err(ValidationError::Forbidden(_))
        ));
    }

    #[test]
    fn test_for_request_leaves_shared_options_untouched() {
        let shared = ValidatorOptions::new(true);
        let per_request = shared.for_request(&Method::POST, "/items");

        assert!(shared.metadata.is_empty());
        assert_eq!(per_request.method(), Some("POST"));
        assert_eq!(per_request.path(), Some("/items"));
    }

    #[test]
    fn test_cookie_names_are_deduplicated() {
        let v = JwtValidator::new(
            vec![key(&[SigningMethod::HS256]), key(&[SigningMethod::HS512])],
            vec![TokenSource::Cookie],
            AccessList::compile(&[]).unwrap(),
            Duration::from_secs(300),
        );
        assert_eq!(v.cookie_names(), ["access_token".to_string()]);
    }

    #[test]
    fn test_validation_error_into_gate_error() {
        assert!(matches!(
            GateError::from(ValidationError::Forbidden("user".to_string())),
            GateError::Forbidden(_)
        ));
        assert!(matches!(
            GateError::from(ValidationError::MissingToken),
            GateError::InvalidToken(_)
        ));
    }

    #[test]
    fn test_trusted_key_debug_redacts_secret() {
        let debug_output = format!("{:?}", key(&[SigningMethod::HS256]));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains(SECRET));
    }
}
