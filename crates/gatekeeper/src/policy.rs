//! Policy configuration and provisioning.
//!
//! `PolicyConfig` is what a plugin instance declares in the policy file.
//! Provisioning turns the primary instance's config into a `ProvisionedPolicy`:
//! defaults applied, secrets resolved, access list compiled, validator built.

use crate::acl::{AccessList, AccessListEntry};
use crate::config::TokenDefaults;
use crate::errors::GateError;
use crate::validator::{JwtValidator, TokenValidator, TrustedKey, ValidatorOptions};
use async_trait::async_trait;
use common::jwt::SigningMethod;
use common::secret::{is_blank, ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Default login redirect target.
pub const DEFAULT_AUTH_URL_PATH: &str = "/auth";

/// Default query parameter carrying the original URL on login redirects.
pub const DEFAULT_REDIRECT_QUERY_PARAM: &str = "redirect_url";

/// Signing methods accepted when a policy names none.
pub const DEFAULT_TOKEN_TYPES: [SigningMethod; 1] = [SigningMethod::HS512];

/// Roles allowed when a policy declares no access list.
pub const DEFAULT_ALLOWED_ROLES: [&str; 2] = ["anonymous", "guest"];

/// Where the validator looks for a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenSource {
    Header,
    Cookie,
    Query,
}

impl TokenSource {
    /// Default search order.
    pub const ALL: [TokenSource; 3] = [TokenSource::Header, TokenSource::Cookie, TokenSource::Query];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "header" => Some(TokenSource::Header),
            "cookie" => Some(TokenSource::Cookie),
            "query" => Some(TokenSource::Query),
            _ => None,
        }
    }
}

/// A trusted token entry from the policy file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrustedTokenConfig {
    /// Token name, also the cookie and query parameter name.
    pub name: String,

    /// Shared secret; blank falls back to `JWT_TOKEN_SECRET`.
    pub secret: Option<SecretString>,

    /// Accepted signing method names; empty uses the policy's token types.
    pub methods: Vec<String>,
}

impl PartialEq for TrustedTokenConfig {
    fn eq(&self, other: &Self) -> bool {
        let secret = |s: &Option<SecretString>| s.as_ref().map(|s| s.expose_secret().to_string());
        self.name == other.name && self.methods == other.methods && secret(&self.secret) == secret(&other.secret)
    }
}

impl Eq for TrustedTokenConfig {}

/// A plugin instance as declared in the policy file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Policy name shared by all instances of the policy.
    pub name: String,

    /// Whether this instance carries the authoritative settings.
    pub primary: bool,

    /// Route prefix the host mounts this instance under.
    pub route: Option<String>,

    pub auth_url_path: Option<String>,
    pub disable_auth_redirect_query: bool,
    pub auth_redirect_query_param: Option<String>,

    /// Redirect target for forbidden users; unset answers 403.
    pub forbidden_url: Option<String>,

    pub access_list: Vec<AccessListEntry>,
    pub trusted_tokens: Vec<TrustedTokenConfig>,

    /// Accepted signing method names.
    pub token_types: Vec<String>,

    /// Token search order: `header`, `cookie`, `query`.
    pub token_sources: Vec<String>,

    /// Attach verified claims to the forwarded request.
    pub pass_claims: bool,

    /// Copy identity fields into `X-Token-*` request headers.
    pub pass_claims_with_headers: bool,

    /// Remove the Authorization header before forwarding.
    pub strip_token: bool,

    /// Feed request method and path into access list evaluation.
    pub validate_method_path: bool,
}

impl PolicyConfig {
    /// A primary instance with defaults for everything else.
    pub fn primary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary: true,
            ..Self::default()
        }
    }

    /// A reference instance of an existing policy.
    pub fn reference(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Whether two configs describe the same policy settings.
    ///
    /// Mount route is per instance and does not take part.
    pub fn same_settings(&self, other: &Self) -> bool {
        let strip = |c: &Self| Self {
            route: None,
            ..c.clone()
        };
        strip(self) == strip(other)
    }
}

/// A policy ready to authorize requests.
pub struct ProvisionedPolicy {
    pub name: String,
    pub auth_url_path: String,
    pub disable_auth_redirect_query: bool,
    pub auth_redirect_query_param: String,
    pub forbidden_url: Option<String>,
    pub pass_claims: bool,
    pub pass_claims_with_headers: bool,
    pub strip_token: bool,

    /// Shared options; copied per request when method/path validation is on.
    pub options: ValidatorOptions,

    pub validator: Arc<dyn TokenValidator>,
}

impl fmt::Debug for ProvisionedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionedPolicy")
            .field("name", &self.name)
            .field("auth_url_path", &self.auth_url_path)
            .field("auth_redirect_query_param", &self.auth_redirect_query_param)
            .field("forbidden_url", &self.forbidden_url)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ProvisionedPolicy {
    /// Apply redirect and forwarding settings from `config` around a validator.
    pub fn with_validator(config: &PolicyConfig, validator: Arc<dyn TokenValidator>) -> Self {
        let non_blank = |v: &Option<String>| v.as_ref().filter(|s| !s.trim().is_empty()).cloned();

        Self {
            name: config.name.clone(),
            auth_url_path: non_blank(&config.auth_url_path)
                .unwrap_or_else(|| DEFAULT_AUTH_URL_PATH.to_string()),
            disable_auth_redirect_query: config.disable_auth_redirect_query,
            auth_redirect_query_param: non_blank(&config.auth_redirect_query_param)
                .unwrap_or_else(|| DEFAULT_REDIRECT_QUERY_PARAM.to_string()),
            forbidden_url: non_blank(&config.forbidden_url),
            pass_claims: config.pass_claims,
            pass_claims_with_headers: config.pass_claims_with_headers,
            strip_token: config.strip_token,
            options: ValidatorOptions::new(config.validate_method_path),
            validator,
        }
    }
}

/// Builds a `ProvisionedPolicy` from a primary config.
///
/// Called at most once per policy name by the registry.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(&self, config: &PolicyConfig) -> Result<ProvisionedPolicy, GateError>;
}

/// Provisions JWT-validated policies.
#[derive(Debug, Clone)]
pub struct JwtProvisioner {
    defaults: TokenDefaults,
    clock_skew: Duration,
}

impl JwtProvisioner {
    pub fn new(defaults: TokenDefaults, clock_skew: Duration) -> Self {
        Self {
            defaults,
            clock_skew,
        }
    }

    fn token_types(config: &PolicyConfig) -> Result<Vec<SigningMethod>, String> {
        if config.token_types.is_empty() {
            return Ok(DEFAULT_TOKEN_TYPES.to_vec());
        }
        parse_methods(&config.token_types)
    }

    fn token_sources(config: &PolicyConfig) -> Result<Vec<TokenSource>, String> {
        if config.token_sources.is_empty() {
            return Ok(TokenSource::ALL.to_vec());
        }

        let mut sources = Vec::with_capacity(config.token_sources.len());
        for name in &config.token_sources {
            let source = TokenSource::from_name(name)
                .ok_or_else(|| format!("unsupported token source '{name}'"))?;
            if sources.contains(&source) {
                return Err(format!("duplicate token source '{name}'"));
            }
            sources.push(source);
        }
        Ok(sources)
    }

    fn trusted_keys(
        &self,
        config: &PolicyConfig,
        token_types: &[SigningMethod],
    ) -> Result<Vec<TrustedKey>, String> {
        let configured = if config.trusted_tokens.is_empty() {
            vec![TrustedTokenConfig::default()]
        } else {
            config.trusted_tokens.clone()
        };

        configured
            .iter()
            .map(|token| {
                let name = if token.name.trim().is_empty() {
                    self.defaults.token_name.clone()
                } else {
                    token.name.clone()
                };

                let secret = match &token.secret {
                    Some(secret) if !is_blank(secret) => secret.clone(),
                    _ => self.defaults.token_secret.clone(),
                };
                if is_blank(&secret) {
                    return Err(format!(
                        "trusted token '{name}' has no secret and JWT_TOKEN_SECRET is not set"
                    ));
                }

                let methods = if token.methods.is_empty() {
                    token_types.to_vec()
                } else {
                    parse_methods(&token.methods)?
                };

                Ok(TrustedKey {
                    name,
                    secret,
                    methods,
                })
            })
            .collect()
    }

    fn access_list(config: &PolicyConfig) -> Result<AccessList, String> {
        if config.access_list.is_empty() {
            return AccessList::compile(&[AccessListEntry::allow_roles(&DEFAULT_ALLOWED_ROLES)]);
        }
        AccessList::compile(&config.access_list)
    }
}

#[async_trait]
impl Provisioner for JwtProvisioner {
    #[instrument(skip_all, name = "gk.policy.provision", fields(policy = %config.name))]
    async fn provision(&self, config: &PolicyConfig) -> Result<ProvisionedPolicy, GateError> {
        let fail = |reason: String| {
            tracing::error!(target: "gk.policy", policy = %config.name, reason = %reason, "Policy provisioning failed");
            GateError::Provisioning(format!("policy '{}': {}", config.name, reason))
        };

        let token_types = Self::token_types(config).map_err(fail)?;
        let sources = Self::token_sources(config).map_err(fail)?;
        let keys = self.trusted_keys(config, &token_types).map_err(fail)?;
        let access_list = Self::access_list(config).map_err(fail)?;

        tracing::debug!(
            target: "gk.policy",
            policy = %config.name,
            trusted_tokens = keys.len(),
            access_rules = access_list.len(),
            "Policy provisioned"
        );

        let validator = JwtValidator::new(keys, sources, access_list, self.clock_skew);
        Ok(ProvisionedPolicy::with_validator(config, Arc::new(validator)))
    }
}

fn parse_methods(names: &[String]) -> Result<Vec<SigningMethod>, String> {
    names
        .iter()
        .map(|name| {
            SigningMethod::from_name(name).ok_or_else(|| format!("unsupported token signing method '{name}'"))
        })
        .collect()
}
