//! Token grantor.
//!
//! Signs claim sets with a shared HMAC secret. Login services use it to issue
//! the tokens that `JwtValidator` later accepts.

use common::jwt::{SigningMethod, UserClaims};
use common::secret::{secret_or_empty, ExposeSecret, SecretString};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrantError {
    #[error("grantor token secret not configured")]
    EmptySecret,

    #[error("provided claims are nil")]
    NilClaims,

    #[error("grantor does not support {0} token signing method")]
    UnsupportedMethod(String),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Signs tokens with a shared secret.
#[derive(Debug, Clone)]
pub struct TokenGrantor {
    secret: SecretString,
}

impl TokenGrantor {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Grantor keyed by `JWT_TOKEN_SECRET`.
    pub fn from_env() -> Self {
        Self::from_vars(&std::env::vars().collect())
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        Self::new(secret_or_empty(vars.get("JWT_TOKEN_SECRET").map(String::as_str)))
    }

    /// Check the grantor can sign.
    ///
    /// # Errors
    ///
    /// `GrantError::EmptySecret` when no secret is configured. Any non-empty
    /// secret, whitespace included, is accepted.
    pub fn validate(&self) -> Result<(), GrantError> {
        if self.secret.expose_secret().is_empty() {
            return Err(GrantError::EmptySecret);
        }
        Ok(())
    }

    /// Sign `claims` with the named method (`HS256`, `HS384` or `HS512`).
    ///
    /// # Errors
    ///
    /// Checked in order: unsupported method, missing claims, empty secret,
    /// then any signing failure.
    pub fn grant_token(&self, method: &str, claims: Option<&UserClaims>) -> Result<String, GrantError> {
        let signing_method = SigningMethod::from_name(method)
            .ok_or_else(|| GrantError::UnsupportedMethod(method.to_string()))?;
        let claims = claims.ok_or(GrantError::NilClaims)?;
        self.validate()?;

        claims
            .sign(signing_method, self.secret.expose_secret().as_bytes())
            .map_err(|e| GrantError::Signing(e.to_string()))
    }
}
