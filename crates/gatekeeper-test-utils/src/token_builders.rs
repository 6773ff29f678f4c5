//! Builder patterns for test tokens.

use chrono::{Duration, Utc};
use common::jwt::UserClaims;
use gatekeeper::grantor::TokenGrantor;
use secrecy::SecretString;

/// Shared secret used by the harness and by `TestTokenBuilder::sign`.
pub const TEST_TOKEN_SECRET: &str = "gatekeeper-test-secret";

/// Builder for test claim sets and signed tokens.
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_user("alice")
///     .with_roles(&["admin"])
///     .expires_in(3600)
///     .sign();
/// ```
pub struct TestTokenBuilder {
    claims: UserClaims,
}

impl TestTokenBuilder {
    /// Create a builder for `test-subject` (`test-subject@example.com`),
    /// valid for an hour, with no roles.
    pub fn new() -> Self {
        let now = Utc::now();
        let mut claims = UserClaims::new("test-subject", (now + Duration::seconds(3600)).timestamp());
        claims.iat = now.timestamp();
        claims.email = "test-subject@example.com".to_string();
        Self { claims }
    }

    /// Set subject and derive the email from it.
    pub fn for_user(mut self, subject: &str) -> Self {
        self.claims.sub = subject.to_string();
        self.claims.email = format!("{subject}@example.com");
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.claims.email = email.to_string();
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.claims.name = name.to_string();
        self
    }

    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.claims.roles = roles.iter().map(|r| (*r).to_string()).collect();
        self
    }

    /// Clear subject and email so the claims identify nobody.
    pub fn anonymous(mut self) -> Self {
        self.claims.sub.clear();
        self.claims.email.clear();
        self
    }

    /// Set expiration in seconds from now (negative for expired tokens).
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.claims.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.claims.iat = timestamp;
        self
    }

    pub fn build(self) -> UserClaims {
        self.claims
    }

    /// Sign with `HS512` and `TEST_TOKEN_SECRET`.
    pub fn sign(self) -> String {
        self.sign_with("HS512", TEST_TOKEN_SECRET)
    }

    /// Sign with the given method name and secret.
    pub fn sign_with(self, method: &str, secret: &str) -> String {
        TokenGrantor::new(SecretString::from(secret))
            .grant_token(method, Some(&self.claims))
            .expect("test token should sign")
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
