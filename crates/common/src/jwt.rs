//! JWT utilities shared across Gatekeeper components.
//!
//! This module provides:
//! - The user claim set carried by identity tokens (`UserClaims`)
//! - The closed set of supported signing methods and their lookup table
//! - Signing and verification of claim sets with a shared secret
//! - Size limits and clock skew constants for iat validation
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only algorithms listed in `SIGNING_METHODS` are ever accepted
//! - Generic error messages prevent information leakage
//! - The `sub` and `email` fields are redacted in Debug output
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{SigningMethod, UserClaims};
//!
//! let method = SigningMethod::from_name("HS512").ok_or("unsupported")?;
//! let token = claims.sign(method, secret)?;
//! let verified = UserClaims::verify(&token, &[method], secret)?;
//! ```

use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// JWTs larger than this size are rejected BEFORE any parsing or cryptographic
/// operations. Tokens usually travel in cookies, which browsers cap at 4KB, so
/// anything past 8KB is malformed or hostile.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default JWT clock skew tolerance (5 minutes).
///
/// Tokens with `iat` (issued-at) timestamps more than this amount in the
/// future are rejected.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during JWT validation.
///
/// Note: Error messages are intentionally generic to prevent information leakage.
/// Detailed information is logged at debug level for troubleshooting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token header names an algorithm that is unsupported or not allowed.
    #[error("The access token is invalid or expired")]
    AlgorithmNotAllowed,

    /// Signature, expiry or claim decoding failed.
    #[error("The access token is invalid or expired")]
    VerificationFailed,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Signing Methods
// =============================================================================

/// Supported token signing methods.
///
/// All supported methods are HMAC based and keyed by a shared secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningMethod {
    /// HMAC using SHA-256.
    HS256,
    /// HMAC using SHA-384.
    HS384,
    /// HMAC using SHA-512.
    HS512,
}

/// Lookup table from method name to signing method.
pub const SIGNING_METHODS: [(&str, SigningMethod); 3] = [
    ("HS256", SigningMethod::HS256),
    ("HS384", SigningMethod::HS384),
    ("HS512", SigningMethod::HS512),
];

impl SigningMethod {
    /// Resolve a method by its registered name (e.g. `"HS512"`).
    ///
    /// Returns `None` for names that are not in `SIGNING_METHODS`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        SIGNING_METHODS
            .iter()
            .find(|(registered, _)| *registered == name)
            .map(|(_, method)| *method)
    }

    /// The registered name of this method.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            SigningMethod::HS256 => "HS256",
            SigningMethod::HS384 => "HS384",
            SigningMethod::HS512 => "HS512",
        }
    }

    /// The `jsonwebtoken` algorithm implementing this method.
    #[must_use]
    pub fn algorithm(self) -> Algorithm {
        match self {
            SigningMethod::HS256 => Algorithm::HS256,
            SigningMethod::HS384 => Algorithm::HS384,
            SigningMethod::HS512 => Algorithm::HS512,
        }
    }

    fn from_algorithm(alg: Algorithm) -> Option<Self> {
        match alg {
            Algorithm::HS256 => Some(SigningMethod::HS256),
            Algorithm::HS384 => Some(SigningMethod::HS384),
            Algorithm::HS512 => Some(SigningMethod::HS512),
            _ => None,
        }
    }
}

impl fmt::Display for SigningMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Claims Types
// =============================================================================

/// User claim set carried by identity tokens.
///
/// `sub` and `email` identify a person and are redacted in Debug output.
/// Role order carries no meaning.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserClaims {
    /// Subject (user identifier) - redacted in Debug output.
    #[serde(default)]
    pub sub: String,

    /// Email address - redacted in Debug output.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,

    /// Display name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Roles granted to the user.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(default)]
    pub iat: i64,

    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Token identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl fmt::Debug for UserClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserClaims")
            .field("sub", &"[REDACTED]")
            .field("email", &"[REDACTED]")
            .field("name", &self.name)
            .field("roles", &self.roles)
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("iss", &self.iss)
            .field("jti", &self.jti)
            .finish()
    }
}

impl UserClaims {
    /// Creates a claim set for `sub` that expires at `exp`, issued now.
    #[must_use]
    pub fn new(sub: impl Into<String>, exp: i64) -> Self {
        Self {
            sub: sub.into(),
            email: String::new(),
            name: String::new(),
            roles: Vec::new(),
            exp,
            iat: chrono::Utc::now().timestamp(),
            iss: None,
            jti: None,
        }
    }

    /// Check if the claim set grants a specific role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Roles joined with single spaces, the form used in identity metadata
    /// and forwarded headers.
    #[must_use]
    pub fn roles_joined(&self) -> String {
        self.roles.join(" ")
    }

    /// Sign the claim set into a compact JWT.
    ///
    /// # Errors
    ///
    /// Returns the underlying `jsonwebtoken` error when encoding fails.
    pub fn sign(
        &self,
        method: SigningMethod,
        secret: &[u8],
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let mut header = Header::new(method.algorithm());
        header.typ = Some("JWT".to_string());
        encode(&header, self, &EncodingKey::from_secret(secret))
    }

    /// Verify a compact JWT and return its claim set.
    ///
    /// # Security Checks
    ///
    /// 1. Size check - reject tokens > 8KB before parsing
    /// 2. Header algorithm must be one of `methods`
    /// 3. HMAC signature verified with `secret`
    /// 4. `exp` validated (expired tokens rejected)
    ///
    /// `iat` is NOT checked here; callers apply [`validate_iat`] with their
    /// configured clock skew.
    ///
    /// # Errors
    ///
    /// Returns a `JwtValidationError` variant for every failure.
    pub fn verify(
        token: &str,
        methods: &[SigningMethod],
        secret: &[u8],
    ) -> Result<Self, JwtValidationError> {
        let method = token_method(token)?;
        if !methods.contains(&method) {
            tracing::debug!(
                target: "common.jwt",
                method = %method,
                "Token rejected: signing method not allowed"
            );
            return Err(JwtValidationError::AlgorithmNotAllowed);
        }

        let mut validation = Validation::new(method.algorithm());
        validation.validate_exp = true;

        let data = decode::<UserClaims>(token, &DecodingKey::from_secret(secret), &validation)
            .map_err(|e| {
                tracing::debug!(target: "common.jwt", error = %e, "Token verification failed");
                JwtValidationError::VerificationFailed
            })?;

        Ok(data.claims)
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Read the signing method from a JWT header without verifying the signature.
///
/// Used to pick which trusted secrets may verify the token.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - Header cannot be decoded
/// - `AlgorithmNotAllowed` - Header names an algorithm outside `SIGNING_METHODS`
pub fn token_method(token: &str) -> Result<SigningMethod, JwtValidationError> {
    // Check token size first (DoS prevention)
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let header = decode_header(token).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header");
        JwtValidationError::MalformedToken
    })?;

    SigningMethod::from_algorithm(header.alg).ok_or_else(|| {
        tracing::debug!(target: "common.jwt", alg = ?header.alg, "Token rejected: unsupported algorithm");
        JwtValidationError::AlgorithmNotAllowed
    })
}

/// Validate the `iat` (issued-at) claim with clock skew tolerance.
///
/// Rejects tokens with `iat` more than `clock_skew` in the future.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if the iat timestamp is more than
/// `clock_skew` in the future.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // Safe cast: clock_skew is bounded to MAX_CLOCK_SKEW (600 seconds), well within i64 range
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now + clock_skew_secs;

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            clock_skew_secs = clock_skew_secs,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::cast_possible_wrap)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn test_claims() -> UserClaims {
        let now = chrono::Utc::now().timestamp();
        UserClaims {
            sub: "user-42".to_string(),
            email: "alice@example.com".to_string(),
            name: "Alice".to_string(),
            roles: vec!["admin".to_string(), "user".to_string()],
            exp: now + 3600,
            iat: now,
            iss: Some("gatekeeper".to_string()),
            jti: None,
        }
    }

    // -------------------------------------------------------------------------
    // Signing method table
    // -------------------------------------------------------------------------

    #[test]
    fn test_from_name_resolves_registered_methods() {
        assert_eq!(SigningMethod::from_name("HS256"), Some(SigningMethod::HS256));
        assert_eq!(SigningMethod::from_name("HS384"), Some(SigningMethod::HS384));
        assert_eq!(SigningMethod::from_name("HS512"), Some(SigningMethod::HS512));
    }

    #[test]
    fn test_from_name_rejects_unknown_methods() {
        assert_eq!(SigningMethod::from_name("RS256"), None);
        assert_eq!(SigningMethod::from_name("hs512"), None);
        assert_eq!(SigningMethod::from_name(""), None);
    }

    #[test]
    fn test_table_names_match_method_names() {
        for (name, method) in SIGNING_METHODS {
            assert_eq!(method.name(), name);
            assert_eq!(method.to_string(), name);
        }
    }

    // -------------------------------------------------------------------------
    // sign / verify
    // -------------------------------------------------------------------------

    #[test]
    fn test_sign_then_verify_returns_equal_claims() {
        let claims = test_claims();
        let token = claims.sign(SigningMethod::HS512, SECRET).unwrap();

        let verified = UserClaims::verify(&token, &[SigningMethod::HS512], SECRET).unwrap();
        assert_eq!(verified, claims);
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let token = test_claims().sign(SigningMethod::HS256, SECRET).unwrap();

        let result = UserClaims::verify(&token, &[SigningMethod::HS256], b"another-secret");
        assert_eq!(result, Err(JwtValidationError::VerificationFailed));
    }

    #[test]
    fn test_verify_rejects_method_not_allowed() {
        let token = test_claims().sign(SigningMethod::HS256, SECRET).unwrap();

        let result = UserClaims::verify(&token, &[SigningMethod::HS512], SECRET);
        assert_eq!(result, Err(JwtValidationError::AlgorithmNotAllowed));
    }

    #[test]
    fn test_verify_rejects_expired_token() {
        let mut claims = test_claims();
        claims.exp = chrono::Utc::now().timestamp() - 3600;
        let token = claims.sign(SigningMethod::HS512, SECRET).unwrap();

        let result = UserClaims::verify(&token, &[SigningMethod::HS512], SECRET);
        assert_eq!(result, Err(JwtValidationError::VerificationFailed));
    }

    #[test]
    fn test_verify_rejects_oversized_token() {
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        let result = UserClaims::verify(&oversized, &[SigningMethod::HS512], SECRET);
        assert_eq!(result, Err(JwtValidationError::TokenTooLarge));
    }

    #[test]
    fn test_token_method_malformed() {
        assert_eq!(token_method("not-a-jwt"), Err(JwtValidationError::MalformedToken));
        assert_eq!(token_method(""), Err(JwtValidationError::MalformedToken));
    }

    #[test]
    fn test_token_method_reads_header() {
        let token = test_claims().sign(SigningMethod::HS384, SECRET).unwrap();
        assert_eq!(token_method(&token), Ok(SigningMethod::HS384));
    }

    // -------------------------------------------------------------------------
    // validate_iat
    // -------------------------------------------------------------------------

    #[test]
    fn test_validate_iat_past_time() {
        let past = chrono::Utc::now().timestamp() - 3600;
        assert!(validate_iat(past, DEFAULT_CLOCK_SKEW).is_ok());
    }

    #[test]
    fn test_validate_iat_far_future() {
        let far_future = chrono::Utc::now().timestamp() + 86400;
        assert!(matches!(
            validate_iat(far_future, DEFAULT_CLOCK_SKEW),
            Err(JwtValidationError::IatTooFarInFuture)
        ));
    }

    #[test]
    fn test_validate_iat_at_boundary_exact() {
        let now = 1_700_000_000_i64;

        // iat == now + skew is the last accepted value
        assert!(validate_iat_at(now + 300, DEFAULT_CLOCK_SKEW, now).is_ok());

        // iat == now + skew + 1 is the first rejected value
        assert!(matches!(
            validate_iat_at(now + 301, DEFAULT_CLOCK_SKEW, now),
            Err(JwtValidationError::IatTooFarInFuture)
        ));
    }

    // -------------------------------------------------------------------------
    // UserClaims
    // -------------------------------------------------------------------------

    #[test]
    fn test_user_claims_debug_redacts_identity() {
        let debug_str = format!("{:?}", test_claims());

        assert!(!debug_str.contains("user-42"));
        assert!(!debug_str.contains("alice@example.com"));
        assert!(debug_str.contains("[REDACTED]"));
        assert!(debug_str.contains("Alice"));
    }

    #[test]
    fn test_user_claims_roles() {
        let claims = test_claims();

        assert!(claims.has_role("admin"));
        assert!(!claims.has_role("adm"));
        assert_eq!(claims.roles_joined(), "admin user");
    }

    #[test]
    fn test_user_claims_omits_empty_fields() {
        let claims = UserClaims::new("svc", 1_234_567_890);
        let json = serde_json::to_string(&claims).unwrap();

        assert!(!json.contains("email"));
        assert!(!json.contains("roles"));
        assert!(!json.contains("iss"));
    }
}
