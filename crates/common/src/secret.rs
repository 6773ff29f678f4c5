//! Secret types for token signing material.
//!
//! Re-exports the [`secrecy`] types used for every shared token secret in
//! Gatekeeper. Policy files, environment snapshots and the grantor all hold
//! secrets as `SecretString`, so deriving `Debug` on a configuration struct
//! never prints key material.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{is_blank, SecretString};
//! use secrecy::ExposeSecret;
//!
//! #[derive(Debug)]
//! struct TrustedToken {
//!     name: String,
//!     secret: SecretString,
//! }
//!
//! let token = TrustedToken {
//!     name: "access_token".to_string(),
//!     secret: SecretString::from("0123456789abcdef"),
//! };
//!
//! // Debug output shows the name but not the secret
//! println!("{:?}", token);
//!
//! assert!(!is_blank(&token.secret));
//! let bytes: &[u8] = token.secret.expose_secret().as_bytes();
//! assert_eq!(bytes.len(), 16);
//! ```

pub use secrecy::{ExposeSecret, SecretString};

/// Returns true when the secret is empty or whitespace only.
///
/// A blank secret is treated as "not configured" everywhere a secret is
/// required for signing or verification.
#[must_use]
pub fn is_blank(secret: &SecretString) -> bool {
    secret.expose_secret().trim().is_empty()
}

/// Builds a `SecretString` from an optional plain value, treating `None` as empty.
#[must_use]
pub fn secret_or_empty(value: Option<&str>) -> SecretString {
    SecretString::from(value.unwrap_or_default().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("hunter2");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(&SecretString::from("")));
        assert!(is_blank(&SecretString::from("   ")));
        assert!(!is_blank(&SecretString::from("s3cret")));
    }

    #[test]
    fn test_secret_or_empty() {
        assert!(is_blank(&secret_or_empty(None)));
        assert_eq!(secret_or_empty(Some("abc")).expose_secret(), "abc");
    }

    #[test]
    fn test_deserialize_trusted_token() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct TrustedToken {
            name: String,
            secret: SecretString,
        }

        let json = r#"{"name": "access_token", "secret": "my-secret-value"}"#;
        let token: TrustedToken = serde_json::from_str(json).expect("deserialize");

        assert_eq!(token.secret.expose_secret(), "my-secret-value");

        let debug = format!("{token:?}");
        assert!(debug.contains("access_token"));
        assert!(!debug.contains("my-secret-value"));
    }
}
