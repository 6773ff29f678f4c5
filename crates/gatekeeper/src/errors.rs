//! Gatekeeper error types.
//!
//! Errors raised by registration, provisioning and request authorization.
//! The provider turns them into responses itself (login redirect, forbidden,
//! internal error); the detailed reason is only logged server-side.

use thiserror::Error;

/// Gatekeeper error type.
///
/// The type is `Clone` because a provisioning failure is cached and handed to
/// every later caller for the same policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Provisioning error: {0}")]
    Provisioning(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal server error")]
    Internal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_registration() {
        let error = GateError::Registration("duplicate primary".to_string());
        assert_eq!(format!("{}", error), "Registration error: duplicate primary");
    }

    #[test]
    fn test_display_provisioning() {
        let error = GateError::Provisioning("empty secret".to_string());
        assert_eq!(format!("{}", error), "Provisioning error: empty secret");
    }

    #[test]
    fn test_display_forbidden() {
        let error = GateError::Forbidden("role not allowed".to_string());
        assert_eq!(format!("{}", error), "Forbidden: role not allowed");
    }

    #[test]
    fn test_cached_error_clones_equal() {
        let error = GateError::Provisioning("JWT_TOKEN_SECRET missing".to_string());
        assert_eq!(error.clone(), error);
        assert_ne!(error, GateError::Internal);
    }
}
