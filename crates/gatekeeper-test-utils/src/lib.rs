//! # Gatekeeper Test Utilities
//!
//! Shared test utilities for the Gatekeeper service.
//!
//! This crate provides:
//! - Token builders (`TestTokenBuilder`)
//! - Scripted validators and counting provisioners for registry/provider tests
//! - In-process router harness (`TestGate`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gatekeeper_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let gate = TestGate::new(&[policy_instance("default", true, "/app")]).await;
//!     let token = TestTokenBuilder::new().for_user("alice").with_roles(&["guest"]).sign();
//!
//!     let response = gate.get("/app/whoami", Some(&token)).await;
//!     assert_eq!(response.status, 200);
//! }
//! ```

pub mod mock_validator;
pub mod provisioners;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use mock_validator::*;
pub use provisioners::*;
pub use server_harness::*;
pub use token_builders::*;
