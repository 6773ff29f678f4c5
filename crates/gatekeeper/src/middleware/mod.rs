//! Middleware for Gatekeeper.
//!
//! # Components
//!
//! - `auth` - Policy enforcement for protected routes

pub mod auth;

pub use auth::{require_policy, AuthState};
