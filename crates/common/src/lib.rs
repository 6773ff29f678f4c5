//! Common utilities and types shared across Gatekeeper components.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (claim set, signing methods, constants)
pub mod jwt;
