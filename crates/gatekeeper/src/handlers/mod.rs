//! HTTP request handlers for Gatekeeper.

pub mod health;
pub mod whoami;

pub use health::health_check;
pub use whoami::whoami;
