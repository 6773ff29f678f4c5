//! Gatekeeper Library
//!
//! Token-based authentication gateway. Named policies describe how requests
//! are authenticated; any number of plugin instances share one policy, and the
//! policy is provisioned once, lazily, on first use.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware/auth.rs -> provider.rs -> registry.rs -> policy.rs
//!                                                    \-> validator.rs -> acl.rs
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment and policy file
//! - `errors` - Error types with HTTP status code mapping
//! - `acl` - Role-based access list
//! - `validator` - Validator contract and JWT validator
//! - `policy` - Policy configuration and provisioning
//! - `registry` - Named policy registry with exactly-once provisioning
//! - `provider` - Per-request authentication decisions
//! - `redirect` - Login redirect location
//! - `grantor` - Token issuance
//! - `middleware`, `handlers`, `models`, `routes` - Axum HTTP surface

pub mod acl;
pub mod config;
pub mod errors;
pub mod grantor;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod provider;
pub mod redirect;
pub mod registry;
pub mod routes;
pub mod validator;
