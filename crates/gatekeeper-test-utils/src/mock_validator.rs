//! Scripted validator for provider tests.

use async_trait::async_trait;
use axum::http::request::Parts;
use common::jwt::UserClaims;
use gatekeeper::validator::{Authorization, TokenValidator, ValidationError, ValidatorOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Validator that always gives the same answer and records what it was asked.
pub struct ScriptedValidator {
    answer: Result<Authorization, ValidationError>,
    cookies: Vec<String>,
    calls: AtomicUsize,
    seen_options: Mutex<Vec<ValidatorOptions>>,
}

impl ScriptedValidator {
    pub fn new(answer: Result<Authorization, ValidationError>) -> Self {
        Self {
            answer,
            cookies: vec!["access_token".to_string()],
            calls: AtomicUsize::new(0),
            seen_options: Mutex::new(Vec::new()),
        }
    }

    /// Authorizes every request as `claims`.
    pub fn accepting(claims: UserClaims) -> Self {
        Self::new(Ok(Authorization::valid(claims)))
    }

    /// Rejects every request with `error`.
    pub fn rejecting(error: ValidationError) -> Self {
        Self::new(Err(error))
    }

    pub fn with_cookies(mut self, names: &[&str]) -> Self {
        self.cookies = names.iter().map(|n| (*n).to_string()).collect();
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Options passed to each call, in order.
    pub fn seen_options(&self) -> Vec<ValidatorOptions> {
        self.seen_options.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenValidator for ScriptedValidator {
    async fn authorize(
        &self,
        _request: &Parts,
        options: &ValidatorOptions,
    ) -> Result<Authorization, ValidationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_options.lock().unwrap().push(options.clone());
        self.answer.clone()
    }

    fn cookie_names(&self) -> &[String] {
        &self.cookies
    }
}
