//! Provisioners that count their runs.

use async_trait::async_trait;
use gatekeeper::errors::GateError;
use gatekeeper::policy::{PolicyConfig, ProvisionedPolicy, Provisioner};
use gatekeeper::validator::TokenValidator;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Provisioner wrapping a fixed validator, or failing with a fixed reason.
///
/// An optional delay widens the window for concurrent first requests.
pub struct CountingProvisioner {
    validator: Option<Arc<dyn TokenValidator>>,
    failure: String,
    delay: Duration,
    runs: AtomicUsize,
}

impl CountingProvisioner {
    pub fn succeeding(validator: Arc<dyn TokenValidator>) -> Self {
        Self {
            validator: Some(validator),
            failure: String::new(),
            delay: Duration::ZERO,
            runs: AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            validator: None,
            failure: reason.to_string(),
            delay: Duration::ZERO,
            runs: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provisioner for CountingProvisioner {
    async fn provision(&self, config: &PolicyConfig) -> Result<ProvisionedPolicy, GateError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.validator {
            Some(validator) => Ok(ProvisionedPolicy::with_validator(config, Arc::clone(validator))),
            None => Err(GateError::Provisioning(self.failure.clone())),
        }
    }
}
