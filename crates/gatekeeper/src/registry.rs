//! Policy registry.
//!
//! Maps policy names to their primary config and, once provisioned, the shared
//! `ProvisionedPolicy`. Every instance naming a policy registers here; only the
//! primary instance contributes settings.
//!
//! Provisioning runs at most once per name. Setup runs on its own task, so a
//! caller dropped mid-setup does not abandon it; concurrent first requests
//! wait on the same `OnceCell`. The outcome, success or failure, is cached
//! for the lifetime of the registry.

use crate::config::TokenDefaults;
use crate::errors::GateError;
use crate::policy::{JwtProvisioner, PolicyConfig, ProvisionedPolicy, Provisioner};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{OnceCell, RwLock};
use tracing::instrument;

type ProvisionOutcome = Result<Arc<ProvisionedPolicy>, GateError>;

#[derive(Default)]
struct PolicyEntry {
    primary: OnceLock<PolicyConfig>,
    instances: AtomicUsize,
    setup_attempts: AtomicUsize,
    outcome: OnceCell<ProvisionOutcome>,
}

/// Registry of named policies.
pub struct ProviderRegistry {
    entries: RwLock<HashMap<String, Arc<PolicyEntry>>>,
    provisioner: Arc<dyn Provisioner>,
}

impl ProviderRegistry {
    /// Create a registry that provisions with `provisioner`.
    pub fn new(provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            provisioner,
        }
    }

    /// Create a registry provisioning JWT policies.
    pub fn with_jwt(defaults: TokenDefaults, clock_skew: Duration) -> Self {
        Self::new(Arc::new(JwtProvisioner::new(defaults, clock_skew)))
    }

    /// Register a policy instance.
    ///
    /// A primary instance stores its config; registering a second primary
    /// with different settings fails, an identical one is accepted. Reference
    /// instances only count toward the policy's instances.
    ///
    /// # Errors
    ///
    /// `GateError::Registration` for an empty name or a conflicting primary.
    #[instrument(skip_all, name = "gk.registry.register", fields(policy = %config.name))]
    pub async fn register(&self, config: &PolicyConfig) -> Result<(), GateError> {
        if config.name.trim().is_empty() {
            return Err(GateError::Registration("policy name must not be empty".to_string()));
        }

        let mut entries = self.entries.write().await;
        let entry = entries.entry(config.name.clone()).or_default();

        if config.primary {
            if let Some(existing) = entry.primary.get() {
                if !existing.same_settings(config) {
                    tracing::warn!(target: "gk.registry", policy = %config.name, "Conflicting primary instance");
                    return Err(GateError::Registration(format!(
                        "policy '{}' already has a primary instance with different settings",
                        config.name
                    )));
                }
            } else if entry.primary.set(config.clone()).is_err() {
                return Err(GateError::Internal);
            }
        }

        let instances = entry.instances.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(
            target: "gk.registry",
            policy = %config.name,
            primary = config.primary,
            instances,
            "Registered policy instance"
        );

        Ok(())
    }

    /// Return the provisioned policy for `name`, provisioning it on first use.
    ///
    /// # Errors
    ///
    /// - `GateError::Provisioning` if `name` was never registered (not cached)
    /// - The cached provisioning error if provisioning failed before
    /// - `GateError::Internal` if the setup task panicked
    pub async fn provision(&self, name: &str) -> ProvisionOutcome {
        let entry = self.entries.read().await.get(name).cloned().ok_or_else(|| {
            tracing::debug!(target: "gk.registry", policy = %name, "Policy not registered");
            GateError::Provisioning(format!("policy '{name}' is not registered"))
        })?;

        if let Some(outcome) = entry.outcome.get() {
            return outcome.clone();
        }

        let provisioner = Arc::clone(&self.provisioner);
        let name = name.to_string();
        let setup = tokio::spawn(async move {
            entry
                .outcome
                .get_or_init(|| run_provisioner(provisioner.as_ref(), &name, &entry))
                .await
                .clone()
        });

        setup.await.map_err(|e| {
            tracing::error!(target: "gk.registry", error = %e, "Provisioning task failed");
            GateError::Internal
        })?
    }

    /// Number of times provisioning ran for `name`.
    pub async fn setup_attempts(&self, name: &str) -> usize {
        self.entries
            .read()
            .await
            .get(name)
            .map_or(0, |e| e.setup_attempts.load(Ordering::SeqCst))
    }

    /// Number of instances registered under `name`.
    pub async fn instance_count(&self, name: &str) -> usize {
        self.entries
            .read()
            .await
            .get(name)
            .map_or(0, |e| e.instances.load(Ordering::SeqCst))
    }

    /// Registered policy names, sorted.
    pub async fn policy_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

async fn run_provisioner(
    provisioner: &dyn Provisioner,
    name: &str,
    entry: &PolicyEntry,
) -> ProvisionOutcome {
    entry.setup_attempts.fetch_add(1, Ordering::SeqCst);

    let Some(config) = entry.primary.get() else {
        tracing::error!(target: "gk.registry", policy = %name, "Policy has no primary instance");
        return Err(GateError::Provisioning(format!(
            "policy '{name}' has no primary instance"
        )));
    };

    match provisioner.provision(config).await {
        Ok(policy) => {
            tracing::info!(target: "gk.registry", policy = %name, "Policy provisioned");
            Ok(Arc::new(policy))
        }
        Err(e) => {
            tracing::error!(target: "gk.registry", policy = %name, error = %e, "Policy provisioning failed");
            Err(e)
        }
    }
}
