//! Engine-wide settings.
//!
//! Worker identity and defaults are carried explicitly and handed to the
//! components that need them instead of being read from process globals.

use serde::{Deserialize, Serialize};

use super::deployment::DeploymentConfig;
use crate::dispatch::RetryPolicy;
use crate::errors::ConfigError;

/// Default TTL for a task when nothing more specific is configured.
pub const DEFAULT_TASK_TTL: u64 = 60;
/// Default retry ceiling for a run.
pub const DEFAULT_MAX_RETRY: u32 = 3;
/// Default TTL for stored results.
pub const DEFAULT_RESULT_TTL: u64 = 86_400;
/// Default expiry of a signature before it is discarded unexecuted.
pub const DEFAULT_SIGNATURE_EXPIRES: u64 = 86_400;

/// Task path of the built-in retry task.
pub const RETRY_TASK_PATH: &str = "pipechain.tasks.pipeline_retry";
/// Task path of the built-in success task.
pub const SUCCESS_TASK_PATH: &str = "pipechain.tasks.pipeline_success";
/// Task path of the built-in regulator task.
pub const REGULATOR_TASK_PATH: &str = "pipechain.tasks.task_chain_regulator";

const ENV_PREFIX: &str = "PIPECHAIN_";

/// Settings shared by the compiler, the signature factory and the built-in tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Name of this worker, stamped on produced signatures.
    pub worker_name: Option<String>,
    /// Queue of this worker's deployment entry, used when published work
    /// names no queue.
    #[serde(default)]
    pub worker_queue: Option<String>,
    /// Default task TTL in seconds.
    pub default_task_ttl: u64,
    /// Default retry ceiling.
    pub default_max_retry: u32,
    /// Default result TTL in seconds.
    pub default_result_ttl: u64,
    /// Signature expiry in seconds.
    pub signature_expires: u64,
    /// Task path of the retry task.
    pub retry_task_path: String,
    /// Task path of the success task.
    pub success_task_path: String,
    /// Task path of the regulator task.
    pub regulator_task_path: String,
    /// Backoff applied before a retried run is resubmitted.
    pub retry_policy: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            worker_name: None,
            worker_queue: None,
            default_task_ttl: DEFAULT_TASK_TTL,
            default_max_retry: DEFAULT_MAX_RETRY,
            default_result_ttl: DEFAULT_RESULT_TTL,
            signature_expires: DEFAULT_SIGNATURE_EXPIRES,
            retry_task_path: RETRY_TASK_PATH.to_string(),
            success_task_path: SUCCESS_TASK_PATH.to_string(),
            regulator_task_path: REGULATOR_TASK_PATH.to_string(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl EngineSettings {
    /// Creates settings with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker name.
    #[must_use]
    pub fn with_worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = Some(name.into());
        self
    }

    /// Sets the fallback queue for published work.
    #[must_use]
    pub fn with_worker_queue(mut self, queue: impl Into<String>) -> Self {
        self.worker_queue = Some(queue.into());
        self
    }

    /// Takes the worker queue from this worker's deployment entry.
    ///
    /// Without a worker name the settings are returned unchanged. A named
    /// worker missing from the deployment is an error.
    pub fn with_deployment(mut self, deployment: &DeploymentConfig) -> Result<Self, ConfigError> {
        if let Some(service) = deployment.service_for_worker(self.worker_name.as_deref())? {
            if let Some(queue) = &service.queue {
                self.worker_queue = Some(queue.clone());
            }
        }
        Ok(self)
    }

    /// Sets the default task TTL.
    #[must_use]
    pub fn with_default_task_ttl(mut self, ttl: u64) -> Self {
        self.default_task_ttl = ttl;
        self
    }

    /// Sets the default retry ceiling.
    #[must_use]
    pub fn with_default_max_retry(mut self, max_retry: u32) -> Self {
        self.default_max_retry = max_retry;
        self
    }

    /// Sets the default result TTL.
    #[must_use]
    pub fn with_default_result_ttl(mut self, ttl: u64) -> Self {
        self.default_result_ttl = ttl;
        self
    }

    /// Sets the retry backoff policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Reads settings from `PIPECHAIN_*` environment variables.
    ///
    /// Recognised: `WORKER_NAME`, `DEFAULT_TASK_TTL`, `DEFAULT_MAX_RETRY`,
    /// `RESULT_TTL`. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Reads settings through an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.trim().is_empty());
        let mut settings = Self::default();

        if let Some(name) = get("WORKER_NAME") {
            settings.worker_name = Some(name);
        }
        if let Some(raw) = get("DEFAULT_TASK_TTL") {
            settings.default_task_ttl = parse_number("DEFAULT_TASK_TTL", &raw)?;
        }
        if let Some(raw) = get("DEFAULT_MAX_RETRY") {
            settings.default_max_retry = parse_number("DEFAULT_MAX_RETRY", &raw)?;
        }
        if let Some(raw) = get("RESULT_TTL") {
            settings.default_result_ttl = parse_number("RESULT_TTL", &raw)?;
        }

        Ok(settings)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| {
        ConfigError::new(format!("{ENV_PREFIX}{name} must be a non-negative integer, got '{raw}'"))
            .with_field(format!("{ENV_PREFIX}{name}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.default_task_ttl, 60);
        assert_eq!(settings.default_max_retry, 3);
        assert_eq!(settings.signature_expires, 86_400);
        assert!(settings.worker_name.is_none());
    }

    #[test]
    fn test_from_vars_overrides() {
        let settings = EngineSettings::from_vars(lookup(&[
            ("PIPECHAIN_WORKER_NAME", "worker-a"),
            ("PIPECHAIN_DEFAULT_TASK_TTL", "120"),
            ("PIPECHAIN_DEFAULT_MAX_RETRY", "5"),
        ]))
        .unwrap();

        assert_eq!(settings.worker_name.as_deref(), Some("worker-a"));
        assert_eq!(settings.default_task_ttl, 120);
        assert_eq!(settings.default_max_retry, 5);
        assert_eq!(settings.default_result_ttl, DEFAULT_RESULT_TTL);
    }

    #[test]
    fn test_with_deployment_resolves_worker_queue() {
        let deployment: DeploymentConfig = serde_json::from_str(
            r#"{"serviceConfig": [
                {"name": "worker-a", "serviceType": "celery-worker", "queue": "q-a"}
            ]}"#,
        )
        .unwrap();

        let settings = EngineSettings::new()
            .with_worker_name("worker-a")
            .with_deployment(&deployment)
            .unwrap();
        assert_eq!(settings.worker_queue.as_deref(), Some("q-a"));

        let unnamed = EngineSettings::new().with_deployment(&deployment).unwrap();
        assert!(unnamed.worker_queue.is_none());

        let err = EngineSettings::new()
            .with_worker_name("worker-b")
            .with_deployment(&deployment)
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("serviceConfig"));
    }

    #[test]
    fn test_from_vars_rejects_malformed_number() {
        let err = EngineSettings::from_vars(lookup(&[("PIPECHAIN_RESULT_TTL", "soon")])).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("PIPECHAIN_RESULT_TTL"));
    }
}
