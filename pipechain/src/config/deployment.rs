//! Deployment description: which services exist and how workers are configured.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Service type of a task worker.
pub const WORKER_SERVICE_TYPE: &str = "celery-worker";

/// A single deployed service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    /// Service name; for workers this is the worker name.
    pub name: String,
    /// Service type, e.g. `celery-worker`.
    pub service_type: String,
    /// Queue the service consumes from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    /// Task paths registered on the worker.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub registered_tasks: Vec<RegisteredTask>,
}

/// A task registered on a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredTask {
    /// Dotted task path.
    pub handler: String,
}

/// The deployment-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    /// Every deployed service.
    #[serde(default)]
    pub service_config: Vec<ServiceDefinition>,
}

impl DeploymentConfig {
    /// Returns the worker service named `worker_name`.
    ///
    /// Without a worker name there is nothing to look up and `None` is
    /// returned. A name with no matching worker entry is a deployment error.
    pub fn service_for_worker(
        &self,
        worker_name: Option<&str>,
    ) -> Result<Option<&ServiceDefinition>, ConfigError> {
        let Some(name) = worker_name else {
            return Ok(None);
        };

        self.service_config
            .iter()
            .find(|s| s.service_type == WORKER_SERVICE_TYPE && s.name == name)
            .map(Some)
            .ok_or_else(|| {
                ConfigError::new(format!(
                    "Could not find a service config for worker '{name}'. \
                     Add a service with name '{name}' and serviceType '{WORKER_SERVICE_TYPE}'."
                ))
                .with_field("serviceConfig")
            })
    }
}
