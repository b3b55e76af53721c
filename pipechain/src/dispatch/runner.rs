//! Publishing standalone work outside of a compiled chain.

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

use super::TaskExecutionService;
use crate::config::EngineSettings;
use crate::errors::{ConfigError, PipechainError};
use crate::signature::{SignatureRequest, TaskSignature, TaskSignatureFactory};

/// Default key under which batched payloads are nested.
pub const DEFAULT_GROUPING_KEY: &str = "tasks";

/// Default number of payloads per batched task.
pub const DEFAULT_MAX_PER_TASK: usize = 5;

/// A list of payloads to split across several invocations of one task.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    /// Task to invoke for every chunk.
    pub task_path: String,
    /// Payloads to distribute.
    pub payloads: Vec<Value>,
    /// Queue every chunk is routed to.
    pub queue: String,
    /// Event key holding a chunk.
    pub grouping_key: String,
    /// Maximum payloads per task.
    pub max_per_task: usize,
    /// TTL of each task.
    pub max_ttl: Option<u64>,
}

impl BatchRequest {
    /// Creates a batch with the default grouping key and chunk size.
    #[must_use]
    pub fn new(task_path: impl Into<String>, queue: impl Into<String>, payloads: Vec<Value>) -> Self {
        Self {
            task_path: task_path.into(),
            payloads,
            queue: queue.into(),
            grouping_key: DEFAULT_GROUPING_KEY.to_string(),
            max_per_task: DEFAULT_MAX_PER_TASK,
            max_ttl: None,
        }
    }

    /// Sets the key chunks are nested under.
    #[must_use]
    pub fn with_grouping_key(mut self, key: impl Into<String>) -> Self {
        self.grouping_key = key.into();
        self
    }

    /// Sets the chunk size.
    #[must_use]
    pub fn with_max_per_task(mut self, max_per_task: usize) -> Self {
        self.max_per_task = max_per_task;
        self
    }

    /// Sets the TTL of each task.
    #[must_use]
    pub fn with_max_ttl(mut self, max_ttl: u64) -> Self {
        self.max_ttl = Some(max_ttl);
        self
    }
}

/// Publishes individual tasks to an execution service.
///
/// Unlike chain tasks, published work belongs to no run: its event holds the
/// given payload plus `access_key`, `pipeline_id` and `execution_id` set to
/// null.
pub struct TaskRunner {
    service: Arc<dyn TaskExecutionService>,
    factory: TaskSignatureFactory,
    worker_queue: Option<String>,
}

impl TaskRunner {
    /// Creates a runner.
    #[must_use]
    pub fn new(service: Arc<dyn TaskExecutionService>, settings: &EngineSettings) -> Self {
        Self {
            service,
            factory: TaskSignatureFactory::new(settings),
            worker_queue: settings.worker_queue.clone(),
        }
    }

    /// Publishes one task and returns its task id.
    ///
    /// The payload keys become the task's event. Without a queue the
    /// worker queue from the settings is used; with neither the request is
    /// rejected.
    pub async fn publish_work(
        &self,
        task_path: &str,
        payload: Map<String, Value>,
        queue: Option<String>,
        max_ttl: Option<u64>,
    ) -> Result<String, PipechainError> {
        let signature = self.build(task_path, payload, queue, max_ttl)?;
        let task_id = signature.task_id().to_string();
        self.service.publish(signature).await?;
        debug!(task_path, %task_id, "Published work");
        Ok(task_id)
    }

    /// Splits a batch into chunks and publishes one task per chunk.
    ///
    /// Every signature is built before any is published, so a construction
    /// failure publishes nothing. Returns the number of tasks published.
    pub async fn publish_batch(&self, batch: BatchRequest) -> Result<usize, PipechainError> {
        if batch.max_per_task == 0 {
            return Err(ConfigError::new("max_per_task must be at least 1")
                .with_field("max_per_task")
                .into());
        }

        let signatures = batch
            .payloads
            .chunks(batch.max_per_task)
            .map(|chunk| {
                let mut payload = Map::new();
                payload.insert(batch.grouping_key.clone(), Value::Array(chunk.to_vec()));
                self.build(&batch.task_path, payload, Some(batch.queue.clone()), batch.max_ttl)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let count = signatures.len();
        for signature in signatures {
            self.service.publish(signature).await?;
        }

        info!(
            task_path = %batch.task_path,
            payloads = batch.payloads.len(),
            tasks = count,
            "Published batch"
        );
        Ok(count)
    }

    fn build(
        &self,
        task_path: &str,
        payload: Map<String, Value>,
        queue: Option<String>,
        max_ttl: Option<u64>,
    ) -> Result<TaskSignature, ConfigError> {
        self.factory.build(
            SignatureRequest::new(task_path)
                .with_optional_queue(queue.or_else(|| self.worker_queue.clone()))
                .with_optional_max_ttl(max_ttl)
                .with_custom_event_data(payload),
        )
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("factory", &self.factory)
            .field("worker_queue", &self.worker_queue)
            .finish_non_exhaustive()
    }
}
