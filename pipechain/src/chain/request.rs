//! Inputs of a chain compilation.

use serde_json::{Map, Value};

use crate::config::PipelineConfig;

/// A built-in task to use in a chain: its path and optional queue.
///
/// Without a queue the pipeline's metadata queue is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    /// Dotted task path.
    pub task_path: String,
    /// Queue override.
    pub queue: Option<String>,
}

impl TaskHandle {
    /// Creates a handle for a task path.
    #[must_use]
    pub fn new(task_path: impl Into<String>) -> Self {
        Self {
            task_path: task_path.into(),
            queue: None,
        }
    }

    /// Routes the task to a specific queue.
    #[must_use]
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }
}

/// Everything [`super::ChainCompiler::compile`] needs to build a chain.
///
/// A request without an execution id starts a fresh run and must carry a
/// configuration. A request with an execution id retries an existing run,
/// which is reconstructed from the cache.
#[derive(Debug, Clone)]
pub struct CompileRequest {
    /// The pipeline id.
    pub pipeline_id: String,
    /// Access key forwarded to tasks.
    pub access_key: Option<String>,
    /// Execution id of the run being retried.
    pub execution_id: Option<String>,
    /// Configuration of a fresh run.
    pub config: Option<PipelineConfig>,
    /// Schema version to validate against.
    pub schema_version: Option<String>,
    /// Queue for tasks without their own.
    pub queue_override: Option<String>,
    /// TTL for tasks without their own.
    pub ttl_override: Option<u64>,
    /// Retry ceiling of a fresh run.
    pub max_retry_override: Option<u32>,
    /// Payload forwarded to every task of a fresh run.
    pub chain_payload: Map<String, Value>,
    /// Attach the retry task as the chain's error handler.
    pub add_retry: bool,
    /// Retry task; defaults to the engine's.
    pub retry_task: Option<TaskHandle>,
    /// Success task; defaults to the engine's.
    pub success_task: Option<TaskHandle>,
    /// Regulator task; defaults to the engine's.
    pub regulator_task: Option<TaskHandle>,
}

impl CompileRequest {
    fn new(pipeline_id: impl Into<String>) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            access_key: None,
            execution_id: None,
            config: None,
            schema_version: None,
            queue_override: None,
            ttl_override: None,
            max_retry_override: None,
            chain_payload: Map::new(),
            add_retry: true,
            retry_task: None,
            success_task: None,
            regulator_task: None,
        }
    }

    /// Requests a fresh run of a pipeline.
    #[must_use]
    pub fn fresh(pipeline_id: impl Into<String>, config: PipelineConfig) -> Self {
        let mut request = Self::new(pipeline_id);
        request.schema_version.clone_from(&config.schema_version);
        request.config = Some(config);
        request
    }

    /// Requests a retry of an existing run.
    #[must_use]
    pub fn retry(pipeline_id: impl Into<String>, execution_id: impl Into<String>) -> Self {
        let mut request = Self::new(pipeline_id);
        request.execution_id = Some(execution_id.into());
        request
    }

    /// Sets the access key.
    #[must_use]
    pub fn with_access_key(mut self, access_key: impl Into<String>) -> Self {
        self.access_key = Some(access_key.into());
        self
    }

    /// Sets the schema version.
    #[must_use]
    pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = Some(version.into());
        self
    }

    /// Sets the queue override.
    #[must_use]
    pub fn with_queue_override(mut self, queue: impl Into<String>) -> Self {
        self.queue_override = Some(queue.into());
        self
    }

    /// Sets the TTL override.
    #[must_use]
    pub fn with_ttl_override(mut self, ttl: u64) -> Self {
        self.ttl_override = Some(ttl);
        self
    }

    /// Sets the retry ceiling override.
    #[must_use]
    pub fn with_max_retry_override(mut self, max_retry: u32) -> Self {
        self.max_retry_override = Some(max_retry);
        self
    }

    /// Sets the chain payload.
    #[must_use]
    pub fn with_chain_payload(mut self, payload: Map<String, Value>) -> Self {
        self.chain_payload = payload;
        self
    }

    /// Enables or disables the retry error handler.
    #[must_use]
    pub fn with_add_retry(mut self, add_retry: bool) -> Self {
        self.add_retry = add_retry;
        self
    }

    /// Uses a custom retry task.
    #[must_use]
    pub fn with_retry_task(mut self, handle: TaskHandle) -> Self {
        self.retry_task = Some(handle);
        self
    }

    /// Uses a custom success task.
    #[must_use]
    pub fn with_success_task(mut self, handle: TaskHandle) -> Self {
        self.success_task = Some(handle);
        self
    }

    /// Uses a custom regulator task.
    #[must_use]
    pub fn with_regulator_task(mut self, handle: TaskHandle) -> Self {
        self.regulator_task = Some(handle);
        self
    }
}
