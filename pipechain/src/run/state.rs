//! Durable, cache-backed record of a single pipeline run.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::result::{ResultState, ResultStatus, ResultStore};
use crate::cache::{keys, load_json, store_json, KeyValueCache};
use crate::config::{
    PipelineConfig, PipelineConfigValidator, DEFAULT_MAX_RETRY, DEFAULT_TASK_TTL,
};
use crate::errors::{ConfigError, NotFoundError, PipechainError};
use crate::graph::{ExecutionGraph, ExecutionGraphBuilder};
use crate::signature::TaskEvent;
use crate::utils::generate_execution_id;

/// Message recorded after a successful load.
pub const LOADED_MESSAGE: &str = "Loaded successfully.";

/// Flags controlling [`RunState::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Check the retry ceiling after loading.
    pub verify_retry_count: bool,
    /// Deadletter the run when loading fails or the ceiling is reached.
    pub allow_deadletter: bool,
    /// Count this load as a retry.
    pub is_retry: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            verify_retry_count: true,
            allow_deadletter: true,
            is_retry: false,
        }
    }
}

impl LoadOptions {
    /// Default options with `is_retry` set.
    #[must_use]
    pub fn retry() -> Self {
        Self {
            is_retry: true,
            ..Self::default()
        }
    }

    /// Sets `is_retry`.
    #[must_use]
    pub fn with_is_retry(mut self, is_retry: bool) -> Self {
        self.is_retry = is_retry;
        self
    }

    /// Sets `verify_retry_count`.
    #[must_use]
    pub fn with_verify_retry_count(mut self, verify: bool) -> Self {
        self.verify_retry_count = verify;
        self
    }

    /// Sets `allow_deadletter`.
    #[must_use]
    pub fn with_allow_deadletter(mut self, allow: bool) -> Self {
        self.allow_deadletter = allow;
        self
    }
}

/// The cached subset of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedRunRecord {
    pipeline_config: Option<PipelineConfig>,
    max_ttl: u64,
    max_retry: u32,
    retry_count: u32,
    chain_payload: Map<String, Value>,
    pipeline_id: String,
}

enum LoadOutcome {
    Ready,
    RetryExceeded,
}

/// One run of a pipeline, identified by `(pipeline_id, execution_id)`.
///
/// A run is either seeded with a configuration (first dispatch) or
/// reconstructed from the cache by id (retries and tasks inside a running
/// pipeline). [`RunState::load`] must be called before the run is used.
pub struct RunState {
    pipeline_id: String,
    execution_id: String,
    pipeline_config: Option<PipelineConfig>,
    schema_version: Option<String>,
    max_ttl: u64,
    max_retry: u32,
    retry_count: u32,
    chain_payload: Map<String, Value>,
    good_to_go: bool,
    loading_message: Option<String>,
    execution_graph: Option<ExecutionGraph>,
    cache: Arc<dyn KeyValueCache>,
    results: ResultStore,
}

impl RunState {
    /// Starts a run with a fresh execution id and default limits.
    #[must_use]
    pub fn new(pipeline_id: impl Into<String>, cache: Arc<dyn KeyValueCache>) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            execution_id: generate_execution_id(),
            pipeline_config: None,
            schema_version: None,
            max_ttl: DEFAULT_TASK_TTL,
            max_retry: DEFAULT_MAX_RETRY,
            retry_count: 0,
            chain_payload: Map::new(),
            good_to_go: false,
            loading_message: None,
            execution_graph: None,
            results: ResultStore::new(Arc::clone(&cache)),
            cache,
        }
    }

    /// Creates a run in one call.
    ///
    /// Without an execution id a new UUIDv4 is generated.
    #[must_use]
    pub fn create(
        cache: Arc<dyn KeyValueCache>,
        pipeline_id: impl Into<String>,
        config: PipelineConfig,
        execution_id: Option<String>,
        max_ttl: u64,
        max_retry: u32,
        chain_payload: Option<Map<String, Value>>,
    ) -> Self {
        let mut state = Self::new(pipeline_id, cache)
            .with_config(config)
            .with_max_ttl(max_ttl)
            .with_max_retry(max_retry)
            .with_chain_payload(chain_payload.unwrap_or_default());
        if let Some(execution_id) = execution_id {
            state.execution_id = execution_id;
        }
        state
    }

    /// Prepares a run that will be reconstructed from the cache.
    #[must_use]
    pub fn for_execution(
        cache: Arc<dyn KeyValueCache>,
        pipeline_id: impl Into<String>,
        execution_id: impl Into<String>,
    ) -> Self {
        Self::new(pipeline_id, cache).with_execution_id(execution_id)
    }

    /// Reconstructs and loads the run referenced by a task's event payload.
    pub async fn from_event(
        cache: Arc<dyn KeyValueCache>,
        event: &TaskEvent,
    ) -> Result<Self, ConfigError> {
        let pipeline_id = event
            .pipeline_id()
            .ok_or_else(|| ConfigError::new("event is missing pipeline_id").with_field("pipeline_id"))?;
        let execution_id = event
            .execution_id()
            .ok_or_else(|| ConfigError::new("event is missing execution_id").with_field("execution_id"))?;

        let mut state = Self::for_execution(cache, pipeline_id, execution_id);
        state.load(LoadOptions::default()).await;
        Ok(state)
    }

    /// Seeds the run with a configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.pipeline_config = Some(config);
        self
    }

    /// Uses an existing execution id.
    #[must_use]
    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = execution_id.into();
        self
    }

    /// Validates against a specific schema version.
    #[must_use]
    pub fn with_schema_version(mut self, version: Option<String>) -> Self {
        self.schema_version = version;
        self
    }

    /// Sets the run TTL. Pipeline metadata takes precedence on load.
    #[must_use]
    pub fn with_max_ttl(mut self, max_ttl: u64) -> Self {
        self.max_ttl = max_ttl;
        self
    }

    /// Sets the retry ceiling. Pipeline metadata takes precedence on load.
    #[must_use]
    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry;
        self
    }

    /// Sets the payload forwarded to every task.
    #[must_use]
    pub fn with_chain_payload(mut self, payload: Map<String, Value>) -> Self {
        self.chain_payload = payload;
        self
    }

    /// Sets the TTL given to results written by this run.
    #[must_use]
    pub fn with_result_ttl(mut self, ttl: u64) -> Self {
        self.results = self.results.with_default_ttl(ttl);
        self
    }

    /// The pipeline id.
    #[must_use]
    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    /// The execution id.
    #[must_use]
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// The run's configuration, once known.
    #[must_use]
    pub fn pipeline_config(&self) -> Option<&PipelineConfig> {
        self.pipeline_config.as_ref()
    }

    /// The execution graph, built by a successful load.
    #[must_use]
    pub fn execution_graph(&self) -> Option<&ExecutionGraph> {
        self.execution_graph.as_ref()
    }

    /// TTL of the run record in seconds.
    #[must_use]
    pub fn max_ttl(&self) -> u64 {
        self.max_ttl
    }

    /// The retry ceiling.
    #[must_use]
    pub fn max_retry(&self) -> u32 {
        self.max_retry
    }

    /// Number of retries so far.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Payload forwarded to every task.
    #[must_use]
    pub fn chain_payload(&self) -> &Map<String, Value> {
        &self.chain_payload
    }

    /// Whether the last load left the run ready to execute.
    #[must_use]
    pub fn good_to_go(&self) -> bool {
        self.good_to_go
    }

    /// Diagnostic from the last load.
    #[must_use]
    pub fn loading_message(&self) -> Option<&str> {
        self.loading_message.as_deref()
    }

    /// The store results of this run are written to.
    #[must_use]
    pub fn result_store(&self) -> &ResultStore {
        &self.results
    }

    /// The cache key of the run record.
    #[must_use]
    pub fn cache_key(&self) -> String {
        keys::run_state_key(&self.pipeline_id, &self.execution_id)
    }

    /// Returns true once the retry count has reached the ceiling.
    #[must_use]
    pub fn retry_exceeded(&self) -> bool {
        self.retry_count >= self.max_retry
    }

    /// Loads the run. Never fails.
    ///
    /// Problems are recorded in [`loading_message`](Self::loading_message)
    /// and leave [`good_to_go`](Self::good_to_go) false; when
    /// `allow_deadletter` is set the run is deadlettered as well.
    pub async fn load(&mut self, options: LoadOptions) {
        match self.try_load(options).await {
            Ok(LoadOutcome::Ready) => {
                self.good_to_go = true;
                self.loading_message = Some(LOADED_MESSAGE.to_string());
                info!(
                    pipeline_id = %self.pipeline_id,
                    execution_id = %self.execution_id,
                    retry_count = self.retry_count,
                    "Run loaded"
                );
            }
            Ok(LoadOutcome::RetryExceeded) => {
                let message = format!(
                    "Attempted to retry {}_{}; exceeded retry count.",
                    self.pipeline_id, self.execution_id
                );
                warn!(
                    pipeline_id = %self.pipeline_id,
                    execution_id = %self.execution_id,
                    retry_count = self.retry_count,
                    max_retry = self.max_retry,
                    "{message}"
                );
                self.good_to_go = false;
                self.loading_message = Some(message);
                if options.allow_deadletter {
                    self.deadletter_quietly().await;
                }
            }
            Err(err) => {
                error!(
                    pipeline_id = %self.pipeline_id,
                    execution_id = %self.execution_id,
                    error = %err,
                    "Failed to load run"
                );
                self.good_to_go = false;
                self.loading_message = Some(err.to_string());
                if options.allow_deadletter {
                    self.deadletter_quietly().await;
                }
            }
        }
    }

    async fn try_load(&mut self, options: LoadOptions) -> Result<LoadOutcome, PipechainError> {
        if self.pipeline_config.is_none() {
            let key = self.cache_key();
            let record: CachedRunRecord = load_json(self.cache.as_ref(), &key)
                .await?
                .ok_or_else(|| NotFoundError::new(key.clone()))?;
            debug!(key = %key, retry_count = record.retry_count, "Run record found in cache");
            self.apply_record(record);
        }

        let (graph, metadata_ttl, metadata_retry) = {
            let config = self.pipeline_config.as_ref().ok_or_else(|| {
                ConfigError::new("pipeline_config not set").with_field("pipeline_config")
            })?;
            PipelineConfigValidator::validate(config, self.schema_version.as_deref())?;
            let graph = ExecutionGraphBuilder::build(config)?;
            (graph, config.metadata.resolved_max_ttl(), config.metadata.max_retry)
        };

        self.execution_graph = Some(graph);
        if let Some(ttl) = metadata_ttl {
            self.max_ttl = ttl;
        }
        if let Some(max_retry) = metadata_retry {
            self.max_retry = max_retry;
        }

        if options.is_retry {
            self.increment_retry(false).await?;
        }

        if options.verify_retry_count && self.retry_exceeded() {
            return Ok(LoadOutcome::RetryExceeded);
        }

        self.save_to_cache().await?;
        Ok(LoadOutcome::Ready)
    }

    fn apply_record(&mut self, record: CachedRunRecord) {
        self.pipeline_config = record.pipeline_config;
        self.max_ttl = record.max_ttl;
        self.max_retry = record.max_retry;
        self.retry_count = record.retry_count;
        self.chain_payload = record.chain_payload;
        self.pipeline_id = record.pipeline_id;
    }

    fn record(&self) -> CachedRunRecord {
        CachedRunRecord {
            pipeline_config: self.pipeline_config.clone(),
            max_ttl: self.max_ttl,
            max_retry: self.max_retry,
            retry_count: self.retry_count,
            chain_payload: self.chain_payload.clone(),
            pipeline_id: self.pipeline_id.clone(),
        }
    }

    /// Writes the cached subset of the run with TTL `max_ttl`.
    pub async fn save_to_cache(&self) -> Result<(), PipechainError> {
        store_json(self.cache.as_ref(), &self.cache_key(), &self.record(), self.max_ttl).await
    }

    /// Increments the retry count and persists it.
    ///
    /// With `exceed_max` the count jumps to `max_retry + 1` so no further
    /// retry can pass the ceiling check.
    pub async fn increment_retry(&mut self, exceed_max: bool) -> Result<u32, PipechainError> {
        self.retry_count = if exceed_max {
            self.max_retry.saturating_add(1)
        } else {
            self.retry_count.saturating_add(1)
        };
        debug!(execution_id = %self.execution_id, retry_count = self.retry_count, "Incremented retry count");
        self.save_to_cache().await?;
        Ok(self.retry_count)
    }

    /// Marks the run permanently failed.
    ///
    /// Writes a `failed` result and pushes the retry count past the ceiling.
    /// Safe to call repeatedly.
    pub async fn deadletter(&mut self) -> Result<(), PipechainError> {
        self.good_to_go = false;
        let result = ResultState::new(self.execution_id.clone(), ResultStatus::Failed)?
            .with_ttl(self.results_ttl())
            .with_result(Value::String(format!(
                "Pipeline retried and failed {} times.",
                self.retry_count
            )));
        self.results.save(result).await?;
        self.increment_retry(true).await?;
        warn!(pipeline_id = %self.pipeline_id, execution_id = %self.execution_id, "Run deadlettered");
        Ok(())
    }

    async fn deadletter_quietly(&mut self) {
        if let Err(err) = self.deadletter().await {
            error!(execution_id = %self.execution_id, error = %err, "Deadletter failed");
        }
    }

    fn results_ttl(&self) -> u64 {
        self.results.default_ttl()
    }

    /// Removes the cached run record.
    pub async fn delete(&self) -> Result<(), PipechainError> {
        self.cache.delete(&self.cache_key()).await?;
        Ok(())
    }
}

impl fmt::Debug for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunState")
            .field("pipeline_id", &self.pipeline_id)
            .field("execution_id", &self.execution_id)
            .field("max_ttl", &self.max_ttl)
            .field("max_retry", &self.max_retry)
            .field("retry_count", &self.retry_count)
            .field("good_to_go", &self.good_to_go)
            .field("loading_message", &self.loading_message)
            .finish_non_exhaustive()
    }
}
