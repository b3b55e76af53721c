//! Compilation of a run into an executable chain.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use super::model::{Barrier, BarrierKind, ChainStep, ExecutableChain};
use super::request::{CompileRequest, TaskHandle};
use crate::cache::KeyValueCache;
use crate::config::{ConfigService, EngineSettings, PipelineConfig, PipelineConfigValidator};
use crate::errors::{ConfigError, GraphError, PipechainError};
use crate::run::{LoadOptions, RunState};
use crate::signature::{SignatureRequest, TaskSignature, TaskSignatureFactory};

/// Resolved per-compile values shared by every signature of a chain.
struct ChainScope<'a> {
    request: &'a CompileRequest,
    run: &'a RunState,
    config: &'a PipelineConfig,
    metadata_queue: Option<String>,
    default_queue: Option<String>,
    default_ttl: u64,
}

/// Turns pipeline runs into [`ExecutableChain`]s.
///
/// Compilation loads (and for retries, advances) the run record in the cache
/// but never submits anything; submission is up to the caller.
pub struct ChainCompiler {
    cache: Arc<dyn KeyValueCache>,
    factory: TaskSignatureFactory,
    settings: EngineSettings,
}

impl ChainCompiler {
    /// Creates a compiler over a cache.
    #[must_use]
    pub fn new(cache: Arc<dyn KeyValueCache>, settings: &EngineSettings) -> Self {
        Self {
            cache,
            factory: TaskSignatureFactory::new(settings),
            settings: settings.clone(),
        }
    }

    /// The signature factory used for every signature of a chain.
    #[must_use]
    pub fn factory(&self) -> &TaskSignatureFactory {
        &self.factory
    }

    /// The engine settings.
    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// The cache run records live in.
    #[must_use]
    pub fn cache(&self) -> Arc<dyn KeyValueCache> {
        Arc::clone(&self.cache)
    }

    /// Compiles a run into a chain.
    ///
    /// Returns `Ok(None)` when the run is not good to go, for example after
    /// it exhausted its retries; the run's result then records the failure.
    pub async fn compile(&self, request: CompileRequest) -> Result<Option<ExecutableChain>, PipechainError> {
        Ok(self.compile_run(request).await?.0)
    }

    /// Like [`compile`](Self::compile), also returning the loaded run.
    pub async fn compile_run(
        &self,
        request: CompileRequest,
    ) -> Result<(Option<ExecutableChain>, RunState), PipechainError> {
        let is_retry = request.execution_id.is_some();
        let mut run = self.prepare_run(&request)?;
        run.load(LoadOptions::default().with_is_retry(is_retry)).await;

        if !run.good_to_go() {
            info!(
                pipeline_id = %run.pipeline_id(),
                execution_id = %run.execution_id(),
                message = run.loading_message().unwrap_or_default(),
                "Chain not good to go"
            );
            return Ok((None, run));
        }

        let chain = self.assemble(&request, &run)?;
        info!(
            pipeline_id = %chain.pipeline_id,
            execution_id = %chain.execution_id,
            is_retry,
            retry_count = run.retry_count(),
            steps = chain.len(),
            signatures = chain.signature_count(),
            "Compiled chain"
        );
        Ok((Some(chain), run))
    }

    /// Fetches the latest configuration of a pipeline and compiles a fresh run.
    ///
    /// An unknown pipeline or an invalid configuration is a [`ConfigError`].
    pub async fn compile_latest(
        &self,
        service: &dyn ConfigService,
        pipeline_id: &str,
        access_key: Option<String>,
    ) -> Result<Option<ExecutableChain>, PipechainError> {
        let versioned = service
            .retrieve_latest_pipeline_config(pipeline_id, access_key.clone())
            .await?
            .ok_or_else(|| {
                ConfigError::new(format!(
                    "Unable to load pipeline configuration for pipeline id '{pipeline_id}'"
                ))
                .with_field("pipeline_id")
            })?;
        PipelineConfigValidator::validate(&versioned.config, versioned.schema_version.as_deref())?;

        let mut request = CompileRequest::fresh(pipeline_id, versioned.config);
        request.schema_version = versioned.schema_version;
        request.access_key = access_key;
        self.compile(request).await
    }

    fn prepare_run(&self, request: &CompileRequest) -> Result<RunState, PipechainError> {
        let run = match &request.execution_id {
            Some(execution_id) => {
                RunState::for_execution(self.cache(), &request.pipeline_id, execution_id)
            }
            None => {
                let config = request.config.clone().ok_or_else(|| {
                    ConfigError::new("a fresh run requires a pipeline configuration").with_field("config")
                })?;
                let max_ttl = request
                    .ttl_override
                    .or_else(|| config.metadata.resolved_max_ttl())
                    .unwrap_or(self.settings.default_task_ttl);
                let max_retry = request
                    .max_retry_override
                    .or(config.metadata.max_retry)
                    .unwrap_or(self.settings.default_max_retry);

                RunState::new(&request.pipeline_id, self.cache())
                    .with_config(config)
                    .with_max_ttl(max_ttl)
                    .with_max_retry(max_retry)
                    .with_chain_payload(request.chain_payload.clone())
            }
        };

        Ok(run
            .with_schema_version(request.schema_version.clone())
            .with_result_ttl(self.settings.default_result_ttl))
    }

    fn assemble(&self, request: &CompileRequest, run: &RunState) -> Result<ExecutableChain, PipechainError> {
        let config = run.pipeline_config().ok_or_else(|| {
            ConfigError::new("loaded run has no pipeline configuration").with_field("pipeline_config")
        })?;
        let groups = run
            .execution_graph()
            .map(|graph| graph.chainable_groups())
            .unwrap_or_default();

        let metadata_queue = config.metadata.resolved_queue().map(str::to_string);
        let scope = ChainScope {
            request,
            run,
            config,
            default_queue: request.queue_override.clone().or_else(|| metadata_queue.clone()),
            metadata_queue,
            default_ttl: request
                .ttl_override
                .or_else(|| config.metadata.resolved_max_ttl())
                .unwrap_or_else(|| self.factory.default_ttl()),
        };

        let mut steps = Vec::with_capacity(groups.len() * 2 + 2);
        for (index, group) in groups.iter().enumerate() {
            let mut signatures = group
                .iter()
                .map(|node| self.node_signature(&scope, node))
                .collect::<Result<Vec<_>, _>>()?;
            if signatures.len() <= 1 {
                signatures.push(self.regulator_signature(&scope)?);
            }
            debug!(group = index, size = signatures.len(), "Built barrier");

            steps.push(ChainStep::Barrier(Barrier {
                kind: BarrierKind::Group(index),
                signatures,
            }));
            steps.push(ChainStep::Regulator(self.regulator_signature(&scope)?));
        }

        steps.push(ChainStep::Barrier(Barrier {
            kind: BarrierKind::Success,
            signatures: vec![self.success_signature(&scope)?],
        }));
        steps.push(ChainStep::Regulator(self.regulator_signature(&scope)?));

        let error_handler = if request.add_retry {
            Some(self.retry_signature(&scope)?)
        } else {
            None
        };

        Ok(ExecutableChain {
            pipeline_id: run.pipeline_id().to_string(),
            execution_id: run.execution_id().to_string(),
            steps,
            error_handler,
        })
    }

    fn base_request(scope: &ChainScope<'_>, task_path: &str) -> SignatureRequest {
        SignatureRequest::new(task_path)
            .with_pipeline_id(scope.run.pipeline_id())
            .with_execution_id(scope.run.execution_id())
    }

    fn handle<'a>(handle: Option<&'a TaskHandle>, default_path: &'a str) -> (&'a str, Option<String>) {
        match handle {
            Some(handle) => (handle.task_path.as_str(), handle.queue.clone()),
            None => (default_path, None),
        }
    }

    fn node_signature(&self, scope: &ChainScope<'_>, node: &str) -> Result<TaskSignature, PipechainError> {
        let definition = scope
            .config
            .task_definition(node)
            .ok_or_else(|| GraphError::UndefinedNode {
                node: node.to_string(),
                referenced_by: None,
            })?;
        let task_config = definition.task_config();

        let queue = task_config
            .resolved_queue()
            .map(str::to_string)
            .or_else(|| scope.default_queue.clone());
        let max_ttl = task_config.resolved_max_ttl().unwrap_or(scope.default_ttl);

        let request = Self::base_request(scope, &definition.handler)
            .with_access_key(scope.request.access_key.clone())
            .with_optional_queue(queue)
            .with_max_ttl(max_ttl)
            .with_task_config(task_config);
        Ok(self.factory.build(request)?)
    }

    fn regulator_signature(&self, scope: &ChainScope<'_>) -> Result<TaskSignature, PipechainError> {
        let (path, queue) = Self::handle(
            scope.request.regulator_task.as_ref(),
            &self.settings.regulator_task_path,
        );
        let request = Self::base_request(scope, path)
            .with_optional_queue(queue.or_else(|| scope.metadata_queue.clone()));
        Ok(self.factory.build(request)?)
    }

    fn success_signature(&self, scope: &ChainScope<'_>) -> Result<TaskSignature, PipechainError> {
        let (path, queue) = Self::handle(
            scope.request.success_task.as_ref(),
            &self.settings.success_task_path,
        );
        let request = Self::base_request(scope, path)
            .with_optional_queue(queue.or_else(|| scope.metadata_queue.clone()));
        Ok(self.factory.build(request)?)
    }

    fn retry_signature(&self, scope: &ChainScope<'_>) -> Result<TaskSignature, PipechainError> {
        let (path, queue) = Self::handle(scope.request.retry_task.as_ref(), &self.settings.retry_task_path);
        let request = Self::base_request(scope, path)
            .with_access_key(scope.request.access_key.clone())
            .with_optional_queue(queue.or_else(|| scope.default_queue.clone()))
            .with_event_data(
                "queue",
                scope.default_queue.clone().map_or(Value::Null, Value::String),
            )
            .with_event_data("default_task_ttl", Value::from(scope.default_ttl))
            .with_event_data("add_retry", Value::Bool(scope.request.add_retry))
            .with_event_data("chain_payload", Value::Object(scope.run.chain_payload().clone()));
        Ok(self.factory.build(request)?)
    }
}

impl std::fmt::Debug for ChainCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainCompiler")
            .field("factory", &self.factory)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
