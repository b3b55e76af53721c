//! Sample pipelines and a fully wired in-process engine.

use std::sync::Arc;

use crate::cache::InMemoryCache;
use crate::chain::ChainCompiler;
use crate::config::{EngineSettings, PipelineConfig, TaskDefinition};
use crate::dispatch::{
    register_builtin_handlers, HandlerRegistry, LocalExecutionService, RetryPolicy, TaskExecutionService,
};
use crate::run::ResultStore;

/// Queue used by every sample pipeline.
pub const SAMPLE_QUEUE: &str = "default-q";

fn with_nodes(mut config: PipelineConfig, nodes: &[&str]) -> PipelineConfig {
    for node in nodes {
        config = config.with_task(*node, TaskDefinition::new(format!("tasks.{node}")));
    }
    config
}

/// `a -> b`, handlers `tasks.a` and `tasks.b`, no TTL or retry limits.
#[must_use]
pub fn sample_config(pipeline_id: &str) -> PipelineConfig {
    let config = PipelineConfig::new(pipeline_id)
        .with_queue(SAMPLE_QUEUE)
        .with_edges("a", &["b"])
        .with_edges("b", &[]);
    with_nodes(config, &["a", "b"])
}

/// `a -> {b, c} -> d`.
#[must_use]
pub fn diamond_config(pipeline_id: &str) -> PipelineConfig {
    let config = PipelineConfig::new(pipeline_id)
        .with_queue(SAMPLE_QUEUE)
        .with_edges("a", &["b", "c"])
        .with_edges("b", &["d"])
        .with_edges("c", &["d"])
        .with_edges("d", &[]);
    with_nodes(config, &["a", "b", "c", "d"])
}

/// `{a, b} -> c`.
#[must_use]
pub fn fan_in_config(pipeline_id: &str) -> PipelineConfig {
    let config = PipelineConfig::new(pipeline_id)
        .with_queue(SAMPLE_QUEUE)
        .with_edges("a", &["c"])
        .with_edges("b", &["c"])
        .with_edges("c", &[]);
    with_nodes(config, &["a", "b", "c"])
}

/// An in-memory cache, a compiler and a local execution service with the
/// built-in handlers registered. Retries are resubmitted without delay.
#[derive(Debug)]
pub struct TestEngine {
    /// The shared cache.
    pub cache: Arc<InMemoryCache>,
    /// The engine settings.
    pub settings: EngineSettings,
    /// The compiler.
    pub compiler: Arc<ChainCompiler>,
    /// The handler registry.
    pub registry: HandlerRegistry,
    /// The execution service.
    pub service: Arc<LocalExecutionService>,
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEngine {
    /// Creates an engine with default settings and immediate retries.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(EngineSettings::default().with_retry_policy(RetryPolicy::immediate()))
    }

    /// Creates an engine with custom settings.
    #[must_use]
    pub fn with_settings(settings: EngineSettings) -> Self {
        let cache = Arc::new(InMemoryCache::new());
        let compiler = Arc::new(ChainCompiler::new(cache.clone(), &settings));
        let registry = HandlerRegistry::new();
        let service = Arc::new(LocalExecutionService::new(registry.clone()));

        let as_dyn: Arc<dyn TaskExecutionService> = service.clone();
        register_builtin_handlers(&registry, &compiler, &as_dyn);

        Self {
            cache,
            settings,
            compiler,
            registry,
            service,
        }
    }

    /// A result store over the engine's cache.
    #[must_use]
    pub fn results(&self) -> ResultStore {
        ResultStore::new(self.cache.clone()).with_default_ttl(self.settings.default_result_ttl)
    }
}
