//! Handlers for the engine's own tasks: regulator, success and retry.

use anyhow::Context as _;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Weak};
use tracing::{info, warn};

use super::handlers::{HandlerRegistry, TaskHandler, TaskInvocation};
use super::retry::RetryPolicy;
use super::TaskExecutionService;
use crate::chain::{ChainCompiler, CompileRequest};
use crate::run::{ResultStatus, ResultStore};

/// Barrier filler. Does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegulatorHandler;

#[async_trait]
impl TaskHandler for RegulatorHandler {
    async fn handle(&self, _invocation: &TaskInvocation) -> anyhow::Result<Value> {
        Ok(Value::Null)
    }
}

/// Marks the run's result as successful.
#[derive(Debug, Clone)]
pub struct SuccessHandler {
    results: ResultStore,
}

impl SuccessHandler {
    /// Creates a handler writing to a result store.
    #[must_use]
    pub fn new(results: ResultStore) -> Self {
        Self { results }
    }
}

#[async_trait]
impl TaskHandler for SuccessHandler {
    async fn handle(&self, invocation: &TaskInvocation) -> anyhow::Result<Value> {
        let execution_id = invocation
            .event()
            .execution_id()
            .context("success event is missing execution_id")?;

        let state = self
            .results
            .update_status(execution_id, ResultStatus::Success, None)
            .await?;
        info!(
            pipeline_id = invocation.event().pipeline_id().unwrap_or_default(),
            execution_id,
            "Pipeline run succeeded"
        );
        Ok(json!({ "status": state.status }))
    }
}

/// Recompiles and resubmits a failed run.
///
/// Compilation advances the run's retry count; once the ceiling is reached
/// it deadletters the run instead and nothing is resubmitted. The service is
/// held weakly since it usually owns the registry this handler lives in.
pub struct RetryHandler {
    compiler: Arc<ChainCompiler>,
    service: Weak<dyn TaskExecutionService>,
    policy: RetryPolicy,
}

impl RetryHandler {
    /// Creates a retry handler using the compiler's retry policy.
    #[must_use]
    pub fn new(compiler: Arc<ChainCompiler>, service: &Arc<dyn TaskExecutionService>) -> Self {
        let policy = compiler.settings().retry_policy;
        Self {
            compiler,
            service: Arc::downgrade(service),
            policy,
        }
    }

    /// Overrides the backoff policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl std::fmt::Debug for RetryHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryHandler")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TaskHandler for RetryHandler {
    async fn handle(&self, invocation: &TaskInvocation) -> anyhow::Result<Value> {
        let event = invocation.event();
        let pipeline_id = event.pipeline_id().context("retry event is missing pipeline_id")?;
        let execution_id = event.execution_id().context("retry event is missing execution_id")?;

        let mut request = CompileRequest::retry(pipeline_id, execution_id)
            .with_add_retry(event.get_bool("add_retry").unwrap_or(true));
        request.access_key = event.access_key().map(str::to_string);
        request.queue_override = event.get_str("queue").map(str::to_string);
        request.ttl_override = event.get_u64("default_task_ttl");
        if let Some(payload) = event.get_object("chain_payload") {
            request.chain_payload = payload.clone();
        }

        let (chain, run) = self.compiler.compile_run(request).await?;
        let Some(chain) = chain else {
            warn!(
                pipeline_id,
                execution_id,
                retry_count = run.retry_count(),
                message = run.loading_message().unwrap_or_default(),
                "Run not resubmitted"
            );
            return Ok(json!({ "resubmitted": false, "retry_count": run.retry_count() }));
        };

        let delay = self.policy.delay_for(run.retry_count());
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = invocation.cancellation().cancelled() => {
                anyhow::bail!("retry of {pipeline_id}_{execution_id} cancelled during backoff");
            }
        }

        let service = self
            .service
            .upgrade()
            .context("execution service is no longer available")?;
        service.submit(chain).await?;
        info!(
            pipeline_id,
            execution_id,
            retry_count = run.retry_count(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Resubmitted run"
        );
        Ok(json!({ "resubmitted": true, "retry_count": run.retry_count() }))
    }
}

/// Registers the regulator, success and retry handlers under the engine's
/// task paths.
pub fn register_builtin_handlers(
    registry: &HandlerRegistry,
    compiler: &Arc<ChainCompiler>,
    service: &Arc<dyn TaskExecutionService>,
) {
    let settings = compiler.settings();
    let results = ResultStore::new(compiler.cache()).with_default_ttl(settings.default_result_ttl);

    registry.register(settings.regulator_task_path.clone(), RegulatorHandler);
    registry.register(settings.success_task_path.clone(), SuccessHandler::new(results));
    registry.register(
        settings.retry_task_path.clone(),
        RetryHandler::new(Arc::clone(compiler), service),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::config::EngineSettings;
    use crate::run::{LoadOptions, RunState};
    use crate::testing::{sample_config, RecordingExecutionService};

    fn setup() -> (Arc<ChainCompiler>, Arc<RecordingExecutionService>) {
        let settings = EngineSettings::default().with_retry_policy(RetryPolicy::immediate());
        let compiler = Arc::new(ChainCompiler::new(Arc::new(InMemoryCache::new()), &settings));
        (compiler, Arc::new(RecordingExecutionService::new()))
    }

    async fn fresh_chain(compiler: &ChainCompiler, max_retry: u32) -> crate::chain::ExecutableChain {
        compiler
            .compile(CompileRequest::fresh("p", sample_config("p").with_max_retry(max_retry)))
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_regulator_is_noop() {
        let (compiler, _) = setup();
        let chain = fresh_chain(&compiler, 3).await;
        let regulator = chain.steps[1].signatures()[0].clone();

        let result = RegulatorHandler.handle(&TaskInvocation::new(regulator)).await.unwrap();
        assert_eq!(result, Value::Null);
    }

    #[tokio::test]
    async fn test_success_marks_result() {
        let (compiler, _) = setup();
        let chain = fresh_chain(&compiler, 3).await;
        let success = chain.steps[4].signatures()[0].clone();
        let results = ResultStore::new(compiler.cache());

        SuccessHandler::new(results.clone())
            .handle(&TaskInvocation::new(success))
            .await
            .unwrap();

        let state = results.load(&chain.execution_id).await.unwrap();
        assert_eq!(state.status, ResultStatus::Success);
    }

    #[tokio::test]
    async fn test_retry_resubmits_with_incremented_count() {
        let (compiler, recorder) = setup();
        let service: Arc<dyn TaskExecutionService> = recorder.clone();
        let chain = fresh_chain(&compiler, 3).await;
        let handler = RetryHandler::new(Arc::clone(&compiler), &service);

        let result = handler
            .handle(&TaskInvocation::new(chain.error_handler.clone().unwrap()))
            .await
            .unwrap();

        assert_eq!(result, json!({ "resubmitted": true, "retry_count": 1 }));
        let submitted = recorder.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].execution_id, chain.execution_id);
    }

    #[tokio::test]
    async fn test_retry_at_ceiling_deadletters() {
        let (compiler, recorder) = setup();
        let service: Arc<dyn TaskExecutionService> = recorder.clone();
        let chain = fresh_chain(&compiler, 1).await;
        let handler = RetryHandler::new(Arc::clone(&compiler), &service);

        let result = handler
            .handle(&TaskInvocation::new(chain.error_handler.clone().unwrap()))
            .await
            .unwrap();

        assert_eq!(result["resubmitted"], json!(false));
        assert!(recorder.submitted().is_empty());

        let results = ResultStore::new(compiler.cache());
        assert_eq!(
            results.load(&chain.execution_id).await.unwrap().status,
            ResultStatus::Failed
        );

        let mut run = RunState::for_execution(compiler.cache(), "p", &chain.execution_id);
        run.load(LoadOptions::default().with_verify_retry_count(false)).await;
        assert_eq!(run.retry_count(), 2);
    }

    #[tokio::test]
    async fn test_retry_without_service_fails() {
        let (compiler, _) = setup();
        let chain = fresh_chain(&compiler, 3).await;
        let service: Arc<dyn TaskExecutionService> = Arc::new(RecordingExecutionService::new());
        let handler = RetryHandler::new(Arc::clone(&compiler), &service);
        drop(service);

        let err = handler
            .handle(&TaskInvocation::new(chain.error_handler.clone().unwrap()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no longer available"));
    }

    #[test]
    fn test_register_builtin_handlers() {
        let (compiler, recorder) = setup();
        let service: Arc<dyn TaskExecutionService> = recorder;
        let registry = HandlerRegistry::new();
        register_builtin_handlers(&registry, &compiler, &service);

        assert_eq!(
            registry.task_paths(),
            vec![
                crate::config::RETRY_TASK_PATH,
                crate::config::SUCCESS_TASK_PATH,
                crate::config::REGULATOR_TASK_PATH,
            ]
        );
    }
}
