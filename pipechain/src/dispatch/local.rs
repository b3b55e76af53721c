//! In-process execution of signatures and chains on the tokio runtime.

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use super::handlers::{HandlerRegistry, TaskInvocation};
use super::CancellationToken;
use super::TaskExecutionService;
use crate::chain::ExecutableChain;
use crate::errors::DispatchError;
use crate::observability::{chain_span, task_span};
use crate::signature::TaskSignature;

/// How a chain run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainStatus {
    /// Every step succeeded.
    Completed,
    /// A step failed; later steps did not run.
    Failed {
        /// Index of the failing step.
        step: usize,
        /// The first failure of that step.
        error: DispatchError,
        /// Outcome of the error handler, if the chain had one.
        handler: Option<Result<Value, DispatchError>>,
    },
}

/// Result of running one chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    /// The pipeline id.
    pub pipeline_id: String,
    /// The execution id.
    pub execution_id: String,
    /// How the run ended.
    pub status: ChainStatus,
}

impl ChainOutcome {
    /// Returns true if every step succeeded.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self.status, ChainStatus::Completed)
    }
}

struct LocalInner {
    registry: HandlerRegistry,
    pending: Mutex<Vec<JoinHandle<()>>>,
    outcomes: Mutex<Vec<ChainOutcome>>,
}

impl LocalInner {
    async fn run_signature(&self, signature: &TaskSignature) -> Result<Value, DispatchError> {
        self.execute_signature(signature).instrument(task_span(signature)).await
    }

    async fn run_chain(&self, chain: &ExecutableChain) -> ChainOutcome {
        self.execute_chain(chain).instrument(chain_span(chain)).await
    }

    async fn execute_signature(&self, signature: &TaskSignature) -> Result<Value, DispatchError> {
        let handler = self
            .registry
            .get(signature.task_path())
            .ok_or_else(|| DispatchError::handler_not_registered(signature.task_path()))?;

        let token = Arc::new(CancellationToken::new());
        let invocation = TaskInvocation::with_token(signature.clone(), Arc::clone(&token));
        let options = signature.options();

        let work = handler.handle(&invocation);
        let soft_limit = tokio::time::sleep(Duration::from_secs(options.soft_time_limit));
        let hard_limit = tokio::time::sleep(Duration::from_secs(options.time_limit));
        tokio::pin!(work, soft_limit, hard_limit);

        loop {
            tokio::select! {
                result = &mut work => {
                    return result.map_err(|e| {
                        DispatchError::task_failed(signature.task_path(), signature.task_id(), format!("{e:#}"))
                    });
                }
                () = &mut soft_limit, if !token.is_cancelled() => {
                    warn!(
                        task_path = %signature.task_path(),
                        task_id = %signature.task_id(),
                        limit = options.soft_time_limit,
                        "Soft time limit exceeded"
                    );
                    token.cancel("soft time limit exceeded");
                }
                () = &mut hard_limit => {
                    error!(
                        task_path = %signature.task_path(),
                        task_id = %signature.task_id(),
                        limit = options.time_limit,
                        "Hard time limit exceeded"
                    );
                    return Err(DispatchError::TimeLimitExceeded {
                        task_path: signature.task_path().to_string(),
                        task_id: signature.task_id().to_string(),
                        limit_seconds: options.time_limit,
                    });
                }
            }
        }
    }

    async fn execute_chain(&self, chain: &ExecutableChain) -> ChainOutcome {
        let outcome = |status: ChainStatus| ChainOutcome {
            pipeline_id: chain.pipeline_id.clone(),
            execution_id: chain.execution_id.clone(),
            status,
        };

        for (index, step) in chain.steps.iter().enumerate() {
            let results = join_all(step.signatures().iter().map(|sig| self.run_signature(sig))).await;
            let Some(error) = results.into_iter().find_map(Result::err) else {
                debug!(execution_id = %chain.execution_id, step = index, "Step completed");
                continue;
            };

            warn!(
                pipeline_id = %chain.pipeline_id,
                execution_id = %chain.execution_id,
                step = index,
                error = %error,
                "Chain step failed"
            );
            let handler = match &chain.error_handler {
                Some(signature) => Some(self.run_signature(signature).await),
                None => None,
            };
            if let Some(Err(handler_error)) = &handler {
                error!(execution_id = %chain.execution_id, error = %handler_error, "Error handler failed");
            }
            return outcome(ChainStatus::Failed {
                step: index,
                error,
                handler,
            });
        }

        info!(
            pipeline_id = %chain.pipeline_id,
            execution_id = %chain.execution_id,
            "Chain completed"
        );
        outcome(ChainStatus::Completed)
    }
}

/// Runs signatures and chains on the current tokio runtime.
///
/// Barriers run their signatures concurrently; steps run in order. The first
/// failing step stops the chain and triggers its error handler. Each
/// signature's soft time limit cancels its invocation token and its hard
/// limit abandons it.
pub struct LocalExecutionService {
    inner: Arc<LocalInner>,
}

impl LocalExecutionService {
    /// Creates a service resolving handlers from a registry.
    #[must_use]
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            inner: Arc::new(LocalInner {
                registry,
                pending: Mutex::new(Vec::new()),
                outcomes: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The handler registry.
    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.inner.registry
    }

    /// Runs one signature to completion on the calling task.
    pub async fn run_signature(&self, signature: &TaskSignature) -> Result<Value, DispatchError> {
        self.inner.run_signature(signature).await
    }

    /// Runs a chain to completion on the calling task.
    pub async fn run_chain(&self, chain: &ExecutableChain) -> ChainOutcome {
        self.inner.run_chain(chain).await
    }

    /// Waits for all published and submitted work, including work spawned
    /// while waiting.
    pub async fn wait_idle(&self) {
        loop {
            let handles = std::mem::take(&mut *self.inner.pending.lock());
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    error!(error = %e, "Background task panicked");
                }
            }
        }
    }

    /// Outcomes of submitted chains, in completion order.
    #[must_use]
    pub fn outcomes(&self) -> Vec<ChainOutcome> {
        self.inner.outcomes.lock().clone()
    }

    /// Removes and returns the recorded outcomes.
    pub fn take_outcomes(&self) -> Vec<ChainOutcome> {
        std::mem::take(&mut *self.inner.outcomes.lock())
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut pending = self.inner.pending.lock();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }
}

impl std::fmt::Debug for LocalExecutionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalExecutionService")
            .field("registry", &self.inner.registry)
            .field("pending", &self.inner.pending.lock().len())
            .finish()
    }
}

#[async_trait]
impl TaskExecutionService for LocalExecutionService {
    async fn publish(&self, signature: TaskSignature) -> Result<(), DispatchError> {
        if !self.inner.registry.contains(signature.task_path()) {
            return Err(DispatchError::handler_not_registered(signature.task_path()));
        }

        let inner = Arc::clone(&self.inner);
        self.track(tokio::spawn(async move {
            if let Err(e) = inner.run_signature(&signature).await {
                warn!(task_id = %signature.task_id(), error = %e, "Published task failed");
            }
        }));
        Ok(())
    }

    async fn submit(&self, chain: ExecutableChain) -> Result<(), DispatchError> {
        let inner = Arc::clone(&self.inner);
        self.track(tokio::spawn(async move {
            let outcome = inner.run_chain(&chain).await;
            inner.outcomes.lock().push(outcome);
        }));
        Ok(())
    }
}
