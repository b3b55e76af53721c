//! Handing signatures and chains to something that runs them.
//!
//! [`TaskExecutionService`] is the seam to a task queue. The crate ships
//! [`LocalExecutionService`], which runs everything on the tokio runtime
//! against a [`HandlerRegistry`], plus the built-in regulator, success and
//! retry handlers that compiled chains refer to.

mod builtin;
mod cancellation;
mod handlers;
mod local;
mod retry;
mod runner;

use async_trait::async_trait;

use crate::chain::ExecutableChain;
use crate::errors::DispatchError;
use crate::signature::TaskSignature;

pub use builtin::{register_builtin_handlers, RegulatorHandler, RetryHandler, SuccessHandler};
pub use cancellation::CancellationToken;
pub use handlers::{FnHandler, HandlerRegistry, TaskHandler, TaskInvocation};
pub use local::{ChainOutcome, ChainStatus, LocalExecutionService};
pub use retry::{BackoffStrategy, JitterStrategy, RetryPolicy};
pub use runner::{BatchRequest, TaskRunner, DEFAULT_GROUPING_KEY, DEFAULT_MAX_PER_TASK};

/// Accepts work for execution.
#[async_trait]
pub trait TaskExecutionService: Send + Sync {
    /// Enqueues a single task.
    async fn publish(&self, signature: TaskSignature) -> Result<(), DispatchError>;

    /// Enqueues a compiled chain.
    async fn submit(&self, chain: ExecutableChain) -> Result<(), DispatchError>;
}
