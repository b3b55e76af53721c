//! Spans that tie log lines to a run or a task.

use tracing::{info_span, Span};

use crate::chain::ExecutableChain;
use crate::signature::TaskSignature;

/// Span covering one chain run.
#[must_use]
pub fn chain_span(chain: &ExecutableChain) -> Span {
    info_span!(
        "chain",
        pipeline_id = %chain.pipeline_id,
        execution_id = %chain.execution_id,
        steps = chain.len(),
    )
}

/// Span covering one task execution.
#[must_use]
pub fn task_span(signature: &TaskSignature) -> Span {
    info_span!(
        "task",
        task_path = %signature.task_path(),
        task_id = %signature.task_id(),
        queue = %signature.queue(),
        execution_id = signature.event().execution_id().unwrap_or_default(),
    )
}
