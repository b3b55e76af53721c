//! Error types for the pipechain engine.
//!
//! Construction-time problems (malformed DAGs, unresolvable task settings)
//! are loud and returned as errors. Runtime state-machine outcomes such as a
//! missing cache entry during a run load or an exhausted retry ceiling are
//! recorded on the run instead, see [`crate::run::RunState::load`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for pipechain operations.
#[derive(Debug, Error)]
pub enum PipechainError {
    /// The pipeline DAG is malformed.
    #[error("{0}")]
    Graph(#[from] GraphError),

    /// Required configuration is missing or invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A required cache entry does not exist.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// The cache backend failed.
    #[error("{0}")]
    CacheBackend(#[from] CacheBackendError),

    /// Dispatching or executing a task failed.
    #[error("{0}")]
    Dispatch(#[from] DispatchError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GRAPH-001-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a pipeline's DAG cannot be turned into an execution graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// A node in `dagAdjacency` has no matching task definition.
    #[error("Node '{node}' in dagAdjacency has no task definition")]
    UndefinedNode {
        /// The undefined node id.
        node: String,
        /// The upstream node that references it, when it appears as a target.
        referenced_by: Option<String>,
    },

    /// The adjacency list contains a cycle.
    #[error("Cycle detected in pipeline DAG: {}", path.join(" -> "))]
    Cycle {
        /// The nodes forming the cycle, first node repeated at the end.
        path: Vec<String>,
    },

    /// Tasks are defined but no DAG references them.
    #[error("dagAdjacency is empty but {task_count} task definition(s) are declared")]
    EmptyDag {
        /// Number of declared task definitions.
        task_count: usize,
    },
}

impl GraphError {
    /// Returns the stable error code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UndefinedNode { .. } => "GRAPH-001-UNDEFINED_NODE",
            Self::Cycle { .. } => "GRAPH-002-CYCLE",
            Self::EmptyDag { .. } => "GRAPH-003-EMPTY",
        }
    }

    /// Builds diagnostic metadata for this error.
    #[must_use]
    pub fn error_info(&self) -> ContractErrorInfo {
        let info = ContractErrorInfo::new(self.code(), self.to_string());
        match self {
            Self::UndefinedNode { node, referenced_by } => {
                let info = info
                    .with_context_entry("node", node)
                    .with_fix_hint(
                        "Add a taskDefinitions entry for the node or remove it from dagAdjacency.",
                    );
                match referenced_by {
                    Some(upstream) => info.with_context_entry("referenced_by", upstream),
                    None => info,
                }
            }
            Self::Cycle { path } => info
                .with_context_entry("cycle", path.join(" -> "))
                .with_fix_hint("Remove one of the edges in the cycle to break it."),
            Self::EmptyDag { task_count } => info
                .with_context_entry("task_count", task_count.to_string())
                .with_fix_hint("Declare the task graph in dagAdjacency, e.g. `{\"task\": []}`."),
        }
    }
}

/// Error raised when required configuration is missing or invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ConfigError {
    /// The error message.
    pub message: String,
    /// The offending field, when known.
    pub field: Option<String>,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    /// Sets the offending field.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// The error returned when a signature cannot resolve a queue.
    #[must_use]
    pub fn queue_not_set() -> Self {
        Self::new("queue must be set for a worker or registered task").with_field("queue")
    }
}

/// Error raised when a required cache entry is absent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unable to find '{key}' in cache")]
pub struct NotFoundError {
    /// The missing key.
    pub key: String,
}

impl NotFoundError {
    /// Creates a new not-found error.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Error raised when the cache backend fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cache {operation} failed for '{key}': {message}")]
pub struct CacheBackendError {
    /// The operation that failed (get, set, delete).
    pub operation: String,
    /// The key involved.
    pub key: String,
    /// Backend-specific detail.
    pub message: String,
}

impl CacheBackendError {
    /// Creates a new cache backend error.
    #[must_use]
    pub fn new(
        operation: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while dispatching or executing tasks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// No handler is registered for the task path.
    #[error("No handler registered for task '{task_path}'")]
    HandlerNotRegistered {
        /// The task path.
        task_path: String,
    },

    /// The task ran past its hard time limit and was dropped.
    #[error("Task '{task_path}' ({task_id}) exceeded its time limit of {limit_seconds}s")]
    TimeLimitExceeded {
        /// The task path.
        task_path: String,
        /// The task id.
        task_id: String,
        /// The hard limit in seconds.
        limit_seconds: u64,
    },

    /// The task handler returned an error.
    #[error("Task '{task_path}' ({task_id}) failed: {message}")]
    TaskFailed {
        /// The task path.
        task_path: String,
        /// The task id.
        task_id: String,
        /// The handler's error message.
        message: String,
    },

    /// The execution service could not accept the work.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl DispatchError {
    /// Creates a handler-not-registered error.
    #[must_use]
    pub fn handler_not_registered(task_path: impl Into<String>) -> Self {
        Self::HandlerNotRegistered {
            task_path: task_path.into(),
        }
    }

    /// Creates a task failure error.
    #[must_use]
    pub fn task_failed(
        task_path: impl Into<String>,
        task_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::TaskFailed {
            task_path: task_path.into(),
            task_id: task_id.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_error_info_creation() {
        let info = ContractErrorInfo::new("TEST-001", "Test error")
            .with_fix_hint("Fix this by doing that")
            .with_context_entry("node", "a");

        assert_eq!(info.code, "TEST-001");
        assert_eq!(info.summary, "Test error");
        assert_eq!(info.fix_hint, Some("Fix this by doing that".to_string()));
        assert_eq!(info.context.get("node"), Some(&"a".to_string()));
    }

    #[test]
    fn test_cycle_error_message_and_info() {
        let err = GraphError::Cycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        };

        assert!(err.to_string().contains("a -> b -> a"));
        let info = err.error_info();
        assert_eq!(info.code, "GRAPH-002-CYCLE");
        assert!(info.fix_hint.is_some());
    }

    #[test]
    fn test_undefined_node_info_carries_reference() {
        let err = GraphError::UndefinedNode {
            node: "ghost".into(),
            referenced_by: Some("a".into()),
        };
        let info = err.error_info();

        assert_eq!(info.code, "GRAPH-001-UNDEFINED_NODE");
        assert_eq!(info.context.get("referenced_by"), Some(&"a".to_string()));
    }

    #[test]
    fn test_config_error_queue_not_set() {
        let err = ConfigError::queue_not_set();
        assert!(err.to_string().contains("queue must be set"));
        assert_eq!(err.field.as_deref(), Some("queue"));
    }

    #[test]
    fn test_errors_convert_into_pipechain_error() {
        let err: PipechainError = NotFoundError::new("k").into();
        assert!(matches!(err, PipechainError::NotFound(_)));

        let err: PipechainError = CacheBackendError::new("set", "k", "down").into();
        assert_eq!(err.to_string(), "Cache set failed for 'k': down");
    }
}
