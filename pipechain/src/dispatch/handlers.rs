//! Task handlers and the registry that maps task paths to them.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use super::cancellation::CancellationToken;
use crate::signature::{TaskEvent, TaskSignature};

/// One execution of a signature, as seen by its handler.
#[derive(Debug, Clone)]
pub struct TaskInvocation {
    signature: TaskSignature,
    token: Arc<CancellationToken>,
}

impl TaskInvocation {
    /// Creates an invocation with a fresh cancellation token.
    #[must_use]
    pub fn new(signature: TaskSignature) -> Self {
        Self::with_token(signature, Arc::new(CancellationToken::new()))
    }

    /// Creates an invocation sharing an existing token.
    #[must_use]
    pub fn with_token(signature: TaskSignature, token: Arc<CancellationToken>) -> Self {
        Self { signature, token }
    }

    /// The signature being executed.
    #[must_use]
    pub fn signature(&self) -> &TaskSignature {
        &self.signature
    }

    /// The event payload of the signature.
    #[must_use]
    pub fn event(&self) -> &TaskEvent {
        self.signature.event()
    }

    /// The task path.
    #[must_use]
    pub fn task_path(&self) -> &str {
        self.signature.task_path()
    }

    /// The task id.
    #[must_use]
    pub fn task_id(&self) -> &str {
        self.signature.task_id()
    }

    /// Cancelled once the soft time limit passes.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.token
    }
}

/// Code that runs for a task path.
#[async_trait]
pub trait TaskHandler: Send + Sync + Debug {
    /// Handles one invocation. An error fails the task.
    async fn handle(&self, invocation: &TaskInvocation) -> anyhow::Result<Value>;
}

/// An async function-based handler.
///
/// The function receives a copy of the task's event.
pub struct FnHandler<F, Fut>
where
    F: Fn(TaskEvent) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    name: String,
    func: F,
    _phantom: std::marker::PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut>
where
    F: Fn(TaskEvent) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    /// Creates a new function-based handler.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<F, Fut> Debug for FnHandler<F, Fut>
where
    F: Fn(TaskEvent) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F, Fut>
where
    F: Fn(TaskEvent) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn handle(&self, invocation: &TaskInvocation) -> anyhow::Result<Value> {
        (self.func)(invocation.event().clone()).await
    }
}

/// Thread-safe map from task path to handler.
///
/// Clones share the same handlers.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn TaskHandler>>>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, replacing any previous one for the path.
    pub fn register(&self, task_path: impl Into<String>, handler: impl TaskHandler + 'static) {
        self.register_arc(task_path, Arc::new(handler));
    }

    /// Registers a shared handler.
    pub fn register_arc(&self, task_path: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.write().insert(task_path.into(), handler);
    }

    /// Looks up the handler for a task path.
    #[must_use]
    pub fn get(&self, task_path: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.read().get(task_path).cloned()
    }

    /// Returns whether a handler exists for a task path.
    #[must_use]
    pub fn contains(&self, task_path: &str) -> bool {
        self.handlers.read().contains_key(task_path)
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Registered task paths, sorted.
    #[must_use]
    pub fn task_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.handlers.read().keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("task_paths", &self.task_paths())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineSettings;
    use crate::signature::{SignatureRequest, TaskSignatureFactory};
    use serde_json::json;

    fn signature(path: &str) -> TaskSignature {
        TaskSignatureFactory::new(&EngineSettings::default())
            .build(
                SignatureRequest::new(path)
                    .with_queue("q")
                    .with_pipeline_id("p")
                    .with_event_data("n", json!(2)),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_fn_handler_receives_event() {
        let handler = FnHandler::new("double", |event: TaskEvent| async move {
            Ok::<_, anyhow::Error>(json!(event.get_u64("n").unwrap_or_default() * 2))
        });

        let result = handler.handle(&TaskInvocation::new(signature("tasks.double"))).await.unwrap();
        assert_eq!(result, json!(4));
    }

    #[test]
    fn test_registry_shared_between_clones() {
        let registry = HandlerRegistry::new();
        let clone = registry.clone();
        clone.register("tasks.b", FnHandler::new("b", |_: TaskEvent| async { Ok::<_, anyhow::Error>(Value::Null) }));
        clone.register("tasks.a", FnHandler::new("a", |_: TaskEvent| async { Ok::<_, anyhow::Error>(Value::Null) }));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("tasks.a"));
        assert!(registry.get("tasks.missing").is_none());
        assert_eq!(registry.task_paths(), vec!["tasks.a", "tasks.b"]);
    }

    #[test]
    fn test_invocation_accessors() {
        let invocation = TaskInvocation::new(signature("tasks.x"));
        assert_eq!(invocation.task_path(), "tasks.x");
        assert_eq!(invocation.event().pipeline_id(), Some("p"));
        assert!(!invocation.cancellation().is_cancelled());
        assert_eq!(invocation.task_id(), invocation.signature().task_id());
    }
}
