//! Task signature value types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event key carrying the access key.
pub const ACCESS_KEY: &str = "access_key";
/// Event key carrying the pipeline id.
pub const PIPELINE_ID: &str = "pipeline_id";
/// Event key carrying the execution id.
pub const EXECUTION_ID: &str = "execution_id";

/// The `event` keyword payload handed to every task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskEvent(Map<String, Value>);

impl TaskEvent {
    /// Creates an empty event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing any existing one.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Returns a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns a string value by key, treating JSON null as absent.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Returns an unsigned integer value by key.
    #[must_use]
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    /// Returns a boolean value by key.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    /// Returns an object value by key.
    #[must_use]
    pub fn get_object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.0.get(key).and_then(Value::as_object)
    }

    /// The access key the run was started with.
    #[must_use]
    pub fn access_key(&self) -> Option<&str> {
        self.get_str(ACCESS_KEY)
    }

    /// The pipeline id.
    #[must_use]
    pub fn pipeline_id(&self) -> Option<&str> {
        self.get_str(PIPELINE_ID)
    }

    /// The execution id.
    #[must_use]
    pub fn execution_id(&self) -> Option<&str> {
        self.get_str(EXECUTION_ID)
    }

    /// Returns the underlying map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the event has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for TaskEvent {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<TaskEvent> for Value {
    fn from(event: TaskEvent) -> Self {
        Value::Object(event.0)
    }
}

/// Keyword arguments of a signature. Only `event` is ever set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignatureKwargs {
    /// The event payload.
    pub event: TaskEvent,
}

/// Dispatch options of a signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureOptions {
    /// Queue the task is routed to.
    pub queue: String,
    /// Seconds after which an unexecuted task is discarded.
    pub expires: u64,
    /// Seconds after which the task is asked to stop.
    pub soft_time_limit: u64,
    /// Seconds after which the task is killed.
    pub time_limit: u64,
    /// Name of the worker that produced the signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// An immutable, serializable description of one task invocation.
///
/// Built by [`super::TaskSignatureFactory`]; there is no way to change a
/// signature once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSignature {
    task_path: String,
    args: Vec<Value>,
    kwargs: SignatureKwargs,
    task_id: String,
    immutable: bool,
    options: SignatureOptions,
}

impl TaskSignature {
    pub(crate) fn new(
        task_path: String,
        event: TaskEvent,
        task_id: String,
        immutable: bool,
        options: SignatureOptions,
    ) -> Self {
        Self {
            task_path,
            args: Vec::new(),
            kwargs: SignatureKwargs { event },
            task_id,
            immutable,
            options,
        }
    }

    /// Dotted path of the task to run.
    #[must_use]
    pub fn task_path(&self) -> &str {
        &self.task_path
    }

    /// Positional arguments. Always empty.
    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// The event payload.
    #[must_use]
    pub fn event(&self) -> &TaskEvent {
        &self.kwargs.event
    }

    /// The unique task id.
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Whether the task ignores results of the previous step.
    #[must_use]
    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    /// Dispatch options.
    #[must_use]
    pub fn options(&self) -> &SignatureOptions {
        &self.options
    }

    /// Shorthand for the routed queue.
    #[must_use]
    pub fn queue(&self) -> &str {
        &self.options.queue
    }
}
