//! Logical pipeline configuration shape.
//!
//! Configurations arrive as camelCase JSON documents:
//!
//! ```json
//! {
//!   "pipelineId": "demo",
//!   "metadata": {"queue": "default-q", "maxTtl": 120, "maxRetry": 2},
//!   "dagAdjacency": {"a": ["c"], "b": ["c"]},
//!   "taskDefinitions": {
//!     "a": {"handler": "tasks.a"},
//!     "b": {"handler": "tasks.b", "queue": "fast"},
//!     "c": {"handler": "tasks.c", "maxTtl": "default"}
//!   }
//! }
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// The literal that marks a queue or TTL as "fall back to the next source".
pub const DEFAULT_KEYWORD: &str = "default";

/// A TTL value: either a number of seconds or a keyword.
///
/// Only the `"default"` keyword is meaningful; the validator rejects others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TtlSetting {
    /// An explicit number of seconds.
    Seconds(u64),
    /// A keyword such as `"default"`.
    Named(String),
}

impl TtlSetting {
    /// Returns the explicit seconds, or `None` for a keyword or zero.
    ///
    /// A zero TTL would mean "never expires" to the cache, so it resolves
    /// like an unset value.
    #[must_use]
    pub fn seconds(&self) -> Option<u64> {
        match self {
            Self::Seconds(secs) => (*secs > 0).then_some(*secs),
            Self::Named(_) => None,
        }
    }

    /// Returns true for the `"default"` keyword.
    #[must_use]
    pub fn is_default(&self) -> bool {
        matches!(self, Self::Named(name) if name == DEFAULT_KEYWORD)
    }
}

impl From<u64> for TtlSetting {
    fn from(secs: u64) -> Self {
        Self::Seconds(secs)
    }
}

fn resolve_queue(queue: Option<&String>) -> Option<&str> {
    queue
        .map(String::as_str)
        .filter(|q| !q.is_empty() && *q != DEFAULT_KEYWORD)
}

/// Pipeline-wide settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineMetadata {
    /// Queue used by tasks that do not name their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    /// Pipeline-wide TTL in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ttl: Option<TtlSetting>,
    /// Maximum number of retries for a run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retry: Option<u32>,
}

impl PipelineMetadata {
    /// Returns the queue unless it is unset or `"default"`.
    #[must_use]
    pub fn resolved_queue(&self) -> Option<&str> {
        resolve_queue(self.queue.as_ref())
    }

    /// Returns the TTL unless it is unset or a keyword.
    #[must_use]
    pub fn resolved_max_ttl(&self) -> Option<u64> {
        self.max_ttl.as_ref().and_then(TtlSetting::seconds)
    }
}

/// Queue and TTL settings of a single task, as consumed by the signature factory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskConfig {
    /// The task's queue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    /// The task's TTL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ttl: Option<TtlSetting>,
}

impl TaskConfig {
    /// Creates an empty task config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the queue.
    #[must_use]
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Sets the TTL.
    #[must_use]
    pub fn with_max_ttl(mut self, ttl: impl Into<TtlSetting>) -> Self {
        self.max_ttl = Some(ttl.into());
        self
    }

    /// Returns the queue unless it is unset or `"default"`.
    #[must_use]
    pub fn resolved_queue(&self) -> Option<&str> {
        resolve_queue(self.queue.as_ref())
    }

    /// Returns the TTL unless it is unset or a keyword.
    #[must_use]
    pub fn resolved_max_ttl(&self) -> Option<u64> {
        self.max_ttl.as_ref().and_then(TtlSetting::seconds)
    }
}

/// Definition of a single node in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    /// Dotted task path of the handler, e.g. `tasks.extract`.
    pub handler: String,
    /// Queue override for this task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    /// TTL override for this task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ttl: Option<TtlSetting>,
}

impl TaskDefinition {
    /// Creates a definition for the given handler.
    #[must_use]
    pub fn new(handler: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            queue: None,
            max_ttl: None,
        }
    }

    /// Sets the queue.
    #[must_use]
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Sets the TTL.
    #[must_use]
    pub fn with_max_ttl(mut self, ttl: impl Into<TtlSetting>) -> Self {
        self.max_ttl = Some(ttl.into());
        self
    }

    /// Returns the queue/TTL view of this definition.
    #[must_use]
    pub fn task_config(&self) -> TaskConfig {
        TaskConfig {
            queue: self.queue.clone(),
            max_ttl: self.max_ttl.clone(),
        }
    }
}

/// A complete pipeline configuration. Immutable once loaded into a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Pipeline identifier.
    pub pipeline_id: String,
    /// Human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Schema version of the document; numbers and strings are accepted.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_version"
    )]
    pub schema_version: Option<String>,
    /// Pipeline-wide settings.
    #[serde(default)]
    pub metadata: PipelineMetadata,
    /// Node id to downstream node ids.
    #[serde(default)]
    pub dag_adjacency: BTreeMap<String, Vec<String>>,
    /// Node id to task definition.
    #[serde(default)]
    pub task_definitions: BTreeMap<String, TaskDefinition>,
}

fn deserialize_version<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

impl PipelineConfig {
    /// Creates an empty configuration for the given pipeline.
    #[must_use]
    pub fn new(pipeline_id: impl Into<String>) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            name: None,
            description: None,
            schema_version: None,
            metadata: PipelineMetadata::default(),
            dag_adjacency: BTreeMap::new(),
            task_definitions: BTreeMap::new(),
        }
    }

    /// Parses a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Sets the pipeline-wide queue.
    #[must_use]
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.metadata.queue = Some(queue.into());
        self
    }

    /// Sets the pipeline-wide TTL.
    #[must_use]
    pub fn with_max_ttl(mut self, ttl: impl Into<TtlSetting>) -> Self {
        self.metadata.max_ttl = Some(ttl.into());
        self
    }

    /// Sets the retry ceiling.
    #[must_use]
    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.metadata.max_retry = Some(max_retry);
        self
    }

    /// Sets the schema version.
    #[must_use]
    pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = Some(version.into());
        self
    }

    /// Adds a task definition.
    #[must_use]
    pub fn with_task(mut self, node: impl Into<String>, definition: TaskDefinition) -> Self {
        self.task_definitions.insert(node.into(), definition);
        self
    }

    /// Declares a node and its downstream nodes.
    #[must_use]
    pub fn with_edges(mut self, node: impl Into<String>, downstream: &[&str]) -> Self {
        self.dag_adjacency.insert(
            node.into(),
            downstream.iter().map(|s| (*s).to_string()).collect(),
        );
        self
    }

    /// Returns the definition for a node.
    #[must_use]
    pub fn task_definition(&self, node: &str) -> Option<&TaskDefinition> {
        self.task_definitions.get(node)
    }
}
