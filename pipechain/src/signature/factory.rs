//! Construction of task signatures.

use serde_json::{Map, Value};
use tracing::trace;

use super::model::{SignatureOptions, TaskEvent, TaskSignature, ACCESS_KEY, EXECUTION_ID, PIPELINE_ID};
use crate::config::{EngineSettings, TaskConfig};
use crate::errors::ConfigError;
use crate::utils::generate_task_id;

/// Seconds added to the soft time limit to obtain the hard time limit.
pub const TIME_LIMIT_BUFFER_SECONDS: u64 = 10;

/// Inputs for a single signature.
#[derive(Debug, Clone)]
pub struct SignatureRequest {
    task_path: String,
    queue: Option<String>,
    access_key: Option<String>,
    pipeline_id: Option<String>,
    execution_id: Option<String>,
    max_ttl: Option<u64>,
    immutable: bool,
    task_config: Option<TaskConfig>,
    custom_event_data: Map<String, Value>,
}

impl SignatureRequest {
    /// Starts a request for the given task path.
    #[must_use]
    pub fn new(task_path: impl Into<String>) -> Self {
        Self {
            task_path: task_path.into(),
            queue: None,
            access_key: None,
            pipeline_id: None,
            execution_id: None,
            max_ttl: None,
            immutable: true,
            task_config: None,
            custom_event_data: Map::new(),
        }
    }

    /// Routes to an explicit queue.
    #[must_use]
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Routes to `queue` when one is given.
    #[must_use]
    pub fn with_optional_queue(mut self, queue: Option<String>) -> Self {
        if queue.is_some() {
            self.queue = queue;
        }
        self
    }

    /// Sets the access key.
    #[must_use]
    pub fn with_access_key(mut self, access_key: Option<String>) -> Self {
        self.access_key = access_key;
        self
    }

    /// Sets the pipeline id.
    #[must_use]
    pub fn with_pipeline_id(mut self, pipeline_id: impl Into<String>) -> Self {
        self.pipeline_id = Some(pipeline_id.into());
        self
    }

    /// Sets the execution id.
    #[must_use]
    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }

    /// Sets an explicit TTL.
    #[must_use]
    pub fn with_max_ttl(mut self, max_ttl: u64) -> Self {
        self.max_ttl = Some(max_ttl);
        self
    }

    /// Sets the TTL when one is given.
    #[must_use]
    pub fn with_optional_max_ttl(mut self, max_ttl: Option<u64>) -> Self {
        if max_ttl.is_some() {
            self.max_ttl = max_ttl;
        }
        self
    }

    /// Sets the immutable flag.
    #[must_use]
    pub fn with_immutable(mut self, immutable: bool) -> Self {
        self.immutable = immutable;
        self
    }

    /// Supplies the task's own queue/TTL configuration as a fallback.
    #[must_use]
    pub fn with_task_config(mut self, task_config: TaskConfig) -> Self {
        self.task_config = Some(task_config);
        self
    }

    /// Adds one custom event entry. Custom entries override the base keys.
    #[must_use]
    pub fn with_event_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.custom_event_data.insert(key.into(), value);
        self
    }

    /// Merges a map of custom event entries.
    #[must_use]
    pub fn with_custom_event_data(mut self, data: Map<String, Value>) -> Self {
        self.custom_event_data.extend(data);
        self
    }
}

/// Builds [`TaskSignature`]s using the engine's defaults.
#[derive(Debug, Clone)]
pub struct TaskSignatureFactory {
    default_ttl: u64,
    expires: u64,
    origin: Option<String>,
}

impl TaskSignatureFactory {
    /// Creates a factory from engine settings.
    #[must_use]
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            default_ttl: settings.default_task_ttl,
            expires: settings.signature_expires,
            origin: settings.worker_name.clone(),
        }
    }

    /// Returns the fallback TTL used when nothing more specific is set.
    #[must_use]
    pub fn default_ttl(&self) -> u64 {
        self.default_ttl
    }

    /// Builds a signature.
    ///
    /// The queue resolves as explicit queue, then the task config's queue
    /// (ignoring `"default"`); with neither the request is rejected. The TTL
    /// resolves as explicit TTL, then the task config's TTL, then the factory
    /// default.
    pub fn build(&self, request: SignatureRequest) -> Result<TaskSignature, ConfigError> {
        if request.task_path.trim().is_empty() {
            return Err(ConfigError::new("task path must not be empty").with_field("task_path"));
        }

        let task_config = request.task_config.unwrap_or_default();

        let queue = request
            .queue
            .filter(|q| !q.is_empty())
            .or_else(|| task_config.resolved_queue().map(str::to_string))
            .ok_or_else(ConfigError::queue_not_set)?;

        let max_ttl = request
            .max_ttl
            .or_else(|| task_config.resolved_max_ttl())
            .unwrap_or(self.default_ttl);

        let mut event = TaskEvent::new();
        event.insert(ACCESS_KEY, request.access_key.map_or(Value::Null, Value::String));
        event.insert(PIPELINE_ID, request.pipeline_id.map_or(Value::Null, Value::String));
        event.insert(EXECUTION_ID, request.execution_id.map_or(Value::Null, Value::String));
        for (key, value) in request.custom_event_data {
            event.insert(key, value);
        }

        let options = SignatureOptions {
            queue,
            expires: self.expires,
            soft_time_limit: max_ttl,
            time_limit: max_ttl.saturating_add(TIME_LIMIT_BUFFER_SECONDS),
            origin: self.origin.clone(),
        };

        let task_id = generate_task_id();
        trace!(task_path = %request.task_path, %task_id, queue = %options.queue, max_ttl, "Built task signature");

        Ok(TaskSignature::new(
            request.task_path,
            event,
            task_id,
            request.immutable,
            options,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TtlSetting;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn factory() -> TaskSignatureFactory {
        TaskSignatureFactory::new(&EngineSettings::default())
    }

    #[test]
    fn test_explicit_queue_and_ttl_win() {
        let sig = factory()
            .build(
                SignatureRequest::new("tasks.a")
                    .with_queue("explicit")
                    .with_max_ttl(30)
                    .with_task_config(TaskConfig::new().with_queue("configured").with_max_ttl(90)),
            )
            .unwrap();

        assert_eq!(sig.queue(), "explicit");
        assert_eq!(sig.options().soft_time_limit, 30);
        assert_eq!(sig.options().time_limit, 40);
    }

    #[test]
    fn test_task_config_fallbacks() {
        let sig = factory()
            .build(
                SignatureRequest::new("tasks.a")
                    .with_task_config(TaskConfig::new().with_queue("configured").with_max_ttl(90)),
            )
            .unwrap();

        assert_eq!(sig.queue(), "configured");
        assert_eq!(sig.options().soft_time_limit, 90);
        assert_eq!(sig.options().time_limit, 100);
    }

    #[test]
    fn test_default_ttl_keyword_uses_factory_default() {
        let sig = factory()
            .build(SignatureRequest::new("tasks.a").with_task_config(
                TaskConfig::new()
                    .with_queue("q")
                    .with_max_ttl(TtlSetting::Named("default".into())),
            ))
            .unwrap();

        assert_eq!(sig.options().soft_time_limit, 60);
        assert_eq!(sig.options().expires, 86_400);
    }

    #[test]
    fn test_missing_queue_is_error() {
        let err = factory().build(SignatureRequest::new("tasks.a")).unwrap_err();
        assert_eq!(err, ConfigError::queue_not_set());

        let err = factory()
            .build(SignatureRequest::new("tasks.a").with_task_config(TaskConfig::new().with_queue("default")))
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("queue"));
    }

    #[test]
    fn test_empty_task_path_is_error() {
        assert!(factory().build(SignatureRequest::new(" ").with_queue("q")).is_err());
    }

    #[test]
    fn test_event_merge_custom_wins() {
        let sig = factory()
            .build(
                SignatureRequest::new("tasks.a")
                    .with_queue("q")
                    .with_access_key(Some("key".into()))
                    .with_pipeline_id("p")
                    .with_execution_id("e")
                    .with_event_data("pipeline_id", json!("overridden"))
                    .with_event_data("extra", json!(1)),
            )
            .unwrap();

        assert_eq!(sig.event().access_key(), Some("key"));
        assert_eq!(sig.event().execution_id(), Some("e"));
        assert_eq!(sig.event().pipeline_id(), Some("overridden"));
        assert_eq!(sig.event().get_u64("extra"), Some(1));
        assert!(sig.args().is_empty());
        assert!(sig.is_immutable());
    }

    #[test]
    fn test_absent_base_keys_are_null() {
        let sig = factory().build(SignatureRequest::new("tasks.a").with_queue("q")).unwrap();
        assert_eq!(sig.event().get(ACCESS_KEY), Some(&Value::Null));
        assert_eq!(sig.event().len(), 3);
    }

    #[test]
    fn test_task_ids_are_unique() {
        let f = factory();
        let a = f.build(SignatureRequest::new("tasks.a").with_queue("q")).unwrap();
        let b = f.build(SignatureRequest::new("tasks.a").with_queue("q")).unwrap();
        assert_ne!(a.task_id(), b.task_id());
    }

    #[test]
    fn test_origin_from_worker_name() {
        let f = TaskSignatureFactory::new(&EngineSettings::default().with_worker_name("worker-a"));
        let sig = f.build(SignatureRequest::new("tasks.a").with_queue("q")).unwrap();
        assert_eq!(sig.options().origin.as_deref(), Some("worker-a"));
    }
}
