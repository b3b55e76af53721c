//! Fail-closed validation of pipeline configurations.

use regex::Regex;
use std::sync::LazyLock;

use super::pipeline::{PipelineConfig, TtlSetting};
use crate::errors::ConfigError;

/// Schema versions this engine understands.
pub const SUPPORTED_SCHEMA_VERSIONS: &[&str] = &["1", "1.0"];

/// Upper bound accepted for `metadata.maxRetry`.
pub const MAX_RETRY_CEILING: u32 = 1000;

const HANDLER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$";

static HANDLER_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(HANDLER_PATTERN).ok());

fn is_valid_handler(path: &str) -> bool {
    HANDLER_RE.as_ref().is_some_and(|re| re.is_match(path))
}

fn check_ttl(ttl: Option<&TtlSetting>, field: &str) -> Option<ConfigError> {
    match ttl {
        Some(setting @ TtlSetting::Named(name)) if !setting.is_default() => Some(
            ConfigError::new(format!(
                "{field} must be a number of seconds or \"default\", got \"{name}\""
            ))
            .with_field(field),
        ),
        Some(TtlSetting::Seconds(0)) => Some(
            ConfigError::new(format!("{field} must be greater than zero seconds")).with_field(field),
        ),
        _ => None,
    }
}

/// Validates pipeline configurations before they are loaded into a run.
///
/// Any rule violation rejects the whole document.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineConfigValidator;

impl PipelineConfigValidator {
    /// Validates a configuration, returning the first violation.
    ///
    /// `schema_version` overrides the version declared in the document.
    pub fn validate(config: &PipelineConfig, schema_version: Option<&str>) -> Result<(), ConfigError> {
        match Self::collect_errors(config, schema_version).into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Returns every violation found in the configuration.
    #[must_use]
    pub fn collect_errors(config: &PipelineConfig, schema_version: Option<&str>) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if let Some(version) = schema_version.or(config.schema_version.as_deref()) {
            if !SUPPORTED_SCHEMA_VERSIONS.contains(&version) {
                errors.push(
                    ConfigError::new(format!("Unsupported schema version '{version}'"))
                        .with_field("schemaVersion"),
                );
            }
        }

        if config.pipeline_id.trim().is_empty() {
            errors.push(ConfigError::new("pipelineId must not be empty").with_field("pipelineId"));
        }

        if config.metadata.resolved_queue().is_none() {
            errors.push(
                ConfigError::new("metadata.queue must be set to a concrete queue name")
                    .with_field("metadata.queue"),
            );
        }

        errors.extend(check_ttl(config.metadata.max_ttl.as_ref(), "metadata.maxTtl"));

        if let Some(max_retry) = config.metadata.max_retry {
            if max_retry > MAX_RETRY_CEILING {
                errors.push(
                    ConfigError::new(format!(
                        "metadata.maxRetry must be at most {MAX_RETRY_CEILING}, got {max_retry}"
                    ))
                    .with_field("metadata.maxRetry"),
                );
            }
        }

        for (node, definition) in &config.task_definitions {
            if !is_valid_handler(&definition.handler) {
                errors.push(
                    ConfigError::new(format!(
                        "Task '{node}' has an invalid handler path '{}'",
                        definition.handler
                    ))
                    .with_field(format!("taskDefinitions.{node}.handler")),
                );
            }
            errors.extend(check_ttl(
                definition.max_ttl.as_ref(),
                &format!("taskDefinitions.{node}.maxTtl"),
            ));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaskDefinition;

    fn valid() -> PipelineConfig {
        PipelineConfig::new("demo")
            .with_queue("q")
            .with_edges("a", &[])
            .with_task("a", TaskDefinition::new("tasks.extract"))
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(PipelineConfigValidator::validate(&valid(), None).is_ok());
        assert!(PipelineConfigValidator::validate(&valid(), Some("1.0")).is_ok());
    }

    #[test]
    fn test_unsupported_schema_version_rejected() {
        let err = PipelineConfigValidator::validate(&valid(), Some("2")).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("schemaVersion"));
    }

    #[test]
    fn test_default_queue_rejected() {
        let config = valid().with_queue("default");
        let err = PipelineConfigValidator::validate(&config, None).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("metadata.queue"));
    }

    #[test]
    fn test_invalid_handler_rejected() {
        let config = valid().with_task("b", TaskDefinition::new("tasks..broken"));
        let errors = PipelineConfigValidator::collect_errors(&config, None);

        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("tasks..broken"));
    }

    #[test]
    fn test_unknown_ttl_keyword_rejected() {
        let config = valid()
            .with_task("b", TaskDefinition::new("tasks.b").with_max_ttl(TtlSetting::Named("forever".into())));
        let err = PipelineConfigValidator::validate(&config, None).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("taskDefinitions.b.maxTtl"));

        let config = valid()
            .with_task("b", TaskDefinition::new("tasks.b").with_max_ttl(TtlSetting::Named("default".into())));
        assert!(PipelineConfigValidator::validate(&config, None).is_ok());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let config = valid().with_max_ttl(0);
        let err = PipelineConfigValidator::validate(&config, None).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("metadata.maxTtl"));

        let config = valid().with_task("b", TaskDefinition::new("tasks.b").with_max_ttl(0));
        let err = PipelineConfigValidator::validate(&config, None).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("taskDefinitions.b.maxTtl"));

        assert!(PipelineConfigValidator::validate(&valid().with_max_ttl(1), None).is_ok());
    }

    #[test]
    fn test_excessive_retry_ceiling_rejected() {
        let config = valid().with_max_retry(MAX_RETRY_CEILING + 1);
        assert!(PipelineConfigValidator::validate(&config, None).is_err());
    }

    #[test]
    fn test_multiple_errors_collected() {
        let config = PipelineConfig::new("").with_task("a", TaskDefinition::new("1bad"));
        let errors = PipelineConfigValidator::collect_errors(&config, None);
        assert_eq!(errors.len(), 3);
    }
}
