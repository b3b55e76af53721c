//! Configuration: pipeline documents, validation, engine settings and deployment.

mod deployment;
mod pipeline;
mod schema;
mod service;
mod settings;

pub use deployment::{DeploymentConfig, RegisteredTask, ServiceDefinition, WORKER_SERVICE_TYPE};
pub use pipeline::{
    PipelineConfig, PipelineMetadata, TaskConfig, TaskDefinition, TtlSetting, DEFAULT_KEYWORD,
};
pub use schema::{PipelineConfigValidator, MAX_RETRY_CEILING, SUPPORTED_SCHEMA_VERSIONS};
#[cfg(test)]
pub use service::MockConfigService;
pub use service::{ConfigService, InMemoryConfigService, VersionedPipelineConfig};
pub use settings::{
    EngineSettings, DEFAULT_MAX_RETRY, DEFAULT_RESULT_TTL, DEFAULT_SIGNATURE_EXPIRES,
    DEFAULT_TASK_TTL, REGULATOR_TASK_PATH, RETRY_TASK_PATH, SUCCESS_TASK_PATH,
};
