//! Source of pipeline configurations.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::pipeline::PipelineConfig;
use crate::errors::PipechainError;

/// A pipeline configuration together with the schema version it was authored against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedPipelineConfig {
    /// The configuration.
    pub config: PipelineConfig,
    /// The schema version, when known.
    pub schema_version: Option<String>,
}

impl VersionedPipelineConfig {
    /// Wraps a configuration, taking the schema version from the document.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        let schema_version = config.schema_version.clone();
        Self {
            config,
            schema_version,
        }
    }
}

/// Retrieves pipeline configurations by id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigService: Send + Sync {
    /// Returns the latest configuration for a pipeline, or `None` if it is unknown.
    async fn retrieve_latest_pipeline_config(
        &self,
        pipeline_id: &str,
        access_key: Option<String>,
    ) -> Result<Option<VersionedPipelineConfig>, PipechainError>;
}

/// In-memory configuration source keeping every published version.
#[derive(Debug, Default)]
pub struct InMemoryConfigService {
    versions: RwLock<HashMap<String, Vec<VersionedPipelineConfig>>>,
}

impl InMemoryConfigService {
    /// Creates an empty service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a new version of a pipeline configuration.
    pub fn publish(&self, config: PipelineConfig) {
        self.publish_versioned(VersionedPipelineConfig::new(config));
    }

    /// Publishes a configuration with an explicit schema version.
    pub fn publish_versioned(&self, versioned: VersionedPipelineConfig) {
        self.versions
            .write()
            .entry(versioned.config.pipeline_id.clone())
            .or_default()
            .push(versioned);
    }

    /// Returns how many versions exist for a pipeline.
    #[must_use]
    pub fn version_count(&self, pipeline_id: &str) -> usize {
        self.versions.read().get(pipeline_id).map_or(0, Vec::len)
    }
}

#[async_trait]
impl ConfigService for InMemoryConfigService {
    async fn retrieve_latest_pipeline_config(
        &self,
        pipeline_id: &str,
        _access_key: Option<String>,
    ) -> Result<Option<VersionedPipelineConfig>, PipechainError> {
        Ok(self
            .versions
            .read()
            .get(pipeline_id)
            .and_then(|versions| versions.last().cloned()))
    }
}
