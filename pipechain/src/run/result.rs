//! Terminal outcome of a run, addressed by execution id alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::cache::{keys, load_json, store_json, KeyValueCache};
use crate::config::DEFAULT_RESULT_TTL;
use crate::errors::{ConfigError, PipechainError};
use crate::utils::now_utc;

/// Status of a run's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    /// The run has not finished.
    #[default]
    Pending,
    /// The run finished successfully.
    Success,
    /// The run failed permanently.
    Failed,
    /// Nothing is known about the run.
    Unavailable,
}

impl ResultStatus {
    /// Returns the wire name of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Unavailable => "unavailable",
        }
    }

    /// Returns true for success or failed.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultStatus {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "unavailable" => Ok(Self::Unavailable),
            other => Err(ConfigError::new(format!(
                "Invalid result status '{other}'; expected one of pending, success, failed, unavailable"
            ))
            .with_field("status")),
        }
    }
}

/// The stored outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultState {
    /// The run's execution id.
    pub execution_id: String,
    /// Current status.
    pub status: ResultStatus,
    /// Result payload, JSON null when none.
    #[serde(default)]
    pub result: Value,
    /// TTL of the cached result in seconds.
    pub result_ttl: u64,
    /// When the result was last saved.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ResultState {
    /// Creates a result for an execution id.
    ///
    /// An empty execution id is rejected.
    pub fn new(execution_id: impl Into<String>, status: ResultStatus) -> Result<Self, ConfigError> {
        let execution_id = execution_id.into();
        if execution_id.trim().is_empty() {
            return Err(ConfigError::new("execution_id is required").with_field("execution_id"));
        }
        Ok(Self {
            execution_id,
            status,
            result: Value::Null,
            result_ttl: DEFAULT_RESULT_TTL,
            updated_at: None,
        })
    }

    /// Sets the result payload.
    #[must_use]
    pub fn with_result(mut self, result: Value) -> Self {
        self.result = result;
        self
    }

    /// Sets the TTL.
    #[must_use]
    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.result_ttl = ttl;
        self
    }
}

/// Persists [`ResultState`]s in the cache.
#[derive(Clone)]
pub struct ResultStore {
    cache: Arc<dyn KeyValueCache>,
    default_ttl: u64,
}

impl ResultStore {
    /// Creates a store using the default result TTL.
    #[must_use]
    pub fn new(cache: Arc<dyn KeyValueCache>) -> Self {
        Self {
            cache,
            default_ttl: DEFAULT_RESULT_TTL,
        }
    }

    /// Sets the TTL given to results created by this store.
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: u64) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// The TTL given to results created by this store.
    #[must_use]
    pub fn default_ttl(&self) -> u64 {
        self.default_ttl
    }

    /// Saves a result and returns it with its update time set.
    pub async fn save(&self, mut state: ResultState) -> Result<ResultState, PipechainError> {
        state.updated_at = Some(now_utc());
        let key = keys::result_key(&state.execution_id);
        store_json(self.cache.as_ref(), &key, &state, state.result_ttl).await?;
        debug!(execution_id = %state.execution_id, status = %state.status, "Saved result");
        Ok(state)
    }

    /// Loads a result. A missing entry reads as `unavailable`.
    pub async fn load(&self, execution_id: &str) -> Result<ResultState, PipechainError> {
        let fallback = ResultState::new(execution_id, ResultStatus::Unavailable)?.with_ttl(self.default_ttl);
        let key = keys::result_key(execution_id);
        Ok(load_json(self.cache.as_ref(), &key).await?.unwrap_or(fallback))
    }

    /// Sets the status of a run's result.
    ///
    /// With `result` of `None` any previously stored payload is kept.
    pub async fn update_status(
        &self,
        execution_id: &str,
        status: ResultStatus,
        result: Option<Value>,
    ) -> Result<ResultState, PipechainError> {
        let mut state = self.load(execution_id).await?;
        state.status = status;
        if let Some(result) = result {
            state.result = result;
        }
        self.save(state).await
    }

    /// Removes a stored result.
    pub async fn delete(&self, execution_id: &str) -> Result<(), PipechainError> {
        self.cache.delete(&keys::result_key(execution_id)).await?;
        Ok(())
    }
}

impl fmt::Debug for ResultStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultStore")
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use serde_json::json;

    fn store() -> ResultStore {
        ResultStore::new(Arc::new(InMemoryCache::new()))
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("failed".parse::<ResultStatus>().unwrap(), ResultStatus::Failed);
        assert!("done".parse::<ResultStatus>().is_err());
        assert_eq!(ResultStatus::Unavailable.to_string(), "unavailable");
    }

    #[test]
    fn test_empty_execution_id_rejected() {
        assert!(ResultState::new("", ResultStatus::Pending).is_err());
    }

    #[tokio::test]
    async fn test_missing_result_is_unavailable() {
        let state = store().load("e-1").await.unwrap();
        assert_eq!(state.status, ResultStatus::Unavailable);
        assert!(state.updated_at.is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = store();
        let saved = store
            .save(ResultState::new("e-1", ResultStatus::Pending).unwrap().with_result(json!({"n": 1})))
            .await
            .unwrap();
        assert!(saved.updated_at.is_some());

        let loaded = store.load("e-1").await.unwrap();
        assert_eq!(loaded, saved);
    }

    #[tokio::test]
    async fn test_update_status_preserves_result() {
        let store = store();
        store
            .save(ResultState::new("e-1", ResultStatus::Pending).unwrap().with_result(json!("payload")))
            .await
            .unwrap();

        let updated = store.update_status("e-1", ResultStatus::Success, None).await.unwrap();
        assert_eq!(updated.status, ResultStatus::Success);
        assert_eq!(updated.result, json!("payload"));
    }

    #[tokio::test]
    async fn test_load_with_empty_id_rejected() {
        let err = store().load("").await.unwrap_err();
        assert!(matches!(err, PipechainError::Config(_)));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = store();
        store.save(ResultState::new("e-1", ResultStatus::Failed).unwrap()).await.unwrap();
        store.delete("e-1").await.unwrap();
        assert_eq!(store.load("e-1").await.unwrap().status, ResultStatus::Unavailable);
    }
}
