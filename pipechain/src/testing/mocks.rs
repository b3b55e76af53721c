//! Test doubles for the cache, the execution service and task handlers.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::cache::{InMemoryCache, KeyValueCache};
use crate::chain::ExecutableChain;
use crate::dispatch::{TaskExecutionService, TaskHandler, TaskInvocation};
use crate::errors::{CacheBackendError, DispatchError};
use crate::signature::{TaskEvent, TaskSignature};

/// An in-memory cache whose reads or writes can be made to fail.
#[derive(Debug, Default)]
pub struct FailingCache {
    inner: InMemoryCache,
    fail_get: bool,
    fail_set: bool,
}

impl FailingCache {
    /// Creates a cache that does not fail yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `get` fail.
    #[must_use]
    pub fn fail_on_get(mut self) -> Self {
        self.fail_get = true;
        self
    }

    /// Makes every `set` fail.
    #[must_use]
    pub fn fail_on_set(mut self) -> Self {
        self.fail_set = true;
        self
    }
}

#[async_trait]
impl KeyValueCache for FailingCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheBackendError> {
        if self.fail_get {
            return Err(CacheBackendError::new("get", key, "injected failure"));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<(), CacheBackendError> {
        if self.fail_set {
            return Err(CacheBackendError::new("set", key, "injected failure"));
        }
        self.inner.set(key, value, ttl_seconds).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheBackendError> {
        self.inner.delete(key).await
    }
}

/// An execution service that only records what it is given.
#[derive(Debug, Default)]
pub struct RecordingExecutionService {
    published: Mutex<Vec<TaskSignature>>,
    submitted: Mutex<Vec<ExecutableChain>>,
    reject: bool,
}

impl RecordingExecutionService {
    /// Creates a recording service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a service that rejects all work with a transport error.
    #[must_use]
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    /// Published signatures, in order.
    #[must_use]
    pub fn published(&self) -> Vec<TaskSignature> {
        self.published.lock().clone()
    }

    /// Submitted chains, in order.
    #[must_use]
    pub fn submitted(&self) -> Vec<ExecutableChain> {
        self.submitted.lock().clone()
    }

    fn check(&self) -> Result<(), DispatchError> {
        if self.reject {
            Err(DispatchError::Transport("service rejected the work".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TaskExecutionService for RecordingExecutionService {
    async fn publish(&self, signature: TaskSignature) -> Result<(), DispatchError> {
        self.check()?;
        self.published.lock().push(signature);
        Ok(())
    }

    async fn submit(&self, chain: ExecutableChain) -> Result<(), DispatchError> {
        self.check()?;
        self.submitted.lock().push(chain);
        Ok(())
    }
}

/// A handler that records its invocations and returns a fixed value.
#[derive(Debug)]
pub struct RecordingHandler {
    output: Value,
    calls: Mutex<Vec<TaskSignature>>,
}

impl Default for RecordingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingHandler {
    /// Creates a handler returning `null`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_output(Value::Null)
    }

    /// Creates a handler returning `output`.
    #[must_use]
    pub fn with_output(output: Value) -> Self {
        Self {
            output,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Task paths of every invocation, in order.
    #[must_use]
    pub fn task_paths(&self) -> Vec<String> {
        self.calls.lock().iter().map(|sig| sig.task_path().to_string()).collect()
    }

    /// Events of every invocation, in order.
    #[must_use]
    pub fn events(&self) -> Vec<TaskEvent> {
        self.calls.lock().iter().map(|sig| sig.event().clone()).collect()
    }
}

#[async_trait]
impl TaskHandler for RecordingHandler {
    async fn handle(&self, invocation: &TaskInvocation) -> anyhow::Result<Value> {
        self.calls.lock().push(invocation.signature().clone());
        Ok(self.output.clone())
    }
}

/// A handler that fails a fixed number of times, then succeeds.
#[derive(Debug)]
pub struct FlakyHandler {
    remaining_failures: Mutex<usize>,
    call_count: Mutex<usize>,
}

impl FlakyHandler {
    /// Creates a handler failing its first `failures` invocations.
    #[must_use]
    pub fn new(failures: usize) -> Self {
        Self {
            remaining_failures: Mutex::new(failures),
            call_count: Mutex::new(0),
        }
    }

    /// A handler that never succeeds.
    #[must_use]
    pub fn always() -> Self {
        Self::new(usize::MAX)
    }

    /// Number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }
}

#[async_trait]
impl TaskHandler for FlakyHandler {
    async fn handle(&self, invocation: &TaskInvocation) -> anyhow::Result<Value> {
        *self.call_count.lock() += 1;
        let mut remaining = self.remaining_failures.lock();
        if *remaining > 0 {
            *remaining -= 1;
            anyhow::bail!("{} failed on purpose", invocation.task_path());
        }
        Ok(Value::Bool(true))
    }
}
