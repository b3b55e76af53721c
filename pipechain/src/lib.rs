//! # Pipechain
//!
//! A pipeline execution and retry-coordination engine for asynchronous task
//! graphs.
//!
//! Pipechain takes a declarative DAG of task definitions and provides:
//!
//! - **Graph compilation**: topological grouping of tasks that may run concurrently
//! - **Run tracking**: a durable, cache-backed record of each pipeline run
//! - **Retry coordination**: a retry ceiling with deadletter fallback
//! - **Signature construction**: immutable task invocation descriptors
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pipechain::prelude::*;
//!
//! let cache = Arc::new(InMemoryCache::new());
//! let settings = EngineSettings::default();
//! let compiler = ChainCompiler::new(cache, &settings);
//!
//! let request = CompileRequest::fresh("demo", config).with_access_key("key");
//! if let Some(chain) = compiler.compile(request).await? {
//!     execution_service.submit(chain).await?;
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cache;
pub mod chain;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod graph;
pub mod observability;
pub mod run;
pub mod signature;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{InMemoryCache, KeyValueCache};
    pub use crate::chain::{
        Barrier, BarrierKind, ChainCompiler, ChainStep, CompileRequest, ExecutableChain,
        TaskHandle,
    };
    pub use crate::config::{
        ConfigService, DeploymentConfig, EngineSettings, InMemoryConfigService, PipelineConfig,
        PipelineConfigValidator, PipelineMetadata, TaskConfig, TaskDefinition, TtlSetting,
    };
    pub use crate::dispatch::{
        BatchRequest, CancellationToken, HandlerRegistry, LocalExecutionService, RetryPolicy,
        TaskExecutionService, TaskHandler, TaskInvocation, TaskRunner,
    };
    pub use crate::errors::{
        CacheBackendError, ConfigError, ContractErrorInfo, DispatchError, GraphError,
        NotFoundError, PipechainError,
    };
    pub use crate::graph::{ChainableGroups, ExecutionGraph, ExecutionGraphBuilder};
    pub use crate::observability::{init_tracing, LogFormat, LoggingConfig};
    pub use crate::run::{LoadOptions, ResultState, ResultStatus, ResultStore, RunState};
    pub use crate::signature::{
        SignatureOptions, SignatureRequest, TaskEvent, TaskSignature, TaskSignatureFactory,
    };
}

/// Version of the pipechain library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
