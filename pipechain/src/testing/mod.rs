//! Testing utilities for pipechain.
//!
//! This module provides:
//! - Sample pipeline configurations
//! - Mock caches, execution services and handlers
//! - A wired in-process engine for end-to-end tests

mod fixtures;
mod mocks;

pub use fixtures::{diamond_config, fan_in_config, sample_config, TestEngine, SAMPLE_QUEUE};
pub use mocks::{FailingCache, FlakyHandler, RecordingExecutionService, RecordingHandler};
