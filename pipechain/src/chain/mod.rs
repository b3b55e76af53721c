//! Chain compilation: from a pipeline run to ordered barriers of signatures.
//!
//! A compiled chain alternates concurrent barriers with regulator steps:
//!
//! ```text
//! [group 0] -> regulator -> [group 1] -> regulator -> ... -> [success] -> regulator
//! ```
//!
//! A barrier holding a single task is padded with a regulator signature.
//! When retries are enabled the chain carries one error handler that
//! re-enters compilation for the same execution id.

mod compiler;
mod model;
mod request;

#[cfg(test)]
mod integration_tests;

pub use compiler::ChainCompiler;
pub use model::{Barrier, BarrierKind, ChainStep, ExecutableChain};
pub use request::{CompileRequest, TaskHandle};
