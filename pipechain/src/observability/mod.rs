//! Logging setup and span helpers.

mod logging;
mod spans;

pub use logging::{init_tracing, LogFormat, LoggingConfig};
pub use spans::{chain_span, task_span};
