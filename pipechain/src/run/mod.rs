//! Run tracking: the per-execution record and its terminal result.

mod result;
mod state;

pub use result::{ResultState, ResultStatus, ResultStore};
pub use state::{LoadOptions, RunState, LOADED_MESSAGE};
