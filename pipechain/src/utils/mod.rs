//! Identifier and timestamp helpers.

mod ids;

pub use ids::{generate_execution_id, generate_task_id, now_utc};
