//! UUID and clock helpers.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generates a fresh execution id (UUID v4, hyphenated).
#[must_use]
pub fn generate_execution_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates a fresh task id (UUID v4, hyphenated).
#[must_use]
pub fn generate_task_id() -> String {
    Uuid::new_v4().to_string()
}

/// Returns the current UTC time.
#[must_use]
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}
