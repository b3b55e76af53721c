//! Cache key namespaces.

/// Key of a run record.
#[must_use]
pub fn run_state_key(pipeline_id: &str, execution_id: &str) -> String {
    format!("pipelineRunWrapper:{pipeline_id}:{execution_id}")
}

/// Key of a run's result. Results are addressed by execution id alone.
#[must_use]
pub fn result_key(execution_id: &str) -> String {
    format!("pipelineResult:{execution_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_formats() {
        assert_eq!(run_state_key("p", "e"), "pipelineRunWrapper:p:e");
        assert_eq!(result_key("e"), "pipelineResult:e");
    }
}
