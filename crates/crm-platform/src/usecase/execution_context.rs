//! Execution Context
//!
//! Carries the acting user and an execution id through a use case so that
//! every log line of one request can be correlated.

use crate::shared::tsid::TsidGenerator;

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Unique ID for this execution (generated)
    pub execution_id: String,
    /// Owner of the data being touched
    pub principal_id: String,
}

impl ExecutionContext {
    /// Create a new execution context for a fresh request.
    pub fn create(principal_id: impl Into<String>) -> Self {
        Self {
            execution_id: format!("exec-{}", TsidGenerator::generate()),
            principal_id: principal_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_context() {
        let ctx = ExecutionContext::create("user-123");

        assert!(ctx.execution_id.starts_with("exec-"));
        assert_eq!(ctx.principal_id, "user-123");
    }

    #[test]
    fn test_each_request_gets_its_own_execution_id() {
        let first = ExecutionContext::create("user-123");
        let second = ExecutionContext::create("user-123");
        assert_ne!(first.execution_id, second.execution_id);
    }
}
