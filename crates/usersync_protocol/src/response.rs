//! Executor results.

use crate::operation::Operation;
use std::collections::HashMap;

/// Outcome of executing one group of operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionResult {
    /// Every operation in the group took effect.
    Success,
    /// The first operation took effect; the rest of the group was not
    /// executed and must be resubmitted by the caller.
    SuccessStartingOnly,
    /// Transient failure, retry the whole group later.
    FailRetry,
    /// Permanent failure, drop the group.
    FailNoRetry,
    /// The backend reported a conflicting record.
    FailConflict,
    /// Credentials were rejected; retry only after they are refreshed.
    FailUnauthorized,
}

impl ExecutionResult {
    /// Returns true for both success variants.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ExecutionResult::Success | ExecutionResult::SuccessStartingOnly
        )
    }
}

/// What an executor hands back to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResponse {
    /// Outcome.
    pub result: ExecutionResult,
    /// Local id to backend id translations learned while executing.
    pub id_translations: Option<HashMap<String, String>>,
    /// Follow-up operations to enqueue.
    pub operations: Option<Vec<Operation>>,
    /// Backend hint for how long to wait before retrying.
    pub retry_after_seconds: Option<u64>,
}

impl ExecutionResponse {
    /// Creates a response carrying only a result.
    pub fn new(result: ExecutionResult) -> Self {
        Self {
            result,
            id_translations: None,
            operations: None,
            retry_after_seconds: None,
        }
    }

    /// Creates a [`ExecutionResult::Success`] response.
    pub fn success() -> Self {
        Self::new(ExecutionResult::Success)
    }

    /// Attaches id translations.
    pub fn with_id_translations(mut self, translations: HashMap<String, String>) -> Self {
        self.id_translations = Some(translations);
        self
    }

    /// Attaches follow-up operations.
    pub fn with_operations(mut self, operations: Vec<Operation>) -> Self {
        self.operations = Some(operations);
        self
    }

    /// Attaches the backend's retry-after hint, if there is one.
    pub fn with_retry_after(mut self, seconds: Option<u64>) -> Self {
        self.retry_after_seconds = seconds;
        self
    }
}
