//! Error types for the executors.
//!
//! Two very different things can go wrong while executing a group:
//! the backend can reject the request ([`BackendError`], classified into a
//! [`ResponseStatusType`] and folded into an `ExecutionResult`), or the
//! dispatcher can hand an executor a group it must never see
//! ([`ExecutorError`], returned immediately).

use thiserror::Error;
use usersync_protocol::OperationKind;

/// Result type for executor calls.
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Result type for backend calls.
pub type BackendResult<T> = Result<T, BackendError>;

/// A failed backend request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("backend returned {status_code}: {message}")]
pub struct BackendError {
    /// HTTP status code.
    pub status_code: u16,
    /// Response body or transport message.
    pub message: String,
    /// Server-provided hint for how long to wait before retrying.
    pub retry_after_seconds: Option<u64>,
}

impl BackendError {
    /// Creates an error for `status_code`.
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
            retry_after_seconds: None,
        }
    }

    /// Sets the retry-after hint.
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after_seconds = Some(seconds);
        self
    }

    /// Creates the error a timed out request surfaces as.
    pub fn timeout() -> Self {
        Self::new(408, "request timed out")
    }

    /// Classifies this error.
    pub fn status_type(&self) -> ResponseStatusType {
        ResponseStatusType::from_status_code(self.status_code)
    }

    /// Returns true for a plain not-found, the only missing response that
    /// can be caused by backend replication lag.
    pub fn is_not_found(&self) -> bool {
        self.status_code == 404
    }
}

/// Retry taxonomy of backend failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatusType {
    /// Transient; the same request may succeed later.
    Retryable,
    /// The request itself is bad and will never succeed.
    Invalid,
    /// The request conflicts with existing state.
    Conflict,
    /// Credentials were rejected.
    Unauthorized,
    /// The target record does not exist (or not yet).
    Missing,
}

impl ResponseStatusType {
    /// Maps an HTTP status code onto the taxonomy.
    pub fn from_status_code(status_code: u16) -> Self {
        match status_code {
            400 | 402 => ResponseStatusType::Invalid,
            401 | 403 => ResponseStatusType::Unauthorized,
            404 | 410 => ResponseStatusType::Missing,
            409 => ResponseStatusType::Conflict,
            _ => ResponseStatusType::Retryable,
        }
    }
}

/// A group the executor cannot process. Always a dispatcher grouping bug.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    /// The group had no operations.
    #[error("operation group is empty")]
    EmptyGroup,

    /// The executor does not handle this kind of operation.
    #[error("{executor} cannot execute {kind} operations")]
    UnsupportedOperation {
        /// Executor name.
        executor: &'static str,
        /// Offending kind.
        kind: OperationKind,
    },

    /// Two kinds that must never share a group were mixed.
    #[error("cannot execute {first} and {second} operations in the same group")]
    MixedOperations {
        /// One of the kinds.
        first: OperationKind,
        /// The other kind.
        second: OperationKind,
    },

    /// The executor only supports groups of one.
    #[error("{executor} only supports one operation per group, got {len}")]
    GroupTooLarge {
        /// Executor name.
        executor: &'static str,
        /// Size of the group.
        len: usize,
    },

    /// The group targets more than one user.
    #[error("operation group targets both {expected} and {found}")]
    MixedSubjects {
        /// User of the first operation.
        expected: String,
        /// Conflicting user.
        found: String,
    },

    /// The first operation of the group is not the one the executor starts from.
    #[error("{executor} cannot start a group with {kind}")]
    UnexpectedStartingOperation {
        /// Executor name.
        executor: &'static str,
        /// Kind of the first operation.
        kind: OperationKind,
    },
}
