//! Operation executors.
//!
//! The dispatcher groups queued operations and hands each group to the
//! executor that declares its kinds. An executor merges the group, makes at
//! most one backend request, hydrates local models from the response and
//! classifies failures into an [`ExecutionResult`].
//!
//! ```text
//!   dispatcher ──group──▶ executor ──1 request──▶ backend
//!        ▲                   │
//!        └──ExecutionResponse┘ (result, id translations, follow-ups)
//! ```

mod custom_event;
mod identity;
mod login_user;
mod login_user_from_subscription;
mod refresh_user;
mod subscription;
mod update_user;

pub use custom_event::{CustomEventOperationExecutor, DeviceInfo};
pub use identity::IdentityOperationExecutor;
pub use login_user::LoginUserOperationExecutor;
pub use login_user_from_subscription::LoginUserFromSubscriptionOperationExecutor;
pub use refresh_user::RefreshUserOperationExecutor;
pub use subscription::SubscriptionOperationExecutor;
pub use update_user::UpdateUserOperationExecutor;

use crate::config::ConfigModelStore;
use crate::consistency::{ConsistencyManager, MemoryConsistencyManager};
use crate::error::{BackendError, ExecutorError, ExecutorResult};
use crate::models::{IdentityModelStore, PropertiesModelStore, SubscriptionModelStore};
use crate::new_records::NewRecordsState;
use crate::rebuild::{ModelRebuildService, RebuildUserService};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;
use usersync_protocol::{ExecutionResponse, ExecutionResult, Operation, OperationKind};

/// Executes groups of operations of the kinds it declares.
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    /// Kinds this executor accepts.
    fn operations(&self) -> &'static [OperationKind];

    /// Executes one group.
    ///
    /// Backend failures are folded into the returned response; an `Err` means
    /// the group should never have been handed to this executor.
    async fn execute(&self, group: &OperationGroup) -> ExecutorResult<ExecutionResponse>;
}

/// A non-empty, ordered group of operations.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationGroup {
    operations: Vec<Operation>,
}

impl OperationGroup {
    /// Creates a group. Fails if `operations` is empty.
    pub fn new(operations: Vec<Operation>) -> ExecutorResult<Self> {
        if operations.is_empty() {
            return Err(ExecutorError::EmptyGroup);
        }
        Ok(Self { operations })
    }

    /// Creates a group of one.
    pub fn single(operation: impl Into<Operation>) -> Self {
        Self {
            operations: vec![operation.into()],
        }
    }

    /// The first operation.
    pub fn first(&self) -> &Operation {
        &self.operations[0]
    }

    /// The last operation.
    pub fn last(&self) -> &Operation {
        &self.operations[self.operations.len() - 1]
    }

    /// Number of operations; never zero.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Always false.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterates the operations in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.operations.iter()
    }

    /// The operations as a slice.
    pub fn as_slice(&self) -> &[Operation] {
        &self.operations
    }
}

impl<'a> IntoIterator for &'a OperationGroup {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Collaborators shared by every executor.
pub struct ExecutorContext {
    /// Configuration.
    pub config: Arc<ConfigModelStore>,
    /// Recently created records.
    pub new_records: Arc<NewRecordsState>,
    /// Rebuild advisor.
    pub rebuild: Arc<dyn RebuildUserService>,
    /// Read-your-write tracking.
    pub consistency: Arc<dyn ConsistencyManager>,
    /// Identity model.
    pub identity: Arc<IdentityModelStore>,
    /// Properties model.
    pub properties: Arc<PropertiesModelStore>,
    /// Subscription models.
    pub subscriptions: Arc<SubscriptionModelStore>,
}

impl ExecutorContext {
    /// Creates a context over the given stores, with a system-clock
    /// [`NewRecordsState`], a [`ModelRebuildService`] and an in-memory
    /// consistency manager.
    pub fn new(
        config: Arc<ConfigModelStore>,
        identity: Arc<IdentityModelStore>,
        properties: Arc<PropertiesModelStore>,
        subscriptions: Arc<SubscriptionModelStore>,
    ) -> Self {
        Self {
            new_records: Arc::new(NewRecordsState::new(config.clone())),
            rebuild: Arc::new(ModelRebuildService::new(
                identity.clone(),
                subscriptions.clone(),
                config.clone(),
            )),
            consistency: Arc::new(MemoryConsistencyManager::new()),
            config,
            identity,
            properties,
            subscriptions,
        }
    }

    /// Replaces the new-records state.
    pub fn with_new_records(mut self, new_records: Arc<NewRecordsState>) -> Self {
        self.new_records = new_records;
        self
    }

    /// Replaces the rebuild advisor.
    pub fn with_rebuild_service(mut self, rebuild: Arc<dyn RebuildUserService>) -> Self {
        self.rebuild = rebuild;
        self
    }

    /// Replaces the consistency manager.
    pub fn with_consistency_manager(mut self, consistency: Arc<dyn ConsistencyManager>) -> Self {
        self.consistency = consistency;
        self
    }

    /// Response for a MISSING failure on `id`.
    ///
    /// A not-found inside the missing-retry window is replication lag and is
    /// retried. Otherwise the user is rebuilt if it is still current, and the
    /// group is dropped if it is not.
    pub(crate) fn missing_response(
        &self,
        app_id: &str,
        onesignal_id: &str,
        window_id: &str,
        error: &BackendError,
    ) -> ExecutionResponse {
        if error.is_not_found() && self.new_records.is_in_missing_retry_window(window_id) {
            warn!(
                "{} not found inside the missing-retry window, retrying",
                window_id
            );
            return failure(ExecutionResult::FailRetry, error);
        }

        match self
            .rebuild
            .get_rebuild_operations_if_current_user(app_id, onesignal_id)
        {
            Some(operations) => {
                warn!(
                    "user {} is missing on the backend, rebuilding with {} operations",
                    onesignal_id,
                    operations.len()
                );
                failure(ExecutionResult::FailRetry, error).with_operations(operations)
            }
            None => {
                warn!(
                    "user {} is missing on the backend and no longer current, dropping",
                    onesignal_id
                );
                failure(ExecutionResult::FailNoRetry, error)
            }
        }
    }
}

/// A failed response carrying the backend's retry-after hint.
pub(crate) fn failure(result: ExecutionResult, error: &BackendError) -> ExecutionResponse {
    ExecutionResponse::new(result).with_retry_after(error.retry_after_seconds)
}

/// Fails unless every operation in `group` is one of `supported`.
pub(crate) fn ensure_supported(
    executor: &'static str,
    supported: &[OperationKind],
    group: &OperationGroup,
) -> ExecutorResult<()> {
    match group.iter().find(|op| !supported.contains(&op.kind())) {
        Some(op) => Err(ExecutorError::UnsupportedOperation {
            executor,
            kind: op.kind(),
        }),
        None => Ok(()),
    }
}

/// Fails unless `group` has exactly one operation.
pub(crate) fn ensure_single(executor: &'static str, group: &OperationGroup) -> ExecutorResult<()> {
    if group.len() > 1 {
        return Err(ExecutorError::GroupTooLarge {
            executor,
            len: group.len(),
        });
    }
    Ok(())
}

/// Fails unless every operation in `group` targets the same user.
pub(crate) fn ensure_single_subject(group: &OperationGroup) -> ExecutorResult<()> {
    let expected = group.first().onesignal_id();
    match group.iter().find(|op| op.onesignal_id() != expected) {
        Some(op) => Err(ExecutorError::MixedSubjects {
            expected: expected.to_string(),
            found: op.onesignal_id().to_string(),
        }),
        None => Ok(()),
    }
}
