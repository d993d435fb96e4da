//! Alias executor.

use super::{ensure_supported, failure, ExecutorContext, OperationExecutor, OperationGroup};
use crate::backend::IdentityBackend;
use crate::error::{BackendError, ExecutorError, ExecutorResult, ResponseStatusType};
use crate::models::ChangeTag;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};
use usersync_protocol::{
    DeleteAlias, ExecutionResponse, ExecutionResult, Operation, OperationKind, SetAlias,
};

const NAME: &str = "IdentityOperationExecutor";
const OPERATIONS: &[OperationKind] = &[OperationKind::SetAlias, OperationKind::DeleteAlias];

/// Executes [`SetAlias`] and [`DeleteAlias`] groups.
///
/// A group covers one label on one user, so only its last operation is sent.
pub struct IdentityOperationExecutor {
    backend: Arc<dyn IdentityBackend>,
    context: Arc<ExecutorContext>,
}

impl IdentityOperationExecutor {
    /// Creates the executor.
    pub fn new(backend: Arc<dyn IdentityBackend>, context: Arc<ExecutorContext>) -> Self {
        Self { backend, context }
    }

    async fn set_alias(&self, op: &SetAlias) -> ExecutionResponse {
        let mut identities = BTreeMap::new();
        identities.insert(op.label.clone(), op.value.clone());

        match self
            .backend
            .set_alias(&op.app_id, &op.onesignal_id, identities)
            .await
        {
            Ok(_) => {
                let applied = self.context.identity.update_if_current(
                    &op.onesignal_id,
                    ChangeTag::Hydrate,
                    |m| vec![m.set(op.label.clone(), op.value.clone())],
                );
                if !applied {
                    debug!("user {} is no longer current, alias not hydrated", op.onesignal_id);
                }
                ExecutionResponse::success()
            }
            Err(error) => self.set_alias_failed(op, &error),
        }
    }

    fn set_alias_failed(&self, op: &SetAlias, error: &BackendError) -> ExecutionResponse {
        let status = error.status_type();
        warn!("set alias {} on {} failed: {} ({:?})", op.label, op.onesignal_id, error, status);
        match status {
            ResponseStatusType::Retryable => failure(ExecutionResult::FailRetry, error),
            ResponseStatusType::Invalid => failure(ExecutionResult::FailNoRetry, error),
            ResponseStatusType::Conflict => failure(ExecutionResult::FailConflict, error),
            ResponseStatusType::Unauthorized => failure(ExecutionResult::FailUnauthorized, error),
            ResponseStatusType::Missing => self.context.missing_response(
                &op.app_id,
                &op.onesignal_id,
                &op.onesignal_id,
                error,
            ),
        }
    }

    async fn delete_alias(&self, op: &DeleteAlias) -> ExecutionResponse {
        match self
            .backend
            .delete_alias(&op.app_id, &op.onesignal_id, &op.label)
            .await
        {
            Ok(()) => {
                self.clear_label(op);
                ExecutionResponse::success()
            }
            Err(error) => {
                let status = error.status_type();
                warn!(
                    "delete alias {} on {} failed: {} ({:?})",
                    op.label, op.onesignal_id, error, status
                );
                match status {
                    ResponseStatusType::Retryable => failure(ExecutionResult::FailRetry, &error),
                    ResponseStatusType::Invalid => failure(ExecutionResult::FailNoRetry, &error),
                    // The label is already absent on the target.
                    ResponseStatusType::Conflict => ExecutionResponse::success(),
                    ResponseStatusType::Unauthorized => {
                        failure(ExecutionResult::FailUnauthorized, &error)
                    }
                    ResponseStatusType::Missing => {
                        if error.is_not_found()
                            && self
                                .context
                                .new_records
                                .is_in_missing_retry_window(&op.onesignal_id)
                        {
                            failure(ExecutionResult::FailRetry, &error)
                        } else {
                            // Either the user or the alias is gone.
                            ExecutionResponse::success()
                        }
                    }
                }
            }
        }
    }

    fn clear_label(&self, op: &DeleteAlias) {
        let applied = self
            .context
            .identity
            .update_if_current(&op.onesignal_id, ChangeTag::Hydrate, |m| {
                vec![m.remove(&op.label)]
            });
        if !applied {
            debug!("user {} is no longer current, alias not cleared", op.onesignal_id);
        }
    }
}

#[async_trait]
impl OperationExecutor for IdentityOperationExecutor {
    fn operations(&self) -> &'static [OperationKind] {
        OPERATIONS
    }

    async fn execute(&self, group: &OperationGroup) -> ExecutorResult<ExecutionResponse> {
        ensure_supported(NAME, OPERATIONS, group)?;
        let first = group.first().kind();
        if let Some(other) = group.iter().find(|op| op.kind() != first) {
            return Err(ExecutorError::MixedOperations {
                first,
                second: other.kind(),
            });
        }
        debug!("{}: executing {} {} operations", NAME, group.len(), first);

        match group.last() {
            Operation::SetAlias(op) => Ok(self.set_alias(op).await),
            Operation::DeleteAlias(op) => Ok(self.delete_alias(op).await),
            other => Err(ExecutorError::UnsupportedOperation {
                executor: NAME,
                kind: other.kind(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigModel, ConfigModelStore};
    use crate::mock::{BackendCall, BackendMethod, MockBackend};
    use crate::models::{
        IdentityModel, IdentityModelStore, PropertiesModelStore, SubscriptionModelStore,
    };
    use crate::new_records::{ManualClock, NewRecordsState};
    use crate::rebuild::RebuildUserService;
    use std::time::Duration;

    struct NoRebuild;

    impl RebuildUserService for NoRebuild {
        fn get_rebuild_operations_if_current_user(&self, _: &str, _: &str) -> Option<Vec<Operation>> {
            None
        }
    }

    fn setup(current: &str) -> (IdentityOperationExecutor, Arc<MockBackend>, Arc<ExecutorContext>) {
        let config = Arc::new(ConfigModelStore::new(ConfigModel::new("app")));
        let context = Arc::new(ExecutorContext::new(
            config,
            Arc::new(IdentityModelStore::new(IdentityModel::with_onesignal_id(current))),
            Arc::new(PropertiesModelStore::default()),
            Arc::new(SubscriptionModelStore::new()),
        ));
        let backend = Arc::new(MockBackend::new());
        (
            IdentityOperationExecutor::new(backend.clone(), context.clone()),
            backend,
            context,
        )
    }

    #[tokio::test]
    async fn only_the_last_set_is_sent() {
        let (executor, backend, context) = setup("u1");
        let group = OperationGroup::new(vec![
            SetAlias::new("app", "u1", "a", "1").into(),
            SetAlias::new("app", "u1", "a", "2").into(),
        ])
        .unwrap();

        let response = executor.execute(&group).await.unwrap();

        assert_eq!(response.result, ExecutionResult::Success);
        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            BackendCall::SetAlias { identities, .. } => {
                assert_eq!(identities.get("a").map(String::as_str), Some("2"));
            }
            other => panic!("unexpected call {:?}", other),
        }
        assert_eq!(context.identity.model().get("a"), Some("2"));
    }

    #[tokio::test]
    async fn stale_user_is_not_hydrated() {
        let (executor, _backend, context) = setup("u2");
        let response = executor
            .execute(&OperationGroup::single(SetAlias::new("app", "u1", "a", "1")))
            .await
            .unwrap();

        assert_eq!(response.result, ExecutionResult::Success);
        assert_eq!(context.identity.model().get("a"), None);
    }

    #[tokio::test]
    async fn mixing_set_and_delete_is_an_error() {
        let (executor, backend, _) = setup("u1");
        let group = OperationGroup::new(vec![
            SetAlias::new("app", "u1", "a", "1").into(),
            DeleteAlias::new("app", "u1", "a").into(),
        ])
        .unwrap();

        let err = executor.execute(&group).await.unwrap_err();
        assert!(matches!(err, ExecutorError::MixedOperations { .. }));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn set_alias_failure_mapping() {
        let cases = [
            (500, ExecutionResult::FailRetry),
            (400, ExecutionResult::FailNoRetry),
            (409, ExecutionResult::FailConflict),
            (401, ExecutionResult::FailUnauthorized),
        ];
        for (status, expected) in cases {
            let (executor, backend, _) = setup("u1");
            backend.fail_next(
                BackendMethod::SetAlias,
                BackendError::new(status, "error").with_retry_after(7),
            );
            let response = executor
                .execute(&OperationGroup::single(SetAlias::new("app", "u1", "a", "1")))
                .await
                .unwrap();
            assert_eq!(response.result, expected, "status {}", status);
            assert_eq!(response.retry_after_seconds, Some(7));
        }
    }

    #[tokio::test]
    async fn set_alias_missing_rebuilds_current_user() {
        let (executor, backend, _) = setup("u1");
        backend.fail_next(BackendMethod::SetAlias, BackendError::new(404, "not found"));

        let response = executor
            .execute(&OperationGroup::single(SetAlias::new("app", "u1", "a", "1")))
            .await
            .unwrap();

        assert_eq!(response.result, ExecutionResult::FailRetry);
        assert!(!response.operations.unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_alias_missing_in_window_retries() {
        let (executor, backend, context) = setup("u1");
        context.new_records.add("u1");
        backend.fail_next(BackendMethod::SetAlias, BackendError::new(404, "not found"));

        let response = executor
            .execute(&OperationGroup::single(SetAlias::new("app", "u1", "a", "1")))
            .await
            .unwrap();

        assert_eq!(response.result, ExecutionResult::FailRetry);
        assert_eq!(response.operations, None);
    }

    #[tokio::test]
    async fn set_alias_missing_for_stale_user_is_dropped() {
        let config = Arc::new(ConfigModelStore::new(ConfigModel::new("app")));
        let clock = Arc::new(ManualClock::new(0));
        let context = Arc::new(
            ExecutorContext::new(
                config.clone(),
                Arc::new(IdentityModelStore::new(IdentityModel::with_onesignal_id("u1"))),
                Arc::new(PropertiesModelStore::default()),
                Arc::new(SubscriptionModelStore::new()),
            )
            .with_new_records(Arc::new(NewRecordsState::with_clock(config, clock.clone())))
            .with_rebuild_service(Arc::new(NoRebuild)),
        );
        let backend = Arc::new(MockBackend::new());
        let executor = IdentityOperationExecutor::new(backend.clone(), context.clone());

        context.new_records.add("u1");
        clock.advance(Duration::from_secs(61));
        backend.fail_next(BackendMethod::SetAlias, BackendError::new(404, "not found"));

        let response = executor
            .execute(&OperationGroup::single(SetAlias::new("app", "u1", "a", "1")))
            .await
            .unwrap();
        assert_eq!(response.result, ExecutionResult::FailNoRetry);
    }

    #[tokio::test]
    async fn delete_alias_treats_gone_as_done() {
        for status in [404, 409] {
            let (executor, backend, context) = setup("u1");
            context.identity.set_alias("a", "1", ChangeTag::Normal);
            backend.fail_next(BackendMethod::DeleteAlias, BackendError::new(status, "gone"));

            let response = executor
                .execute(&OperationGroup::single(DeleteAlias::new("app", "u1", "a")))
                .await
                .unwrap();
            assert_eq!(response.result, ExecutionResult::Success, "status {}", status);
        }
    }

    #[tokio::test]
    async fn delete_alias_clears_the_label() {
        let (executor, _backend, context) = setup("u1");
        context.identity.set_alias("a", "1", ChangeTag::Normal);

        let response = executor
            .execute(&OperationGroup::single(DeleteAlias::new("app", "u1", "a")))
            .await
            .unwrap();

        assert_eq!(response.result, ExecutionResult::Success);
        assert_eq!(context.identity.model().get("a"), None);
    }
}
