//! Subscription executor.

use super::{ensure_supported, failure, ExecutorContext, OperationExecutor, OperationGroup};
use crate::backend::SubscriptionBackend;
use crate::consistency::RywPurpose;
use crate::error::{BackendError, ExecutorError, ExecutorResult, ResponseStatusType};
use crate::merge::{cancels_create, effective_create};
use crate::models::ChangeTag;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use usersync_protocol::{
    CreateSubscription, DeleteSubscription, ExecutionResponse, ExecutionResult, Operation,
    OperationKind, RywToken, SubscriptionObject, UpdateSubscription,
};

const NAME: &str = "SubscriptionOperationExecutor";
const OPERATIONS: &[OperationKind] = &[
    OperationKind::CreateSubscription,
    OperationKind::UpdateSubscription,
    OperationKind::DeleteSubscription,
];

/// Executes create, update and delete groups for one subscription.
///
/// A group starting with a create is sent as one create; otherwise a delete
/// anywhere in the group wins; otherwise the last update is sent.
pub struct SubscriptionOperationExecutor {
    backend: Arc<dyn SubscriptionBackend>,
    context: Arc<ExecutorContext>,
}

impl SubscriptionOperationExecutor {
    /// Creates the executor.
    pub fn new(backend: Arc<dyn SubscriptionBackend>, context: Arc<ExecutorContext>) -> Self {
        Self { backend, context }
    }

    async fn create(&self, create: &CreateSubscription, group: &OperationGroup) -> ExecutionResponse {
        if cancels_create(create, group) {
            debug!(
                "subscription {} created and deleted in one group, nothing to send",
                create.subscription_id
            );
            return ExecutionResponse::success();
        }

        let subscription = effective_create(create, group);
        let result = self
            .backend
            .create_subscription(&create.app_id, &create.onesignal_id, subscription)
            .await;

        let (backend_id, token) = match result {
            Ok(created) => created,
            Err(error) => {
                warn!(
                    "create subscription {} failed: {} ({:?})",
                    create.subscription_id,
                    error,
                    error.status_type()
                );
                return retry_mapping(&error);
            }
        };

        self.record_write(&create.onesignal_id, token);
        self.context.new_records.add(backend_id.clone());
        self.context.subscriptions.set_id(
            &create.subscription_id,
            &backend_id,
            ChangeTag::Hydrate,
        );
        self.context
            .config
            .translate_push_subscription_id(&create.subscription_id, &backend_id);
        info!(
            "subscription {} created as {}",
            create.subscription_id, backend_id
        );

        let mut translations = HashMap::new();
        translations.insert(create.subscription_id.clone(), backend_id);
        ExecutionResponse::success().with_id_translations(translations)
    }

    async fn update(&self, update: &UpdateSubscription) -> ExecutionResponse {
        let subscription = SubscriptionObject::new(
            update.subscription_type,
            update.address.clone(),
            update.enabled,
            update.status,
        );
        match self
            .backend
            .update_subscription(&update.app_id, &update.subscription_id, subscription)
            .await
        {
            Ok(token) => {
                self.record_write(&update.onesignal_id, token);
                ExecutionResponse::success()
            }
            Err(error) => {
                warn!(
                    "update subscription {} failed: {} ({:?})",
                    update.subscription_id,
                    error,
                    error.status_type()
                );
                match error.status_type() {
                    ResponseStatusType::Missing => self.update_missing(update, &error),
                    _ => retry_mapping(&error),
                }
            }
        }
    }

    /// An update for a subscription the backend does not have re-creates it.
    fn update_missing(&self, update: &UpdateSubscription, error: &BackendError) -> ExecutionResponse {
        if error.is_not_found()
            && self
                .context
                .new_records
                .is_in_missing_retry_window(&update.subscription_id)
        {
            return failure(ExecutionResult::FailRetry, error);
        }
        let recreate = CreateSubscription::new(
            update.app_id.clone(),
            update.onesignal_id.clone(),
            update.subscription_id.clone(),
            update.subscription_type,
            update.enabled,
            update.address.clone(),
            update.status,
        );
        failure(ExecutionResult::FailNoRetry, error).with_operations(vec![recreate.into()])
    }

    async fn delete(&self, delete: &DeleteSubscription) -> ExecutionResponse {
        match self
            .backend
            .delete_subscription(&delete.app_id, &delete.subscription_id)
            .await
        {
            Ok(()) => {
                self.context
                    .subscriptions
                    .remove(&delete.subscription_id, ChangeTag::Hydrate);
                ExecutionResponse::success()
            }
            Err(error) => {
                warn!(
                    "delete subscription {} failed: {} ({:?})",
                    delete.subscription_id,
                    error,
                    error.status_type()
                );
                retry_mapping(&error)
            }
        }
    }

    fn record_write(&self, onesignal_id: &str, token: Option<RywToken>) {
        match token {
            Some(token) => {
                self.context
                    .consistency
                    .set_ryw_token(onesignal_id, RywPurpose::Subscription, token)
            }
            None => self.context.consistency.resolve_conditions_with_id(onesignal_id),
        }
    }
}

/// Create and delete failures, and update failures other than MISSING: only
/// transient failures are retried.
fn retry_mapping(error: &BackendError) -> ExecutionResponse {
    match error.status_type() {
        ResponseStatusType::Retryable => failure(ExecutionResult::FailRetry, error),
        _ => failure(ExecutionResult::FailNoRetry, error),
    }
}

#[async_trait]
impl OperationExecutor for SubscriptionOperationExecutor {
    fn operations(&self) -> &'static [OperationKind] {
        OPERATIONS
    }

    async fn execute(&self, group: &OperationGroup) -> ExecutorResult<ExecutionResponse> {
        ensure_supported(NAME, OPERATIONS, group)?;
        debug!(
            "{}: executing {} operations starting with {}",
            NAME,
            group.len(),
            group.first().kind()
        );

        if let Operation::CreateSubscription(create) = group.first() {
            return Ok(self.create(create, group).await);
        }

        let last_delete = group.iter().rev().find_map(|op| match op {
            Operation::DeleteSubscription(delete) => Some(delete),
            _ => None,
        });
        if let Some(delete) = last_delete {
            return Ok(self.delete(delete).await);
        }

        let last_update = group.iter().rev().find_map(|op| match op {
            Operation::UpdateSubscription(update) => Some(update),
            _ => None,
        });
        match last_update {
            Some(update) => Ok(self.update(update).await),
            None => Err(ExecutorError::UnexpectedStartingOperation {
                executor: NAME,
                kind: group.first().kind(),
            }),
        }
    }
}
