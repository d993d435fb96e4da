//! Resolves the user that owns an existing subscription.

use super::{ensure_single, ensure_supported, failure, ExecutorContext, OperationExecutor, OperationGroup};
use crate::backend::SubscriptionBackend;
use crate::error::{ExecutorError, ExecutorResult, ResponseStatusType};
use crate::models::ChangeTag;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use usersync_protocol::{
    ExecutionResponse, ExecutionResult, IdentityConstants, LoginUserFromSubscription, Operation,
    OperationKind, RefreshUser,
};

const NAME: &str = "LoginUserFromSubscriptionOperationExecutor";
const OPERATIONS: &[OperationKind] = &[OperationKind::LoginUserFromSubscription];

/// Executes a single [`LoginUserFromSubscription`].
pub struct LoginUserFromSubscriptionOperationExecutor {
    backend: Arc<dyn SubscriptionBackend>,
    context: Arc<ExecutorContext>,
}

impl LoginUserFromSubscriptionOperationExecutor {
    /// Creates the executor.
    pub fn new(backend: Arc<dyn SubscriptionBackend>, context: Arc<ExecutorContext>) -> Self {
        Self { backend, context }
    }

    async fn login(&self, op: &LoginUserFromSubscription) -> ExecutionResponse {
        if self.context.config.use_identity_verification() {
            warn!("login from subscription is not available with identity verification");
            return ExecutionResponse::new(ExecutionResult::FailNoRetry);
        }

        let identities = match self
            .backend
            .get_identity_from_subscription(&op.app_id, &op.subscription_id)
            .await
        {
            Ok(identities) => identities,
            Err(error) => {
                let status = error.status_type();
                warn!(
                    "identity lookup for subscription {} failed: {} ({:?})",
                    op.subscription_id, error, status
                );
                return match status {
                    ResponseStatusType::Retryable => failure(ExecutionResult::FailRetry, &error),
                    ResponseStatusType::Unauthorized => {
                        failure(ExecutionResult::FailUnauthorized, &error)
                    }
                    _ => failure(ExecutionResult::FailNoRetry, &error),
                };
            }
        };

        let Some(backend_id) = identities.get(IdentityConstants::ONESIGNAL_ID) else {
            warn!("subscription {} has no owning user", op.subscription_id);
            return ExecutionResponse::new(ExecutionResult::FailNoRetry);
        };

        let identity = self.context.identity.update_if_current(
            &op.onesignal_id,
            ChangeTag::Hydrate,
            |m| vec![m.set(IdentityConstants::ONESIGNAL_ID, backend_id.clone())],
        );
        let properties = self.context.properties.update_if_current(
            &op.onesignal_id,
            ChangeTag::Hydrate,
            |m| vec![m.set_onesignal_id(backend_id.clone())],
        );
        if !identity || !properties {
            warn!("user {} is no longer current, not hydrating {}", op.onesignal_id, backend_id);
        }
        info!("subscription {} belongs to user {}", op.subscription_id, backend_id);

        let mut translations = HashMap::new();
        translations.insert(op.onesignal_id.clone(), backend_id.clone());
        ExecutionResponse::success()
            .with_id_translations(translations)
            .with_operations(vec![RefreshUser::new(op.app_id.clone(), backend_id.clone()).into()])
    }
}

#[async_trait]
impl OperationExecutor for LoginUserFromSubscriptionOperationExecutor {
    fn operations(&self) -> &'static [OperationKind] {
        OPERATIONS
    }

    async fn execute(&self, group: &OperationGroup) -> ExecutorResult<ExecutionResponse> {
        ensure_supported(NAME, OPERATIONS, group)?;
        ensure_single(NAME, group)?;
        debug!("{}: executing", NAME);

        match group.first() {
            Operation::LoginUserFromSubscription(op) => Ok(self.login(op).await),
            other => Err(ExecutorError::UnsupportedOperation {
                executor: NAME,
                kind: other.kind(),
            }),
        }
    }
}
