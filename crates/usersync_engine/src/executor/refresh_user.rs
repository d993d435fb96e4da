//! Replaces the local models with the backend's copy of the user.

use super::{ensure_supported, failure, ExecutorContext, OperationExecutor, OperationGroup};
use crate::backend::UserBackend;
use crate::error::{ExecutorError, ExecutorResult, ResponseStatusType};
use crate::models::{ChangeTag, IdentityModel, PropertiesModel, SubscriptionModel, REPLACED};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use usersync_protocol::{
    ExecutionResponse, ExecutionResult, Operation, OperationKind, RefreshUser, UserResponse,
};

const NAME: &str = "RefreshUserOperationExecutor";
const OPERATIONS: &[OperationKind] = &[OperationKind::RefreshUser];

/// Fetches a user and overwrites the local identity, properties and
/// subscriptions with it.
pub struct RefreshUserOperationExecutor {
    backend: Arc<dyn UserBackend>,
    context: Arc<ExecutorContext>,
}

impl RefreshUserOperationExecutor {
    /// Creates the executor.
    pub fn new(backend: Arc<dyn UserBackend>, context: Arc<ExecutorContext>) -> Self {
        Self { backend, context }
    }

    async fn refresh(&self, op: &RefreshUser) -> ExecutionResponse {
        match self.backend.get_user(&op.app_id, &op.onesignal_id).await {
            Ok(response) => {
                self.replace_models(op, response);
                ExecutionResponse::success()
            }
            Err(error) => {
                let status = error.status_type();
                warn!("refresh of user {} failed: {} ({:?})", op.onesignal_id, error, status);
                match status {
                    ResponseStatusType::Retryable => failure(ExecutionResult::FailRetry, &error),
                    ResponseStatusType::Unauthorized => {
                        failure(ExecutionResult::FailUnauthorized, &error)
                    }
                    ResponseStatusType::Missing => self.context.missing_response(
                        &op.app_id,
                        &op.onesignal_id,
                        &op.onesignal_id,
                        &error,
                    ),
                    _ => failure(ExecutionResult::FailNoRetry, &error),
                }
            }
        }
    }

    fn replace_models(&self, op: &RefreshUser, response: UserResponse) {
        let identity = IdentityModel::from_aliases(response.identities);
        let applied = self
            .context
            .identity
            .update_if_current(&op.onesignal_id, ChangeTag::Hydrate, |m| {
                *m = identity;
                vec![REPLACED.to_string()]
            });
        if !applied {
            debug!("user {} is no longer current, discarding refresh", op.onesignal_id);
            return;
        }

        let remote = response.properties;
        let properties = PropertiesModel {
            onesignal_id: Some(op.onesignal_id.clone()),
            language: remote.language,
            timezone: remote.timezone_id,
            country: remote.country,
            location_latitude: remote.lat,
            location_longitude: remote.long,
            tags: remote.tags.unwrap_or_default(),
        };
        self.context.properties.replace(properties, ChangeTag::Hydrate);

        // Push subscriptions from other installs of the app are not ours.
        let push_subscription_id = self.context.config.push_subscription_id();
        let subscriptions: Vec<_> = response
            .subscriptions
            .iter()
            .filter(|s| {
                !s.subscription_type.is_push() || (s.id.is_some() && s.id == push_subscription_id)
            })
            .filter_map(SubscriptionModel::from_backend)
            .collect();
        debug!(
            "refreshed user {} with {} subscriptions",
            op.onesignal_id,
            subscriptions.len()
        );
        self.context
            .subscriptions
            .replace_all(subscriptions, ChangeTag::Hydrate);
    }
}

#[async_trait]
impl OperationExecutor for RefreshUserOperationExecutor {
    fn operations(&self) -> &'static [OperationKind] {
        OPERATIONS
    }

    async fn execute(&self, group: &OperationGroup) -> ExecutorResult<ExecutionResponse> {
        ensure_supported(NAME, OPERATIONS, group)?;
        debug!("{}: executing {} refreshes", NAME, group.len());

        match group.first() {
            Operation::RefreshUser(op) => Ok(self.refresh(op).await),
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
    use crate::error::BackendError;
    use crate::mock::{BackendMethod, MockBackend};
    use crate::models::{IdentityModelStore, PropertiesModelStore, SubscriptionModelStore};
    use std::collections::BTreeMap;
    use usersync_protocol::{
        SubscriptionObject, SubscriptionStatus, SubscriptionType, UserProperties,
    };

    fn setup(current: &str) -> (RefreshUserOperationExecutor, Arc<MockBackend>, Arc<ExecutorContext>) {
        let context = Arc::new(ExecutorContext::new(
            Arc::new(ConfigModelStore::new(
                ConfigModel::new("app").with_push_subscription_id("push-mine"),
            )),
            Arc::new(IdentityModelStore::new(IdentityModel::with_onesignal_id(current))),
            Arc::new(PropertiesModelStore::new(PropertiesModel::with_onesignal_id(current))),
            Arc::new(SubscriptionModelStore::new()),
        ));
        let backend = Arc::new(MockBackend::new());
        (
            RefreshUserOperationExecutor::new(backend.clone(), context.clone()),
            backend,
            context,
        )
    }

    fn subscription(id: &str, subscription_type: SubscriptionType) -> SubscriptionObject {
        SubscriptionObject {
            id: Some(id.to_string()),
            ..SubscriptionObject::new(subscription_type, "addr", true, SubscriptionStatus::Subscribed)
        }
    }

    fn remote_user() -> UserResponse {
        let mut identities = BTreeMap::new();
        identities.insert("onesignal_id".to_string(), "u1".to_string());
        identities.insert("external_id".to_string(), "ext".to_string());
        let mut tags = BTreeMap::new();
        tags.insert("level".to_string(), "9".to_string());
        UserResponse {
            identities,
            properties: UserProperties {
                tags: Some(tags),
                language: Some("de".into()),
                ..Default::default()
            },
            subscriptions: vec![
                subscription("push-mine", SubscriptionType::Push),
                subscription("push-other-install", SubscriptionType::Push),
                subscription("email-1", SubscriptionType::Email),
            ],
        }
    }

    #[tokio::test]
    async fn replaces_current_user_models() {
        let (executor, backend, context) = setup("u1");
        backend.push_user_response(remote_user());

        let response = executor
            .execute(&OperationGroup::single(RefreshUser::new("app", "u1")))
            .await
            .unwrap();

        assert_eq!(response.result, ExecutionResult::Success);
        assert_eq!(context.identity.model().external_id(), Some("ext"));
        let properties = context.properties.model();
        assert_eq!(properties.language.as_deref(), Some("de"));
        assert_eq!(properties.tags.get("level").map(String::as_str), Some("9"));

        let ids: Vec<_> = context
            .subscriptions
            .list()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["push-mine", "email-1"]);
    }

    #[tokio::test]
    async fn stale_refresh_is_discarded() {
        let (executor, backend, context) = setup("u2");
        backend.push_user_response(remote_user());

        let response = executor
            .execute(&OperationGroup::single(RefreshUser::new("app", "u1")))
            .await
            .unwrap();

        assert_eq!(response.result, ExecutionResult::Success);
        assert_eq!(context.identity.onesignal_id().as_deref(), Some("u2"));
        assert!(context.properties.model().tags.is_empty());
        assert!(context.subscriptions.list().is_empty());
    }

    #[tokio::test]
    async fn missing_in_window_retries() {
        let (executor, backend, context) = setup("u1");
        context.new_records.add("u1");
        backend.fail_next(BackendMethod::GetUser, BackendError::new(404, "not yet"));

        let response = executor
            .execute(&OperationGroup::single(RefreshUser::new("app", "u1")))
            .await
            .unwrap();

        assert_eq!(response.result, ExecutionResult::FailRetry);
        assert_eq!(response.operations, None);
    }

    #[tokio::test]
    async fn missing_stale_user_is_dropped() {
        let (executor, backend, _) = setup("u2");
        backend.fail_next(BackendMethod::GetUser, BackendError::new(410, "gone"));

        let response = executor
            .execute(&OperationGroup::single(RefreshUser::new("app", "u1")))
            .await
            .unwrap();

        assert_eq!(response.result, ExecutionResult::FailNoRetry);
    }

    #[tokio::test]
    async fn failure_mapping() {
        let cases = [
            (500, ExecutionResult::FailRetry),
            (401, ExecutionResult::FailUnauthorized),
            (400, ExecutionResult::FailNoRetry),
        ];
        for (status, expected) in cases {
            let (executor, backend, _) = setup("u1");
            backend.fail_next(BackendMethod::GetUser, BackendError::new(status, "error"));
            let response = executor
                .execute(&OperationGroup::single(RefreshUser::new("app", "u1")))
                .await
                .unwrap();
            assert_eq!(response.result, expected, "status {}", status);
        }
    }
}
