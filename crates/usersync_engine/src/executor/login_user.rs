//! Login executor.
//!
//! A login either attaches the external id to a user the device already knows
//! (by delegating a `SetAlias` to the identity executor) or creates the user
//! together with everything queued behind the login.

use super::{ensure_supported, failure, ExecutorContext, OperationExecutor, OperationGroup};
use crate::backend::UserBackend;
use crate::error::{BackendError, ExecutorError, ExecutorResult, ResponseStatusType};
use crate::merge::{merge_aliases, merge_properties, SubscriptionList};
use crate::models::ChangeTag;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};
use usersync_protocol::{
    ExecutionResponse, ExecutionResult, IdentityConstants, LoginUser, Operation, OperationKind,
    RefreshUser, SetAlias, UserResponse,
};

const NAME: &str = "LoginUserOperationExecutor";
const OPERATIONS: &[OperationKind] = &[OperationKind::LoginUser];

/// Kinds that may be folded into a user create behind the login.
const CREATE_USER_OPERATIONS: &[OperationKind] = &[
    OperationKind::LoginUser,
    OperationKind::SetAlias,
    OperationKind::DeleteAlias,
    OperationKind::SetTag,
    OperationKind::DeleteTag,
    OperationKind::SetProperty,
    OperationKind::CreateSubscription,
    OperationKind::UpdateSubscription,
    OperationKind::DeleteSubscription,
];

/// Executes groups that start with a [`LoginUser`].
pub struct LoginUserOperationExecutor {
    identity_executor: Arc<dyn OperationExecutor>,
    backend: Arc<dyn UserBackend>,
    context: Arc<ExecutorContext>,
}

impl LoginUserOperationExecutor {
    /// Creates the executor. `identity_executor` handles the `SetAlias`
    /// issued when logging into an existing user.
    pub fn new(
        identity_executor: Arc<dyn OperationExecutor>,
        backend: Arc<dyn UserBackend>,
        context: Arc<ExecutorContext>,
    ) -> Self {
        Self {
            identity_executor,
            backend,
            context,
        }
    }

    async fn login_existing(
        &self,
        login: &LoginUser,
        existing_id: &str,
        external_id: &str,
        group: &OperationGroup,
    ) -> ExecutorResult<ExecutionResponse> {
        let set_alias = SetAlias::new(
            login.app_id.clone(),
            existing_id,
            IdentityConstants::EXTERNAL_ID,
            external_id,
        );
        let response = self
            .identity_executor
            .execute(&OperationGroup::single(set_alias))
            .await?;

        match response.result {
            ExecutionResult::Success => {
                self.hydrate_user_id(&login.onesignal_id, existing_id);
                info!("logged {} into existing user {}", login.onesignal_id, existing_id);
                let mut translations = HashMap::new();
                translations.insert(login.onesignal_id.clone(), existing_id.to_string());
                Ok(ExecutionResponse::new(ExecutionResult::SuccessStartingOnly)
                    .with_id_translations(translations))
            }
            ExecutionResult::FailNoRetry => {
                debug!(
                    "could not attach {} to {}, creating the user instead",
                    external_id, existing_id
                );
                Ok(self.create_user(login, group).await)
            }
            _ => Ok(response),
        }
    }

    async fn create_user(&self, login: &LoginUser, group: &OperationGroup) -> ExecutionResponse {
        let following = &group.as_slice()[1..];

        let mut seed = BTreeMap::new();
        if let Some(external_id) = &login.external_id {
            seed.insert(IdentityConstants::EXTERNAL_ID.to_string(), external_id.clone());
        }
        let identities = merge_aliases(seed, following);
        let properties = merge_properties(following);
        let subscriptions = SubscriptionList::from_operations(following);
        let upsert = !identities.is_empty();

        let result = self
            .backend
            .create_user(&login.app_id, identities, subscriptions.objects(), properties)
            .await;

        match result {
            Ok(response) => self.user_created(login, &subscriptions, response, upsert),
            Err(error) => create_user_failed(login, &error),
        }
    }

    fn user_created(
        &self,
        login: &LoginUser,
        subscriptions: &SubscriptionList,
        response: UserResponse,
        upsert: bool,
    ) -> ExecutionResponse {
        let Some(backend_id) = response.identities.get(IdentityConstants::ONESIGNAL_ID) else {
            warn!("create user response for {} has no onesignal_id", login.onesignal_id);
            return ExecutionResponse::new(ExecutionResult::FailNoRetry);
        };

        let mut translations = HashMap::new();
        translations.insert(login.onesignal_id.clone(), backend_id.clone());
        self.context.new_records.add(backend_id.clone());
        self.hydrate_user_id(&login.onesignal_id, backend_id);

        for (local_id, created) in subscriptions.ids().into_iter().zip(&response.subscriptions) {
            let Some(remote_id) = &created.id else {
                continue;
            };
            self.context.new_records.add(remote_id.clone());
            self.context
                .subscriptions
                .set_id(&local_id, remote_id, ChangeTag::Hydrate);
            self.context
                .config
                .translate_push_subscription_id(&local_id, remote_id);
            translations.insert(local_id, remote_id.clone());
        }
        info!(
            "created user {} for {} with {} subscriptions",
            backend_id,
            login.onesignal_id,
            translations.len() - 1
        );

        let response = ExecutionResponse::success().with_id_translations(translations);
        if upsert {
            // The identities may have matched an existing user whose state
            // the device does not have yet.
            response.with_operations(vec![RefreshUser::new(login.app_id.clone(), backend_id.clone()).into()])
        } else {
            response
        }
    }

    fn hydrate_user_id(&self, local_id: &str, backend_id: &str) {
        let identity = self
            .context
            .identity
            .update_if_current(local_id, ChangeTag::Hydrate, |m| {
                vec![m.set(IdentityConstants::ONESIGNAL_ID, backend_id)]
            });
        let properties = self
            .context
            .properties
            .update_if_current(local_id, ChangeTag::Hydrate, |m| {
                vec![m.set_onesignal_id(backend_id)]
            });
        if !identity || !properties {
            warn!(
                "user {} is no longer current, not hydrating {}",
                local_id, backend_id
            );
        }
    }
}

fn create_user_failed(login: &LoginUser, error: &BackendError) -> ExecutionResponse {
    let status = error.status_type();
    warn!("create user for {} failed: {} ({:?})", login.onesignal_id, error, status);
    match status {
        ResponseStatusType::Retryable => failure(ExecutionResult::FailRetry, error),
        ResponseStatusType::Unauthorized => failure(ExecutionResult::FailUnauthorized, error),
        _ => failure(ExecutionResult::FailNoRetry, error),
    }
}

#[async_trait]
impl OperationExecutor for LoginUserOperationExecutor {
    fn operations(&self) -> &'static [OperationKind] {
        OPERATIONS
    }

    async fn execute(&self, group: &OperationGroup) -> ExecutorResult<ExecutionResponse> {
        let login = match group.first() {
            Operation::LoginUser(op) => op,
            other => {
                return Err(ExecutorError::UnexpectedStartingOperation {
                    executor: NAME,
                    kind: other.kind(),
                })
            }
        };
        ensure_supported(NAME, CREATE_USER_OPERATIONS, group)?;
        if let Some(second) = group.iter().skip(1).find(|op| op.kind() == OperationKind::LoginUser) {
            return Err(ExecutorError::MixedOperations {
                first: OperationKind::LoginUser,
                second: second.kind(),
            });
        }
        debug!("{}: executing login group of {}", NAME, group.len());

        match (&login.existing_onesignal_id, &login.external_id) {
            (Some(existing_id), Some(external_id)) => {
                self.login_existing(login, existing_id, external_id, group)
                    .await
            }
            _ => Ok(self.create_user(login, group).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigModel, ConfigModelStore};
    use crate::mock::{BackendCall, BackendMethod, MockBackend};
    use crate::models::{
        IdentityModel, IdentityModelStore, PropertiesModel, PropertiesModelStore,
        SubscriptionModel, SubscriptionModelStore,
    };
    use parking_lot::Mutex;
    use usersync_protocol::{
        CreateSubscription, SetTag, SubscriptionObject, SubscriptionStatus, SubscriptionType,
        TrackSessionStart,
    };

    /// Identity executor stand-in returning a fixed result.
    struct FixedIdentityExecutor {
        result: ExecutionResult,
        seen: Mutex<Vec<Operation>>,
    }

    #[async_trait]
    impl OperationExecutor for FixedIdentityExecutor {
        fn operations(&self) -> &'static [OperationKind] {
            &[OperationKind::SetAlias]
        }

        async fn execute(&self, group: &OperationGroup) -> ExecutorResult<ExecutionResponse> {
            self.seen.lock().extend(group.iter().cloned());
            Ok(ExecutionResponse::new(self.result))
        }
    }

    struct Setup {
        executor: LoginUserOperationExecutor,
        backend: Arc<MockBackend>,
        identity: Arc<FixedIdentityExecutor>,
        context: Arc<ExecutorContext>,
    }

    fn setup(delegate_result: ExecutionResult) -> Setup {
        let config = Arc::new(ConfigModelStore::new(
            ConfigModel::new("app").with_push_subscription_id("local-sub"),
        ));
        let subscriptions = SubscriptionModelStore::new();
        subscriptions.add(
            SubscriptionModel::new(
                "local-sub",
                SubscriptionType::Push,
                "token",
                SubscriptionStatus::Subscribed,
                true,
            ),
            ChangeTag::Normal,
        );
        let context = Arc::new(ExecutorContext::new(
            config,
            Arc::new(IdentityModelStore::new(IdentityModel::with_onesignal_id("local-user"))),
            Arc::new(PropertiesModelStore::new(PropertiesModel::with_onesignal_id(
                "local-user",
            ))),
            Arc::new(subscriptions),
        ));
        let backend = Arc::new(MockBackend::new());
        let identity = Arc::new(FixedIdentityExecutor {
            result: delegate_result,
            seen: Mutex::new(Vec::new()),
        });
        Setup {
            executor: LoginUserOperationExecutor::new(
                identity.clone(),
                backend.clone(),
                context.clone(),
            ),
            backend,
            identity,
            context,
        }
    }

    fn login(external_id: Option<&str>, existing: Option<&str>) -> LoginUser {
        LoginUser::new(
            "app",
            "local-user",
            external_id.map(str::to_string),
            existing.map(str::to_string),
        )
    }

    #[tokio::test]
    async fn login_into_existing_user() {
        let s = setup(ExecutionResult::Success);
        let group = OperationGroup::new(vec![
            login(Some("ext"), Some("u-existing")).into(),
            SetTag::new("app", "local-user", "a", "1").into(),
        ])
        .unwrap();

        let response = s.executor.execute(&group).await.unwrap();

        assert_eq!(response.result, ExecutionResult::SuccessStartingOnly);
        assert_eq!(
            response.id_translations.unwrap().get("local-user").map(String::as_str),
            Some("u-existing")
        );
        assert_eq!(s.backend.call_count(), 0);
        assert_eq!(s.context.identity.onesignal_id().as_deref(), Some("u-existing"));
        assert_eq!(
            s.context.properties.subject_id().as_deref(),
            Some("u-existing")
        );

        let seen = s.identity.seen.lock().clone();
        match &seen[..] {
            [Operation::SetAlias(op)] => {
                assert_eq!(op.onesignal_id, "u-existing");
                assert_eq!(op.label, "external_id");
                assert_eq!(op.value, "ext");
            }
            other => panic!("unexpected delegation {:?}", other),
        }
    }

    #[tokio::test]
    async fn delegate_no_retry_falls_back_to_create() {
        let s = setup(ExecutionResult::FailNoRetry);
        let response = s
            .executor
            .execute(&OperationGroup::single(login(Some("ext"), Some("u-existing"))))
            .await
            .unwrap();

        assert_eq!(response.result, ExecutionResult::Success);
        let calls = s.backend.calls_to(BackendMethod::CreateUser);
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            BackendCall::CreateUser { identities, .. } => {
                assert_eq!(identities.get("external_id").map(String::as_str), Some("ext"));
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn delegate_conflict_is_propagated() {
        let s = setup(ExecutionResult::FailConflict);
        let response = s
            .executor
            .execute(&OperationGroup::single(login(Some("ext"), Some("u-existing"))))
            .await
            .unwrap();

        assert_eq!(response.result, ExecutionResult::FailConflict);
        assert_eq!(s.backend.call_count(), 0);
    }

    #[tokio::test]
    async fn create_user_folds_the_group() {
        let s = setup(ExecutionResult::Success);
        s.backend.push_user_response(UserResponse {
            identities: [
                ("onesignal_id".to_string(), "u-remote".to_string()),
            ]
            .into_iter()
            .collect(),
            subscriptions: vec![SubscriptionObject {
                id: Some("sub-remote".into()),
                ..SubscriptionObject::new(
                    SubscriptionType::Push,
                    "token",
                    true,
                    SubscriptionStatus::Subscribed,
                )
            }],
            ..Default::default()
        });
        let group = OperationGroup::new(vec![
            login(None, None).into(),
            SetTag::new("app", "local-user", "a", "1").into(),
            CreateSubscription::new(
                "app",
                "local-user",
                "local-sub",
                SubscriptionType::Push,
                true,
                "token",
                SubscriptionStatus::Subscribed,
            )
            .into(),
        ])
        .unwrap();

        let response = s.executor.execute(&group).await.unwrap();

        assert_eq!(response.result, ExecutionResult::Success);
        assert_eq!(response.operations, None);
        let translations = response.id_translations.unwrap();
        assert_eq!(translations.get("local-user").map(String::as_str), Some("u-remote"));
        assert_eq!(translations.get("local-sub").map(String::as_str), Some("sub-remote"));

        assert_eq!(s.context.identity.onesignal_id().as_deref(), Some("u-remote"));
        assert!(s.context.subscriptions.get("sub-remote").is_some());
        assert_eq!(
            s.context.config.push_subscription_id().as_deref(),
            Some("sub-remote")
        );
        assert!(s.context.new_records.is_in_missing_retry_window("u-remote"));

        match &s.backend.calls()[0] {
            BackendCall::CreateUser {
                identities,
                subscriptions,
                properties,
                ..
            } => {
                assert!(identities.is_empty());
                assert_eq!(subscriptions.len(), 1);
                assert!(properties.tags.is_some());
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    fn created(id: &str) -> SubscriptionObject {
        SubscriptionObject {
            id: Some(id.into()),
            ..SubscriptionObject::new(
                SubscriptionType::Email,
                "a@example.com",
                true,
                SubscriptionStatus::Subscribed,
            )
        }
    }

    fn create_email(id: &str) -> Operation {
        CreateSubscription::new(
            "app",
            "local-user",
            id,
            SubscriptionType::Email,
            true,
            "a@example.com",
            SubscriptionStatus::Subscribed,
        )
        .into()
    }

    fn remote_user(subscriptions: Vec<SubscriptionObject>) -> UserResponse {
        UserResponse {
            identities: [("onesignal_id".to_string(), "u-remote".to_string())]
                .into_iter()
                .collect(),
            subscriptions,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn fewer_returned_subscriptions_hydrate_by_position() {
        let s = setup(ExecutionResult::Success);
        s.context.subscriptions.add(
            SubscriptionModel::new(
                "local-email",
                SubscriptionType::Email,
                "a@example.com",
                SubscriptionStatus::Subscribed,
                true,
            ),
            ChangeTag::Normal,
        );
        s.backend.push_user_response(remote_user(vec![created("sub-remote")]));
        let group = OperationGroup::new(vec![
            login(None, None).into(),
            create_email("local-sub"),
            create_email("local-email"),
        ])
        .unwrap();

        let response = s.executor.execute(&group).await.unwrap();

        assert_eq!(response.result, ExecutionResult::Success);
        let translations = response.id_translations.unwrap();
        assert_eq!(translations.len(), 2);
        assert_eq!(translations.get("local-sub").map(String::as_str), Some("sub-remote"));
        assert!(!translations.contains_key("local-email"));
        assert!(s.context.subscriptions.get("sub-remote").is_some());
        assert!(s.context.subscriptions.get("local-email").is_some());
    }

    #[tokio::test]
    async fn extra_returned_subscriptions_are_ignored() {
        let s = setup(ExecutionResult::Success);
        s.backend.push_user_response(remote_user(vec![
            created("sub-remote"),
            created("sub-extra"),
        ]));
        let group =
            OperationGroup::new(vec![login(None, None).into(), create_email("local-sub")]).unwrap();

        let response = s.executor.execute(&group).await.unwrap();

        assert_eq!(response.result, ExecutionResult::Success);
        let translations = response.id_translations.unwrap();
        assert_eq!(translations.len(), 2);
        assert!(!translations.values().any(|id| id == "sub-extra"));
        assert!(s.context.subscriptions.get("sub-extra").is_none());
        assert!(!s.context.new_records.is_in_missing_retry_window("sub-extra"));
        assert_eq!(s.context.subscriptions.list().len(), 1);
    }

    #[tokio::test]
    async fn switched_user_is_not_hydrated() {
        let s = setup(ExecutionResult::Success);
        s.context
            .identity
            .replace(IdentityModel::with_onesignal_id("other-user"), ChangeTag::Normal);
        s.context.properties.replace(
            PropertiesModel::with_onesignal_id("other-user"),
            ChangeTag::Normal,
        );
        s.backend.push_user_response(remote_user(Vec::new()));

        let response = s
            .executor
            .execute(&OperationGroup::single(login(None, None)))
            .await
            .unwrap();

        assert_eq!(response.result, ExecutionResult::Success);
        assert_eq!(
            response.id_translations.unwrap().get("local-user").map(String::as_str),
            Some("u-remote")
        );
        assert_eq!(s.context.identity.onesignal_id().as_deref(), Some("other-user"));
        assert_eq!(
            s.context.properties.subject_id().as_deref(),
            Some("other-user")
        );
    }

    #[tokio::test]
    async fn create_with_identities_refreshes_the_user() {
        let s = setup(ExecutionResult::Success);
        let response = s
            .executor
            .execute(&OperationGroup::single(login(Some("ext"), None)))
            .await
            .unwrap();

        let operations = response.operations.unwrap();
        assert_eq!(operations.len(), 1);
        assert_eq!(operations[0].kind(), OperationKind::RefreshUser);
    }

    #[tokio::test]
    async fn create_user_failure_mapping() {
        let cases = [
            (503, ExecutionResult::FailRetry),
            (403, ExecutionResult::FailUnauthorized),
            (400, ExecutionResult::FailNoRetry),
            (404, ExecutionResult::FailNoRetry),
            (409, ExecutionResult::FailNoRetry),
        ];
        for (status, expected) in cases {
            let s = setup(ExecutionResult::Success);
            s.backend
                .fail_next(BackendMethod::CreateUser, BackendError::new(status, "error"));
            let response = s
                .executor
                .execute(&OperationGroup::single(login(None, None)))
                .await
                .unwrap();
            assert_eq!(response.result, expected, "status {}", status);
        }
    }

    #[tokio::test]
    async fn group_must_start_with_login() {
        let s = setup(ExecutionResult::Success);
        let err = s
            .executor
            .execute(&OperationGroup::single(SetTag::new("app", "u1", "a", "1")))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::UnexpectedStartingOperation { .. }));
    }

    #[tokio::test]
    async fn unsupported_follow_up_is_rejected() {
        let s = setup(ExecutionResult::Success);
        let group = OperationGroup::new(vec![
            login(None, None).into(),
            TrackSessionStart::new("app", "local-user").into(),
        ])
        .unwrap();

        let err = s.executor.execute(&group).await.unwrap_err();
        assert!(matches!(err, ExecutorError::UnsupportedOperation { .. }));
        assert_eq!(s.backend.call_count(), 0);
    }
}
