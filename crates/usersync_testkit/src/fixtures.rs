//! Operation builders and an executor harness.
//!
//! Every builder uses [`APP_ID`]; the harness runs groups against a
//! [`MockBackend`] with a manual clock, so tests can script backend
//! failures and move time across the missing-retry window.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};
use usersync_engine::models::{
    ChangeLog, ChangeTag, IdentityModel, IdentityModelStore, PropertiesModel,
    PropertiesModelStore, SubscriptionModel, SubscriptionModelStore,
};
use usersync_engine::{
    ConfigModel, ConfigModelStore, CustomEventOperationExecutor, DeviceInfo, ExecutorContext,
    IdentityOperationExecutor, LoginUserFromSubscriptionOperationExecutor,
    LoginUserOperationExecutor, ManualClock, MemoryConsistencyManager, MockBackend,
    NewRecordsState, OperationExecutor, OperationGroup, RefreshUserOperationExecutor,
    SubscriptionOperationExecutor, UpdateUserOperationExecutor,
};
use usersync_protocol::{
    CreateSubscription, DeleteSubscription, ExecutionResponse, LoginUser, Operation, SetAlias,
    SetTag, SubscriptionObject, SubscriptionStatus, SubscriptionType, TrackSessionEnd,
    UpdateSubscription, UserProperties, UserResponse,
};

/// Application id used by every fixture.
pub const APP_ID: &str = "test-app";

/// A backend-issued user id.
pub const USER_ID: &str = "user-1";

/// Installs a test-friendly tracing subscriber; `RUST_LOG` overrides the
/// default filter. Safe to call more than once.
pub fn init_tracing() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("usersync_engine=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// `SetTag` on `user`.
pub fn set_tag(user: &str, key: &str, value: &str) -> Operation {
    SetTag::new(APP_ID, user, key, value).into()
}

/// `SetAlias` on `user`.
pub fn set_alias(user: &str, label: &str, value: &str) -> Operation {
    SetAlias::new(APP_ID, user, label, value).into()
}

/// `TrackSessionEnd` on `user`.
pub fn session_end(user: &str, seconds: u64) -> Operation {
    TrackSessionEnd::new(APP_ID, user, seconds).into()
}

/// `LoginUser` for the local user `user`.
pub fn login(user: &str, external_id: Option<&str>, existing: Option<&str>) -> Operation {
    LoginUser::new(
        APP_ID,
        user,
        external_id.map(str::to_string),
        existing.map(str::to_string),
    )
    .into()
}

/// `CreateSubscription` of an email subscription.
pub fn create_email(user: &str, subscription: &str, address: &str) -> Operation {
    CreateSubscription::new(
        APP_ID,
        user,
        subscription,
        SubscriptionType::Email,
        true,
        address,
        SubscriptionStatus::Subscribed,
    )
    .into()
}

/// `UpdateSubscription` of an email subscription.
pub fn update_email(user: &str, subscription: &str, address: &str) -> Operation {
    UpdateSubscription::new(
        APP_ID,
        user,
        subscription,
        SubscriptionType::Email,
        true,
        address,
        SubscriptionStatus::Subscribed,
    )
    .into()
}

/// `DeleteSubscription`.
pub fn delete_subscription(user: &str, subscription: &str) -> Operation {
    DeleteSubscription::new(APP_ID, user, subscription).into()
}

/// An email subscription model.
pub fn email_model(id: &str, address: &str) -> SubscriptionModel {
    SubscriptionModel::new(
        id,
        SubscriptionType::Email,
        address,
        SubscriptionStatus::Subscribed,
        true,
    )
}

/// A backend user with `onesignal_id` and the given subscriptions.
pub fn remote_user(onesignal_id: &str, subscriptions: Vec<SubscriptionObject>) -> UserResponse {
    let mut identities = BTreeMap::new();
    identities.insert("onesignal_id".to_string(), onesignal_id.to_string());
    UserResponse {
        identities,
        properties: UserProperties::default(),
        subscriptions,
    }
}

/// A backend subscription with an id.
pub fn remote_subscription(id: &str, subscription_type: SubscriptionType) -> SubscriptionObject {
    SubscriptionObject {
        id: Some(id.to_string()),
        ..SubscriptionObject::new(
            subscription_type,
            "address",
            true,
            SubscriptionStatus::Subscribed,
        )
    }
}

/// Fixed device description.
#[derive(Debug, Clone, Default)]
pub struct FixedDeviceInfo;

impl DeviceInfo for FixedDeviceInfo {
    fn device_type(&self) -> String {
        "android".to_string()
    }

    fn sdk_version(&self) -> String {
        "050100".to_string()
    }

    fn app_version(&self) -> Option<String> {
        Some("1.0.0".to_string())
    }

    fn device_model(&self) -> String {
        "Test Device".to_string()
    }

    fn device_os(&self) -> String {
        "14".to_string()
    }
}

/// Model stores, a scripted backend and every executor, wired together.
pub struct Harness {
    /// Scripted backend.
    pub backend: Arc<MockBackend>,
    /// Clock behind the new-records state.
    pub clock: Arc<ManualClock>,
    /// Consistency manager.
    pub consistency: Arc<MemoryConsistencyManager>,
    /// Every change made to the model stores.
    pub changes: Arc<ChangeLog>,
    /// Shared executor context.
    pub context: Arc<ExecutorContext>,
    executors: Vec<Arc<dyn OperationExecutor>>,
}

impl Harness {
    /// Creates a harness whose current user is `onesignal_id`.
    pub fn new(onesignal_id: &str) -> Self {
        Self::with_config(ConfigModel::new(APP_ID), onesignal_id)
    }

    /// Creates a harness with `config`.
    pub fn with_config(config: ConfigModel, onesignal_id: &str) -> Self {
        let config = Arc::new(ConfigModelStore::new(config));
        let identity = Arc::new(IdentityModelStore::new(IdentityModel::with_onesignal_id(
            onesignal_id,
        )));
        let properties = Arc::new(PropertiesModelStore::new(
            PropertiesModel::with_onesignal_id(onesignal_id),
        ));
        let subscriptions = Arc::new(SubscriptionModelStore::new());

        let changes = Arc::new(ChangeLog::new());
        identity.subscribe(changes.clone());
        properties.subscribe(changes.clone());
        subscriptions.subscribe(changes.clone());

        let clock = Arc::new(ManualClock::new(1_000_000));
        let consistency = Arc::new(MemoryConsistencyManager::new());
        let context = Arc::new(
            ExecutorContext::new(config.clone(), identity, properties, subscriptions)
                .with_new_records(Arc::new(NewRecordsState::with_clock(config, clock.clone())))
                .with_consistency_manager(consistency.clone()),
        );

        let backend = Arc::new(MockBackend::new());
        let identity_executor: Arc<dyn OperationExecutor> = Arc::new(
            IdentityOperationExecutor::new(backend.clone(), context.clone()),
        );
        let executors: Vec<Arc<dyn OperationExecutor>> = vec![
            identity_executor.clone(),
            Arc::new(LoginUserOperationExecutor::new(
                identity_executor,
                backend.clone(),
                context.clone(),
            )),
            Arc::new(LoginUserFromSubscriptionOperationExecutor::new(
                backend.clone(),
                context.clone(),
            )),
            Arc::new(SubscriptionOperationExecutor::new(
                backend.clone(),
                context.clone(),
            )),
            Arc::new(UpdateUserOperationExecutor::new(
                backend.clone(),
                context.clone(),
            )),
            Arc::new(RefreshUserOperationExecutor::new(
                backend.clone(),
                context.clone(),
            )),
            Arc::new(CustomEventOperationExecutor::new(
                backend.clone(),
                &FixedDeviceInfo,
            )),
        ];

        Self {
            backend,
            clock,
            consistency,
            changes,
            context,
            executors,
        }
    }

    /// Adds a subscription model as the application would.
    pub fn add_subscription(&self, model: SubscriptionModel) {
        self.context.subscriptions.add(model, ChangeTag::Normal);
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Returns the executor declaring the kind of `operation`.
    ///
    /// # Panics
    /// Panics if no executor handles the kind.
    pub fn executor_for(&self, operation: &Operation) -> Arc<dyn OperationExecutor> {
        let kind = operation.kind();
        self.executors
            .iter()
            .find(|executor| executor.operations().contains(&kind))
            .cloned()
            .unwrap_or_else(|| panic!("no executor for {}", kind))
    }

    /// Executes `operations` as one group with the executor for the first
    /// operation.
    ///
    /// # Panics
    /// Panics if the group is empty or rejected by the executor.
    pub async fn execute(&self, operations: Vec<Operation>) -> ExecutionResponse {
        let group = OperationGroup::new(operations).expect("group must not be empty");
        self.executor_for(group.first())
            .execute(&group)
            .await
            .expect("group rejected by executor")
    }
}
