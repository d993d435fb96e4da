//! A scripted in-memory backend for testing.

use crate::backend::{CustomEventBackend, IdentityBackend, SubscriptionBackend, UserBackend};
use crate::error::{BackendError, BackendResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use usersync_protocol::{
    EventMetadata, IdentityConstants, PropertiesDeltasObject, PropertiesObject, RywToken,
    SubscriptionObject, UserResponse,
};

/// Backend endpoint, used to script failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendMethod {
    /// [`IdentityBackend::set_alias`].
    SetAlias,
    /// [`IdentityBackend::delete_alias`].
    DeleteAlias,
    /// [`UserBackend::create_user`].
    CreateUser,
    /// [`UserBackend::update_user`].
    UpdateUser,
    /// [`UserBackend::get_user`].
    GetUser,
    /// [`SubscriptionBackend::create_subscription`].
    CreateSubscription,
    /// [`SubscriptionBackend::update_subscription`].
    UpdateSubscription,
    /// [`SubscriptionBackend::delete_subscription`].
    DeleteSubscription,
    /// [`SubscriptionBackend::get_identity_from_subscription`].
    GetIdentityFromSubscription,
    /// [`CustomEventBackend::send_custom_event`].
    SendCustomEvent,
}

/// A request the mock received.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    /// Alias upsert.
    SetAlias {
        /// Application id.
        app_id: String,
        /// Target user.
        onesignal_id: String,
        /// Aliases sent.
        identities: BTreeMap<String, String>,
    },
    /// Alias removal.
    DeleteAlias {
        /// Application id.
        app_id: String,
        /// Target user.
        onesignal_id: String,
        /// Removed label.
        label: String,
    },
    /// User creation.
    CreateUser {
        /// Application id.
        app_id: String,
        /// Aliases sent.
        identities: BTreeMap<String, String>,
        /// Subscriptions sent, in order.
        subscriptions: Vec<SubscriptionObject>,
        /// Properties sent.
        properties: PropertiesObject,
    },
    /// User update.
    UpdateUser {
        /// Application id.
        app_id: String,
        /// Target user.
        onesignal_id: String,
        /// Properties sent.
        properties: PropertiesObject,
        /// Whether device metadata was refreshed.
        refresh_device_metadata: bool,
        /// Deltas sent.
        deltas: PropertiesDeltasObject,
    },
    /// User read.
    GetUser {
        /// Application id.
        app_id: String,
        /// Target user.
        onesignal_id: String,
    },
    /// Subscription creation.
    CreateSubscription {
        /// Application id.
        app_id: String,
        /// Owning user.
        onesignal_id: String,
        /// Subscription sent.
        subscription: SubscriptionObject,
    },
    /// Subscription update.
    UpdateSubscription {
        /// Application id.
        app_id: String,
        /// Target subscription.
        subscription_id: String,
        /// Subscription sent.
        subscription: SubscriptionObject,
    },
    /// Subscription removal.
    DeleteSubscription {
        /// Application id.
        app_id: String,
        /// Target subscription.
        subscription_id: String,
    },
    /// Identity lookup by subscription.
    GetIdentityFromSubscription {
        /// Application id.
        app_id: String,
        /// Subscription looked up.
        subscription_id: String,
    },
    /// Custom event.
    SendCustomEvent {
        /// Application id.
        app_id: String,
        /// Target user.
        onesignal_id: String,
        /// External id sent.
        external_id: Option<String>,
        /// Event time.
        timestamp_millis: u64,
        /// Event name.
        name: String,
        /// Event payload.
        properties: Option<serde_json::Value>,
        /// Device metadata sent.
        metadata: EventMetadata,
    },
}

impl BackendCall {
    /// Endpoint this call went to.
    pub fn method(&self) -> BackendMethod {
        match self {
            BackendCall::SetAlias { .. } => BackendMethod::SetAlias,
            BackendCall::DeleteAlias { .. } => BackendMethod::DeleteAlias,
            BackendCall::CreateUser { .. } => BackendMethod::CreateUser,
            BackendCall::UpdateUser { .. } => BackendMethod::UpdateUser,
            BackendCall::GetUser { .. } => BackendMethod::GetUser,
            BackendCall::CreateSubscription { .. } => BackendMethod::CreateSubscription,
            BackendCall::UpdateSubscription { .. } => BackendMethod::UpdateSubscription,
            BackendCall::DeleteSubscription { .. } => BackendMethod::DeleteSubscription,
            BackendCall::GetIdentityFromSubscription { .. } => {
                BackendMethod::GetIdentityFromSubscription
            }
            BackendCall::SendCustomEvent { .. } => BackendMethod::SendCustomEvent,
        }
    }
}

/// A backend that records every call and answers from a script.
///
/// Writes succeed by default: created users and subscriptions get
/// sequential `remote-user-N` / `remote-sub-N` ids. Reads (`get_user`,
/// `get_identity_from_subscription`) fail with a 500 unless a response was
/// scripted. A scripted failure for an endpoint takes precedence over a
/// scripted success.
#[derive(Debug, Default)]
pub struct MockBackend {
    calls: Mutex<Vec<BackendCall>>,
    failures: Mutex<HashMap<BackendMethod, VecDeque<BackendError>>>,
    users: Mutex<VecDeque<UserResponse>>,
    identities: Mutex<VecDeque<BTreeMap<String, String>>>,
    created_subscriptions: Mutex<VecDeque<(String, Option<RywToken>)>>,
    ryw_tokens: Mutex<VecDeque<RywToken>>,
    next_id: Mutex<u64>,
}

impl MockBackend {
    /// Creates a new mock backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call to `method` fail with `error`.
    pub fn fail_next(&self, method: BackendMethod, error: BackendError) {
        self.failures
            .lock()
            .entry(method)
            .or_default()
            .push_back(error);
    }

    /// Queues a response for `create_user` or `get_user`.
    pub fn push_user_response(&self, response: UserResponse) {
        self.users.lock().push_back(response);
    }

    /// Queues a response for `get_identity_from_subscription`.
    pub fn push_identity_response(&self, identities: BTreeMap<String, String>) {
        self.identities.lock().push_back(identities);
    }

    /// Queues a response for `create_subscription`.
    pub fn push_created_subscription(&self, id: impl Into<String>, token: Option<RywToken>) {
        self.created_subscriptions
            .lock()
            .push_back((id.into(), token));
    }

    /// Queues a read-your-write token for the next `update_user` or
    /// `update_subscription`.
    pub fn push_ryw_token(&self, token: RywToken) {
        self.ryw_tokens.lock().push_back(token);
    }

    /// Returns every call received so far.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    /// Returns the calls made to `method`.
    pub fn calls_to(&self, method: BackendMethod) -> Vec<BackendCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.method() == method)
            .cloned()
            .collect()
    }

    /// Returns the number of calls received so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn record(&self, call: BackendCall) -> BackendResult<()> {
        let method = call.method();
        self.calls.lock().push(call);
        match self
            .failures
            .lock()
            .get_mut(&method)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn generate_id(&self, prefix: &str) -> String {
        let mut next = self.next_id.lock();
        *next += 1;
        format!("{}-{}", prefix, *next)
    }
}

#[async_trait]
impl IdentityBackend for MockBackend {
    async fn set_alias(
        &self,
        app_id: &str,
        onesignal_id: &str,
        identities: BTreeMap<String, String>,
    ) -> BackendResult<BTreeMap<String, String>> {
        self.record(BackendCall::SetAlias {
            app_id: app_id.to_string(),
            onesignal_id: onesignal_id.to_string(),
            identities: identities.clone(),
        })?;
        Ok(identities)
    }

    async fn delete_alias(
        &self,
        app_id: &str,
        onesignal_id: &str,
        label: &str,
    ) -> BackendResult<()> {
        self.record(BackendCall::DeleteAlias {
            app_id: app_id.to_string(),
            onesignal_id: onesignal_id.to_string(),
            label: label.to_string(),
        })
    }
}

#[async_trait]
impl UserBackend for MockBackend {
    async fn create_user(
        &self,
        app_id: &str,
        identities: BTreeMap<String, String>,
        subscriptions: Vec<SubscriptionObject>,
        properties: PropertiesObject,
    ) -> BackendResult<UserResponse> {
        self.record(BackendCall::CreateUser {
            app_id: app_id.to_string(),
            identities: identities.clone(),
            subscriptions: subscriptions.clone(),
            properties,
        })?;
        if let Some(response) = self.users.lock().pop_front() {
            return Ok(response);
        }

        let mut response = UserResponse {
            identities,
            ..Default::default()
        };
        response.identities.insert(
            IdentityConstants::ONESIGNAL_ID.to_string(),
            self.generate_id("remote-user"),
        );
        response.subscriptions = subscriptions
            .into_iter()
            .map(|mut subscription| {
                subscription.id = Some(self.generate_id("remote-sub"));
                subscription
            })
            .collect();
        Ok(response)
    }

    async fn update_user(
        &self,
        app_id: &str,
        onesignal_id: &str,
        properties: PropertiesObject,
        refresh_device_metadata: bool,
        deltas: PropertiesDeltasObject,
    ) -> BackendResult<Option<RywToken>> {
        self.record(BackendCall::UpdateUser {
            app_id: app_id.to_string(),
            onesignal_id: onesignal_id.to_string(),
            properties,
            refresh_device_metadata,
            deltas,
        })?;
        Ok(self.ryw_tokens.lock().pop_front())
    }

    async fn get_user(&self, app_id: &str, onesignal_id: &str) -> BackendResult<UserResponse> {
        self.record(BackendCall::GetUser {
            app_id: app_id.to_string(),
            onesignal_id: onesignal_id.to_string(),
        })?;
        self.users
            .lock()
            .pop_front()
            .ok_or_else(|| BackendError::new(500, "no mock user response set"))
    }
}

#[async_trait]
impl SubscriptionBackend for MockBackend {
    async fn create_subscription(
        &self,
        app_id: &str,
        onesignal_id: &str,
        subscription: SubscriptionObject,
    ) -> BackendResult<(String, Option<RywToken>)> {
        self.record(BackendCall::CreateSubscription {
            app_id: app_id.to_string(),
            onesignal_id: onesignal_id.to_string(),
            subscription,
        })?;
        if let Some(created) = self.created_subscriptions.lock().pop_front() {
            return Ok(created);
        }
        Ok((self.generate_id("remote-sub"), None))
    }

    async fn update_subscription(
        &self,
        app_id: &str,
        subscription_id: &str,
        subscription: SubscriptionObject,
    ) -> BackendResult<Option<RywToken>> {
        self.record(BackendCall::UpdateSubscription {
            app_id: app_id.to_string(),
            subscription_id: subscription_id.to_string(),
            subscription,
        })?;
        Ok(self.ryw_tokens.lock().pop_front())
    }

    async fn delete_subscription(
        &self,
        app_id: &str,
        subscription_id: &str,
    ) -> BackendResult<()> {
        self.record(BackendCall::DeleteSubscription {
            app_id: app_id.to_string(),
            subscription_id: subscription_id.to_string(),
        })
    }

    async fn get_identity_from_subscription(
        &self,
        app_id: &str,
        subscription_id: &str,
    ) -> BackendResult<BTreeMap<String, String>> {
        self.record(BackendCall::GetIdentityFromSubscription {
            app_id: app_id.to_string(),
            subscription_id: subscription_id.to_string(),
        })?;
        self.identities
            .lock()
            .pop_front()
            .ok_or_else(|| BackendError::new(500, "no mock identity response set"))
    }
}

#[async_trait]
impl CustomEventBackend for MockBackend {
    async fn send_custom_event(
        &self,
        app_id: &str,
        onesignal_id: &str,
        external_id: Option<&str>,
        timestamp_millis: u64,
        name: &str,
        properties: Option<&serde_json::Value>,
        metadata: &EventMetadata,
    ) -> BackendResult<()> {
        self.record(BackendCall::SendCustomEvent {
            app_id: app_id.to_string(),
            onesignal_id: onesignal_id.to_string(),
            external_id: external_id.map(str::to_string),
            timestamp_millis,
            name: name.to_string(),
            properties: properties.cloned(),
            metadata: metadata.clone(),
        })
    }
}
