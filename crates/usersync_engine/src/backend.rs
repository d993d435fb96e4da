//! Backend abstraction.
//!
//! Each trait covers one group of REST endpoints. Implementations own the
//! HTTP client, authentication and serialization; the executors only see
//! typed requests and [`BackendError`]s.

use crate::error::BackendResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use usersync_protocol::{
    EventMetadata, PropertiesDeltasObject, PropertiesObject, RywToken, SubscriptionObject,
    UserResponse,
};

/// Alias endpoints.
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Adds or replaces `identities` on the user, returning the aliases the
    /// backend now holds for them.
    async fn set_alias(
        &self,
        app_id: &str,
        onesignal_id: &str,
        identities: BTreeMap<String, String>,
    ) -> BackendResult<BTreeMap<String, String>>;

    /// Removes alias `label` from the user.
    async fn delete_alias(&self, app_id: &str, onesignal_id: &str, label: &str)
        -> BackendResult<()>;
}

/// User endpoints.
#[async_trait]
pub trait UserBackend: Send + Sync {
    /// Creates a user, or upserts the user one of `identities` already
    /// belongs to.
    ///
    /// The returned subscriptions are positionally aligned with
    /// `subscriptions`.
    async fn create_user(
        &self,
        app_id: &str,
        identities: BTreeMap<String, String>,
        subscriptions: Vec<SubscriptionObject>,
        properties: PropertiesObject,
    ) -> BackendResult<UserResponse>;

    /// Applies properties and deltas to an existing user.
    async fn update_user(
        &self,
        app_id: &str,
        onesignal_id: &str,
        properties: PropertiesObject,
        refresh_device_metadata: bool,
        deltas: PropertiesDeltasObject,
    ) -> BackendResult<Option<RywToken>>;

    /// Reads the full user.
    async fn get_user(&self, app_id: &str, onesignal_id: &str) -> BackendResult<UserResponse>;
}

/// Subscription endpoints.
#[async_trait]
pub trait SubscriptionBackend: Send + Sync {
    /// Creates a subscription on the user, returning its backend id.
    async fn create_subscription(
        &self,
        app_id: &str,
        onesignal_id: &str,
        subscription: SubscriptionObject,
    ) -> BackendResult<(String, Option<RywToken>)>;

    /// Updates an existing subscription.
    async fn update_subscription(
        &self,
        app_id: &str,
        subscription_id: &str,
        subscription: SubscriptionObject,
    ) -> BackendResult<Option<RywToken>>;

    /// Deletes a subscription.
    async fn delete_subscription(&self, app_id: &str, subscription_id: &str)
        -> BackendResult<()>;

    /// Returns the aliases of the user owning `subscription_id`.
    async fn get_identity_from_subscription(
        &self,
        app_id: &str,
        subscription_id: &str,
    ) -> BackendResult<BTreeMap<String, String>>;
}

/// Custom event endpoint.
#[async_trait]
pub trait CustomEventBackend: Send + Sync {
    /// Sends one custom event.
    #[allow(clippy::too_many_arguments)]
    async fn send_custom_event(
        &self,
        app_id: &str,
        onesignal_id: &str,
        external_id: Option<&str>,
        timestamp_millis: u64,
        name: &str,
        properties: Option<&serde_json::Value>,
        metadata: &EventMetadata,
    ) -> BackendResult<()>;
}
