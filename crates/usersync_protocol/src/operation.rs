//! Queued local mutations.
//!
//! Every change a user makes to their identity, properties, tags,
//! subscriptions or telemetry becomes one [`Operation`]. The dispatcher groups
//! operations using the comparison keys defined here and hands each group to
//! the executor registered for its [`OperationKind`].

use crate::ids::is_local_id;
use crate::subscription::{SubscriptionStatus, SubscriptionType};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Executor-selection tag of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Add or replace one alias.
    SetAlias,
    /// Remove one alias.
    DeleteAlias,
    /// Create or claim the remote user for a login.
    LoginUser,
    /// Adopt the remote user that owns a subscription.
    LoginUserFromSubscription,
    /// Pull the full remote user.
    RefreshUser,
    /// Create a subscription.
    CreateSubscription,
    /// Update a subscription.
    UpdateSubscription,
    /// Delete a subscription.
    DeleteSubscription,
    /// Add or replace one tag.
    SetTag,
    /// Remove one tag.
    DeleteTag,
    /// Set one user property.
    SetProperty,
    /// Record a session start.
    TrackSessionStart,
    /// Record a session end with its duration.
    TrackSessionEnd,
    /// Record a purchase.
    TrackPurchase,
    /// Record a custom event.
    TrackEvent,
}

impl OperationKind {
    /// Every kind, in declaration order.
    pub const ALL: [OperationKind; 15] = [
        OperationKind::SetAlias,
        OperationKind::DeleteAlias,
        OperationKind::LoginUser,
        OperationKind::LoginUserFromSubscription,
        OperationKind::RefreshUser,
        OperationKind::CreateSubscription,
        OperationKind::UpdateSubscription,
        OperationKind::DeleteSubscription,
        OperationKind::SetTag,
        OperationKind::DeleteTag,
        OperationKind::SetProperty,
        OperationKind::TrackSessionStart,
        OperationKind::TrackSessionEnd,
        OperationKind::TrackPurchase,
        OperationKind::TrackEvent,
    ];

    /// Stable name used when operations are logged or persisted.
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::SetAlias => "set-alias",
            OperationKind::DeleteAlias => "delete-alias",
            OperationKind::LoginUser => "login-user",
            OperationKind::LoginUserFromSubscription => "login-user-from-subscription-id",
            OperationKind::RefreshUser => "refresh-user",
            OperationKind::CreateSubscription => "create-subscription",
            OperationKind::UpdateSubscription => "update-subscription",
            OperationKind::DeleteSubscription => "delete-subscription",
            OperationKind::SetTag => "set-tag",
            OperationKind::DeleteTag => "delete-tag",
            OperationKind::SetProperty => "set-property",
            OperationKind::TrackSessionStart => "track-session-start",
            OperationKind::TrackSessionEnd => "track-session-end",
            OperationKind::TrackPurchase => "track-purchase",
            OperationKind::TrackEvent => "custom-event",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when parsing an unknown operation name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown operation kind: {0}")]
pub struct UnknownOperationKind(pub String);

impl FromStr for OperationKind {
    type Err = UnknownOperationKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| UnknownOperationKind(s.to_string()))
    }
}

/// How the dispatcher batches an operation with its neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupComparisonType {
    /// Group with every later operation whose create key matches.
    Create,
    /// Group with every operation whose modify key matches.
    Alter,
    /// Never grouped.
    None,
}

/// A user property that can be set through [`SetProperty`].
///
/// `None` clears the property.
#[derive(Debug, Clone, PartialEq)]
pub enum UserProperty {
    /// ISO 639-1 language code.
    Language(Option<String>),
    /// IANA timezone id.
    Timezone(Option<String>),
    /// ISO 3166-1 country code.
    Country(Option<String>),
    /// Last known latitude.
    LocationLatitude(Option<f64>),
    /// Last known longitude.
    LocationLongitude(Option<f64>),
}

impl UserProperty {
    /// Name of the property; two values with the same key replace each other.
    pub fn key(&self) -> &'static str {
        match self {
            UserProperty::Language(_) => "language",
            UserProperty::Timezone(_) => "timezone_id",
            UserProperty::Country(_) => "country",
            UserProperty::LocationLatitude(_) => "lat",
            UserProperty::LocationLongitude(_) => "long",
        }
    }

    /// Returns true if this value clears the property.
    pub fn is_clear(&self) -> bool {
        match self {
            UserProperty::Language(v) | UserProperty::Timezone(v) | UserProperty::Country(v) => {
                v.is_none()
            }
            UserProperty::LocationLatitude(v) | UserProperty::LocationLongitude(v) => v.is_none(),
        }
    }
}

/// One line item of a purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseInfo {
    /// Store product id.
    pub sku: String,
    /// ISO 4217 currency code.
    pub iso: String,
    /// Price paid.
    pub amount: f64,
}

impl PurchaseInfo {
    /// Creates a purchase line item.
    pub fn new(sku: impl Into<String>, iso: impl Into<String>, amount: f64) -> Self {
        Self {
            sku: sku.into(),
            iso: iso.into(),
            amount,
        }
    }
}

/// Adds or replaces the alias `label` on a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetAlias {
    /// Application id.
    pub app_id: String,
    /// User the alias belongs to.
    pub onesignal_id: String,
    /// Alias label.
    pub label: String,
    /// Alias value.
    pub value: String,
}

impl SetAlias {
    /// Creates the operation.
    pub fn new(
        app_id: impl Into<String>,
        onesignal_id: impl Into<String>,
        label: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            onesignal_id: onesignal_id.into(),
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Removes the alias `label` from a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteAlias {
    /// Application id.
    pub app_id: String,
    /// User the alias belongs to.
    pub onesignal_id: String,
    /// Alias label.
    pub label: String,
}

impl DeleteAlias {
    /// Creates the operation.
    pub fn new(
        app_id: impl Into<String>,
        onesignal_id: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            onesignal_id: onesignal_id.into(),
            label: label.into(),
        }
    }
}

/// Logs a user in.
///
/// `onesignal_id` is the local id of the user being logged in. When
/// `existing_onesignal_id` and `external_id` are both present the executor
/// first tries to attach the external id to that existing remote user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginUser {
    /// Application id.
    pub app_id: String,
    /// Local id of the user being logged in.
    pub onesignal_id: String,
    /// The application's id for the user.
    pub external_id: Option<String>,
    /// Remote user the device was using before the login.
    pub existing_onesignal_id: Option<String>,
}

impl LoginUser {
    /// Creates the operation.
    pub fn new(
        app_id: impl Into<String>,
        onesignal_id: impl Into<String>,
        external_id: Option<String>,
        existing_onesignal_id: Option<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            onesignal_id: onesignal_id.into(),
            external_id,
            existing_onesignal_id,
        }
    }
}

/// Adopts the remote user that owns `subscription_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginUserFromSubscription {
    /// Application id.
    pub app_id: String,
    /// Local id of the user being logged in.
    pub onesignal_id: String,
    /// Subscription whose owner is looked up.
    pub subscription_id: String,
}

impl LoginUserFromSubscription {
    /// Creates the operation.
    pub fn new(
        app_id: impl Into<String>,
        onesignal_id: impl Into<String>,
        subscription_id: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            onesignal_id: onesignal_id.into(),
            subscription_id: subscription_id.into(),
        }
    }
}

/// Pulls the full remote state of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshUser {
    /// Application id.
    pub app_id: String,
    /// User to refresh.
    pub onesignal_id: String,
}

impl RefreshUser {
    /// Creates the operation.
    pub fn new(app_id: impl Into<String>, onesignal_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            onesignal_id: onesignal_id.into(),
        }
    }
}

/// Creates a subscription on a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSubscription {
    /// Application id.
    pub app_id: String,
    /// Owning user.
    pub onesignal_id: String,
    /// Local id of the subscription.
    pub subscription_id: String,
    /// Delivery channel.
    pub subscription_type: SubscriptionType,
    /// Whether delivery is enabled.
    pub enabled: bool,
    /// Push token, email address or phone number.
    pub address: String,
    /// Delivery status.
    pub status: SubscriptionStatus,
}

impl CreateSubscription {
    /// Creates the operation.
    pub fn new(
        app_id: impl Into<String>,
        onesignal_id: impl Into<String>,
        subscription_id: impl Into<String>,
        subscription_type: SubscriptionType,
        enabled: bool,
        address: impl Into<String>,
        status: SubscriptionStatus,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            onesignal_id: onesignal_id.into(),
            subscription_id: subscription_id.into(),
            subscription_type,
            enabled,
            address: address.into(),
            status,
        }
    }
}

/// Updates a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSubscription {
    /// Application id.
    pub app_id: String,
    /// Owning user.
    pub onesignal_id: String,
    /// Subscription to update.
    pub subscription_id: String,
    /// Delivery channel.
    pub subscription_type: SubscriptionType,
    /// Whether delivery is enabled.
    pub enabled: bool,
    /// Push token, email address or phone number.
    pub address: String,
    /// Delivery status.
    pub status: SubscriptionStatus,
}

impl UpdateSubscription {
    /// Creates the operation.
    pub fn new(
        app_id: impl Into<String>,
        onesignal_id: impl Into<String>,
        subscription_id: impl Into<String>,
        subscription_type: SubscriptionType,
        enabled: bool,
        address: impl Into<String>,
        status: SubscriptionStatus,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            onesignal_id: onesignal_id.into(),
            subscription_id: subscription_id.into(),
            subscription_type,
            enabled,
            address: address.into(),
            status,
        }
    }
}

/// Deletes a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteSubscription {
    /// Application id.
    pub app_id: String,
    /// Owning user.
    pub onesignal_id: String,
    /// Subscription to delete.
    pub subscription_id: String,
}

impl DeleteSubscription {
    /// Creates the operation.
    pub fn new(
        app_id: impl Into<String>,
        onesignal_id: impl Into<String>,
        subscription_id: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            onesignal_id: onesignal_id.into(),
            subscription_id: subscription_id.into(),
        }
    }
}

/// Adds or replaces a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetTag {
    /// Application id.
    pub app_id: String,
    /// Tagged user.
    pub onesignal_id: String,
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

impl SetTag {
    /// Creates the operation.
    pub fn new(
        app_id: impl Into<String>,
        onesignal_id: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            onesignal_id: onesignal_id.into(),
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Removes a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteTag {
    /// Application id.
    pub app_id: String,
    /// Tagged user.
    pub onesignal_id: String,
    /// Tag key.
    pub key: String,
}

impl DeleteTag {
    /// Creates the operation.
    pub fn new(
        app_id: impl Into<String>,
        onesignal_id: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            onesignal_id: onesignal_id.into(),
            key: key.into(),
        }
    }
}

/// Sets a user property.
#[derive(Debug, Clone, PartialEq)]
pub struct SetProperty {
    /// Application id.
    pub app_id: String,
    /// Target user.
    pub onesignal_id: String,
    /// Property and its new value.
    pub property: UserProperty,
}

impl SetProperty {
    /// Creates the operation.
    pub fn new(
        app_id: impl Into<String>,
        onesignal_id: impl Into<String>,
        property: UserProperty,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            onesignal_id: onesignal_id.into(),
            property,
        }
    }
}

/// Records that a session started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSessionStart {
    /// Application id.
    pub app_id: String,
    /// Target user.
    pub onesignal_id: String,
}

impl TrackSessionStart {
    /// Creates the operation.
    pub fn new(app_id: impl Into<String>, onesignal_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            onesignal_id: onesignal_id.into(),
        }
    }
}

/// Records that a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSessionEnd {
    /// Application id.
    pub app_id: String,
    /// Target user.
    pub onesignal_id: String,
    /// Duration of the session in seconds.
    pub session_time: u64,
}

impl TrackSessionEnd {
    /// Creates the operation.
    pub fn new(
        app_id: impl Into<String>,
        onesignal_id: impl Into<String>,
        session_time: u64,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            onesignal_id: onesignal_id.into(),
            session_time,
        }
    }
}

/// Records a purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackPurchase {
    /// Application id.
    pub app_id: String,
    /// Target user.
    pub onesignal_id: String,
    /// Whether purchases seen for the first time count as existing ones.
    pub treat_new_as_existing: bool,
    /// Total spent in this purchase.
    pub amount_spent: f64,
    /// Line items.
    pub purchases: Vec<PurchaseInfo>,
}

impl TrackPurchase {
    /// Creates the operation.
    pub fn new(
        app_id: impl Into<String>,
        onesignal_id: impl Into<String>,
        treat_new_as_existing: bool,
        amount_spent: f64,
        purchases: Vec<PurchaseInfo>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            onesignal_id: onesignal_id.into(),
            treat_new_as_existing,
            amount_spent,
            purchases,
        }
    }
}

/// Records a custom event.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackEvent {
    /// Application id.
    pub app_id: String,
    /// User the event is attributed to.
    pub onesignal_id: String,
    /// The application's id for the user, if known.
    pub external_id: Option<String>,
    /// When the event happened, in milliseconds since the epoch.
    pub timestamp_millis: u64,
    /// Event name.
    pub name: String,
    /// Free-form event properties.
    pub properties: Option<serde_json::Value>,
}

impl TrackEvent {
    /// Creates the operation.
    pub fn new(
        app_id: impl Into<String>,
        onesignal_id: impl Into<String>,
        external_id: Option<String>,
        timestamp_millis: u64,
        name: impl Into<String>,
        properties: Option<serde_json::Value>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            onesignal_id: onesignal_id.into(),
            external_id,
            timestamp_millis,
            name: name.into(),
            properties,
        }
    }
}

/// A queued local mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// See [`SetAlias`].
    SetAlias(SetAlias),
    /// See [`DeleteAlias`].
    DeleteAlias(DeleteAlias),
    /// See [`LoginUser`].
    LoginUser(LoginUser),
    /// See [`LoginUserFromSubscription`].
    LoginUserFromSubscription(LoginUserFromSubscription),
    /// See [`RefreshUser`].
    RefreshUser(RefreshUser),
    /// See [`CreateSubscription`].
    CreateSubscription(CreateSubscription),
    /// See [`UpdateSubscription`].
    UpdateSubscription(UpdateSubscription),
    /// See [`DeleteSubscription`].
    DeleteSubscription(DeleteSubscription),
    /// See [`SetTag`].
    SetTag(SetTag),
    /// See [`DeleteTag`].
    DeleteTag(DeleteTag),
    /// See [`SetProperty`].
    SetProperty(SetProperty),
    /// See [`TrackSessionStart`].
    TrackSessionStart(TrackSessionStart),
    /// See [`TrackSessionEnd`].
    TrackSessionEnd(TrackSessionEnd),
    /// See [`TrackPurchase`].
    TrackPurchase(TrackPurchase),
    /// See [`TrackEvent`].
    TrackEvent(TrackEvent),
}

macro_rules! impl_from_operation {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Operation {
                fn from(op: $variant) -> Self {
                    Operation::$variant(op)
                }
            }
        )*
    };
}

impl_from_operation!(
    SetAlias,
    DeleteAlias,
    LoginUser,
    LoginUserFromSubscription,
    RefreshUser,
    CreateSubscription,
    UpdateSubscription,
    DeleteSubscription,
    SetTag,
    DeleteTag,
    SetProperty,
    TrackSessionStart,
    TrackSessionEnd,
    TrackPurchase,
    TrackEvent,
);

impl Operation {
    /// Returns the executor-selection tag.
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::SetAlias(_) => OperationKind::SetAlias,
            Operation::DeleteAlias(_) => OperationKind::DeleteAlias,
            Operation::LoginUser(_) => OperationKind::LoginUser,
            Operation::LoginUserFromSubscription(_) => OperationKind::LoginUserFromSubscription,
            Operation::RefreshUser(_) => OperationKind::RefreshUser,
            Operation::CreateSubscription(_) => OperationKind::CreateSubscription,
            Operation::UpdateSubscription(_) => OperationKind::UpdateSubscription,
            Operation::DeleteSubscription(_) => OperationKind::DeleteSubscription,
            Operation::SetTag(_) => OperationKind::SetTag,
            Operation::DeleteTag(_) => OperationKind::DeleteTag,
            Operation::SetProperty(_) => OperationKind::SetProperty,
            Operation::TrackSessionStart(_) => OperationKind::TrackSessionStart,
            Operation::TrackSessionEnd(_) => OperationKind::TrackSessionEnd,
            Operation::TrackPurchase(_) => OperationKind::TrackPurchase,
            Operation::TrackEvent(_) => OperationKind::TrackEvent,
        }
    }

    /// Application the operation belongs to.
    pub fn app_id(&self) -> &str {
        match self {
            Operation::SetAlias(op) => &op.app_id,
            Operation::DeleteAlias(op) => &op.app_id,
            Operation::LoginUser(op) => &op.app_id,
            Operation::LoginUserFromSubscription(op) => &op.app_id,
            Operation::RefreshUser(op) => &op.app_id,
            Operation::CreateSubscription(op) => &op.app_id,
            Operation::UpdateSubscription(op) => &op.app_id,
            Operation::DeleteSubscription(op) => &op.app_id,
            Operation::SetTag(op) => &op.app_id,
            Operation::DeleteTag(op) => &op.app_id,
            Operation::SetProperty(op) => &op.app_id,
            Operation::TrackSessionStart(op) => &op.app_id,
            Operation::TrackSessionEnd(op) => &op.app_id,
            Operation::TrackPurchase(op) => &op.app_id,
            Operation::TrackEvent(op) => &op.app_id,
        }
    }

    /// User the operation targets.
    pub fn onesignal_id(&self) -> &str {
        match self {
            Operation::SetAlias(op) => &op.onesignal_id,
            Operation::DeleteAlias(op) => &op.onesignal_id,
            Operation::LoginUser(op) => &op.onesignal_id,
            Operation::LoginUserFromSubscription(op) => &op.onesignal_id,
            Operation::RefreshUser(op) => &op.onesignal_id,
            Operation::CreateSubscription(op) => &op.onesignal_id,
            Operation::UpdateSubscription(op) => &op.onesignal_id,
            Operation::DeleteSubscription(op) => &op.onesignal_id,
            Operation::SetTag(op) => &op.onesignal_id,
            Operation::DeleteTag(op) => &op.onesignal_id,
            Operation::SetProperty(op) => &op.onesignal_id,
            Operation::TrackSessionStart(op) => &op.onesignal_id,
            Operation::TrackSessionEnd(op) => &op.onesignal_id,
            Operation::TrackPurchase(op) => &op.onesignal_id,
            Operation::TrackEvent(op) => &op.onesignal_id,
        }
    }

    /// Subscription the operation targets, for subscription operations.
    pub fn subscription_id(&self) -> Option<&str> {
        match self {
            Operation::LoginUserFromSubscription(op) => Some(&op.subscription_id),
            Operation::CreateSubscription(op) => Some(&op.subscription_id),
            Operation::UpdateSubscription(op) => Some(&op.subscription_id),
            Operation::DeleteSubscription(op) => Some(&op.subscription_id),
            _ => None,
        }
    }

    /// How the dispatcher batches this operation.
    pub fn group_comparison_type(&self) -> GroupComparisonType {
        match self {
            Operation::LoginUser(_) | Operation::RefreshUser(_) => GroupComparisonType::Create,
            Operation::LoginUserFromSubscription(_) | Operation::TrackEvent(_) => {
                GroupComparisonType::None
            }
            _ => GroupComparisonType::Alter,
        }
    }

    /// Key matched against a [`GroupComparisonType::Create`] operation.
    pub fn create_comparison_key(&self) -> Option<String> {
        let user = self.user_key();
        match self {
            Operation::SetAlias(_) | Operation::DeleteAlias(_) | Operation::TrackEvent(_) => None,
            Operation::LoginUserFromSubscription(op) => Some(format!(
                "{}.Subscription.{}.Login",
                op.app_id, op.subscription_id
            )),
            Operation::RefreshUser(_) => Some(format!("{}.Refresh", user)),
            _ => Some(user),
        }
    }

    /// Key matched between [`GroupComparisonType::Alter`] operations.
    pub fn modify_comparison_key(&self) -> Option<String> {
        let user = self.user_key();
        match self {
            Operation::SetAlias(op) => Some(format!("{}.Identity.{}", user, op.label)),
            Operation::DeleteAlias(op) => Some(format!("{}.Identity.{}", user, op.label)),
            Operation::CreateSubscription(op) => {
                Some(format!("{}.Subscription.{}", user, op.subscription_id))
            }
            Operation::UpdateSubscription(op) => {
                Some(format!("{}.Subscription.{}", user, op.subscription_id))
            }
            Operation::DeleteSubscription(op) => {
                Some(format!("{}.Subscription.{}", user, op.subscription_id))
            }
            Operation::SetTag(_)
            | Operation::DeleteTag(_)
            | Operation::SetProperty(_)
            | Operation::TrackSessionStart(_)
            | Operation::TrackSessionEnd(_)
            | Operation::TrackPurchase(_) => Some(user),
            Operation::LoginUser(_)
            | Operation::LoginUserFromSubscription(_)
            | Operation::RefreshUser(_)
            | Operation::TrackEvent(_) => None,
        }
    }

    /// Returns false while the operation still references a local id the
    /// backend has not issued a replacement for.
    pub fn can_start_execute(&self) -> bool {
        match self {
            Operation::LoginUser(op) => op
                .existing_onesignal_id
                .as_deref()
                .map_or(true, |id| !is_local_id(id)),
            Operation::LoginUserFromSubscription(_) => true,
            Operation::UpdateSubscription(op) => {
                !is_local_id(&op.onesignal_id) && !is_local_id(&op.subscription_id)
            }
            Operation::DeleteSubscription(op) => {
                !is_local_id(&op.onesignal_id) && !is_local_id(&op.subscription_id)
            }
            _ => !is_local_id(self.onesignal_id()),
        }
    }

    /// Id whose translation the operation waits on.
    pub fn apply_to_record_id(&self) -> &str {
        match self {
            Operation::LoginUser(op) => op
                .existing_onesignal_id
                .as_deref()
                .unwrap_or(&op.onesignal_id),
            Operation::CreateSubscription(op) => &op.subscription_id,
            Operation::UpdateSubscription(op) => &op.subscription_id,
            Operation::DeleteSubscription(op) => &op.subscription_id,
            _ => self.onesignal_id(),
        }
    }

    /// Returns a copy with every local id found in `translations` replaced.
    pub fn translate_ids(&self, translations: &HashMap<String, String>) -> Operation {
        let mut op = self.clone();
        match &mut op {
            Operation::SetAlias(op) => translate(&mut op.onesignal_id, translations),
            Operation::DeleteAlias(op) => translate(&mut op.onesignal_id, translations),
            Operation::LoginUser(op) => {
                translate(&mut op.onesignal_id, translations);
                if let Some(existing) = op.existing_onesignal_id.as_mut() {
                    translate(existing, translations);
                }
            }
            Operation::LoginUserFromSubscription(op) => {
                translate(&mut op.onesignal_id, translations);
                translate(&mut op.subscription_id, translations);
            }
            Operation::RefreshUser(op) => translate(&mut op.onesignal_id, translations),
            Operation::CreateSubscription(op) => {
                translate(&mut op.onesignal_id, translations);
                translate(&mut op.subscription_id, translations);
            }
            Operation::UpdateSubscription(op) => {
                translate(&mut op.onesignal_id, translations);
                translate(&mut op.subscription_id, translations);
            }
            Operation::DeleteSubscription(op) => {
                translate(&mut op.onesignal_id, translations);
                translate(&mut op.subscription_id, translations);
            }
            Operation::SetTag(op) => translate(&mut op.onesignal_id, translations),
            Operation::DeleteTag(op) => translate(&mut op.onesignal_id, translations),
            Operation::SetProperty(op) => translate(&mut op.onesignal_id, translations),
            Operation::TrackSessionStart(op) => translate(&mut op.onesignal_id, translations),
            Operation::TrackSessionEnd(op) => translate(&mut op.onesignal_id, translations),
            Operation::TrackPurchase(op) => translate(&mut op.onesignal_id, translations),
            Operation::TrackEvent(op) => translate(&mut op.onesignal_id, translations),
        }
        op
    }

    fn user_key(&self) -> String {
        format!("{}.User.{}", self.app_id(), self.onesignal_id())
    }
}

fn translate(id: &mut String, translations: &HashMap<String, String>) {
    if let Some(remote) = translations.get(id.as_str()) {
        *id = remote.clone();
    }
}
