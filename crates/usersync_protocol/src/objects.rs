//! Backend request and response objects.
//!
//! Outbound objects distinguish "not sent" from "sent as null": a field
//! that is `None` is omitted, while a deletion is `Some(None)` and
//! serializes as an explicit JSON `null`.

use crate::subscription::{SubscriptionStatus, SubscriptionType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Replace-by-key user properties sent with a user update or create.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PropertiesObject {
    /// Tags; a `None` value deletes the tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, Option<String>>>,
    /// Language code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<Option<String>>,
    /// Timezone id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone_id: Option<Option<String>>,
    /// Country code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<Option<String>>,
    /// Latitude.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<Option<f64>>,
    /// Longitude.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long: Option<Option<f64>>,
}

impl PropertiesObject {
    /// Returns true if at least one field would be sent.
    pub fn has_at_least_one_property(&self) -> bool {
        self.tags.is_some()
            || self.language.is_some()
            || self.timezone_id.is_some()
            || self.country.is_some()
            || self.lat.is_some()
            || self.long.is_some()
    }
}

/// One purchase line item as sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseObject {
    /// Store product id.
    pub sku: String,
    /// Currency code.
    pub iso: String,
    /// Price paid.
    pub amount: f64,
}

/// Additive user deltas (session and purchase telemetry).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PropertiesDeltasObject {
    /// Seconds spent in sessions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_time: Option<u64>,
    /// Number of sessions started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_count: Option<u32>,
    /// Total amount spent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_spent: Option<f64>,
    /// Purchase line items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchases: Option<Vec<PurchaseObject>>,
}

impl PropertiesDeltasObject {
    /// Returns true if at least one delta would be sent.
    pub fn has_at_least_one_property(&self) -> bool {
        self.session_time.is_some()
            || self.session_count.is_some()
            || self.amount_spent.is_some()
            || self.purchases.is_some()
    }
}

/// A subscription as exchanged with the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionObject {
    /// Backend id; absent on create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Delivery channel.
    #[serde(rename = "type")]
    pub subscription_type: SubscriptionType,
    /// Push token, email address or phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Whether delivery is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Delivery status code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_types: Option<i32>,
}

impl SubscriptionObject {
    /// Creates an outbound subscription without a backend id.
    pub fn new(
        subscription_type: SubscriptionType,
        address: impl Into<String>,
        enabled: bool,
        status: SubscriptionStatus,
    ) -> Self {
        Self {
            id: None,
            subscription_type,
            token: Some(address.into()),
            enabled: Some(enabled),
            notification_types: Some(status.to_code()),
        }
    }

    /// Delivery status, defaulting to subscribed when the backend omits it.
    pub fn status(&self) -> SubscriptionStatus {
        self.notification_types
            .map(SubscriptionStatus::from_code)
            .unwrap_or_default()
    }
}

/// User properties as returned by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProperties {
    /// Tags.
    pub tags: Option<BTreeMap<String, String>>,
    /// Language code.
    pub language: Option<String>,
    /// Timezone id.
    pub timezone_id: Option<String>,
    /// Country code.
    pub country: Option<String>,
    /// Latitude.
    pub lat: Option<f64>,
    /// Longitude.
    pub long: Option<f64>,
}

/// A user as returned by create and fetch.
///
/// On create, `subscriptions` is positionally aligned with the list sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserResponse {
    /// Aliases, including the backend-issued `onesignal_id`.
    pub identities: BTreeMap<String, String>,
    /// Properties.
    pub properties: UserProperties,
    /// Subscriptions.
    pub subscriptions: Vec<SubscriptionObject>,
}

/// Read-your-writes marker issued by the backend for a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RywToken {
    /// Opaque token.
    pub ryw_token: String,
    /// Suggested delay before reading, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ryw_delay: Option<u64>,
}

impl RywToken {
    /// Creates a token without a delay hint.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            ryw_token: token.into(),
            ryw_delay: None,
        }
    }
}

/// Device and app metadata attached to custom events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventMetadata {
    /// Platform family.
    pub device_type: String,
    /// SDK version.
    pub sdk: String,
    /// Host application version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    /// Device model.
    pub device_model: String,
    /// Operating system version.
    pub device_os: String,
}
