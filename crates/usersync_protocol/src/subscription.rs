//! Subscription type and status codes.

use serde::{Deserialize, Serialize};

/// Channel a subscription delivers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionType {
    /// Push notifications to a device.
    #[serde(rename = "Push")]
    Push,
    /// Email address.
    #[serde(rename = "Email")]
    Email,
    /// Phone number.
    #[serde(rename = "SMS")]
    Sms,
}

impl SubscriptionType {
    /// Returns true for the push channel.
    pub fn is_push(&self) -> bool {
        matches!(self, SubscriptionType::Push)
    }
}

/// Delivery status of a subscription, as the backend's `notification_types`.
///
/// Only the codes the engine branches on are named; everything else is kept
/// verbatim in [`SubscriptionStatus::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionStatus {
    /// Deliverable.
    Subscribed,
    /// The device has not granted permission.
    NoPermission,
    /// The user opted out.
    Unsubscribed,
    /// Disabled through the REST API.
    DisabledFromRestApi,
    /// Any other backend code.
    Other(i32),
}

impl SubscriptionStatus {
    /// Converts to the backend's numeric code.
    pub fn to_code(&self) -> i32 {
        match self {
            SubscriptionStatus::Subscribed => 1,
            SubscriptionStatus::NoPermission => 0,
            SubscriptionStatus::Unsubscribed => -2,
            SubscriptionStatus::DisabledFromRestApi => -31,
            SubscriptionStatus::Other(code) => *code,
        }
    }

    /// Converts from the backend's numeric code.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => SubscriptionStatus::Subscribed,
            0 => SubscriptionStatus::NoPermission,
            -2 => SubscriptionStatus::Unsubscribed,
            -31 => SubscriptionStatus::DisabledFromRestApi,
            other => SubscriptionStatus::Other(other),
        }
    }

    /// Returns true unless the user or the backend switched delivery off.
    pub fn is_opted_in(&self) -> bool {
        !matches!(
            self,
            SubscriptionStatus::Unsubscribed | SubscriptionStatus::DisabledFromRestApi
        )
    }
}

impl Default for SubscriptionStatus {
    fn default() -> Self {
        SubscriptionStatus::Subscribed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(SubscriptionStatus::Subscribed.to_code(), 1);
        assert_eq!(SubscriptionStatus::from_code(-2), SubscriptionStatus::Unsubscribed);
        assert_eq!(SubscriptionStatus::from_code(-99), SubscriptionStatus::Other(-99));
        assert_eq!(SubscriptionStatus::Other(-99).to_code(), -99);
    }

    #[test]
    fn opted_in() {
        assert!(SubscriptionStatus::Subscribed.is_opted_in());
        assert!(SubscriptionStatus::NoPermission.is_opted_in());
        assert!(!SubscriptionStatus::Unsubscribed.is_opted_in());
        assert!(!SubscriptionStatus::DisabledFromRestApi.is_opted_in());
    }

    #[test]
    fn type_serializes_as_backend_names() {
        assert_eq!(serde_json::to_string(&SubscriptionType::Sms).unwrap(), "\"SMS\"");
        assert_eq!(serde_json::to_string(&SubscriptionType::Push).unwrap(), "\"Push\"");
    }
}
