//! Property-based test generators using proptest.
//!
//! Strategies produce operations for a single user so that generated groups
//! are always executable by one executor.

use crate::fixtures::APP_ID;
use proptest::prelude::*;
use usersync_protocol::{
    DeleteTag, Operation, PurchaseInfo, SetProperty, SetTag, SubscriptionStatus, TrackPurchase,
    TrackSessionEnd, TrackSessionStart, UserProperty,
};

/// Strategy for generating ids in the backend's lowercase-uuid shape.
pub fn id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[0-9a-f]{4}-[0-9a-f]{12}")
        .expect("Invalid regex")
}

/// Strategy for generating tag keys from a small alphabet, so that
/// generated groups often touch the same key more than once.
pub fn tag_key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[abc]{1,2}").expect("Invalid regex")
}

/// Strategy for generating tag values.
pub fn tag_value_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{0,8}").expect("Invalid regex")
}

/// Strategy for generating session durations in seconds.
pub fn session_time_strategy() -> impl Strategy<Value = u64> {
    0u64..86_400
}

/// Strategy for generating HTTP status codes a backend might answer with.
pub fn http_status_strategy() -> impl Strategy<Value = u16> {
    prop_oneof![
        Just(400u16),
        Just(401),
        Just(402),
        Just(403),
        Just(404),
        Just(409),
        Just(410),
        Just(429),
        500u16..600,
    ]
}

/// Strategy for generating subscription statuses, including unknown codes.
pub fn subscription_status_strategy() -> impl Strategy<Value = SubscriptionStatus> {
    prop_oneof![
        Just(SubscriptionStatus::Subscribed),
        Just(SubscriptionStatus::NoPermission),
        Just(SubscriptionStatus::Unsubscribed),
        Just(SubscriptionStatus::DisabledFromRestApi),
        (-99i32..-40).prop_map(SubscriptionStatus::Other),
    ]
}

/// Strategy for generating a user property change.
pub fn user_property_strategy() -> impl Strategy<Value = UserProperty> {
    prop_oneof![
        prop::option::of("[a-z]{2}").prop_map(UserProperty::Language),
        prop::option::of("[A-Z]{2}").prop_map(UserProperty::Country),
        prop::option::of(-90.0f64..90.0).prop_map(UserProperty::LocationLatitude),
        prop::option::of(-180.0f64..180.0).prop_map(UserProperty::LocationLongitude),
    ]
}

/// Strategy for generating one update-user operation on `onesignal_id`.
pub fn update_user_operation_strategy(onesignal_id: String) -> impl Strategy<Value = Operation> {
    let set_id = onesignal_id.clone();
    let delete_id = onesignal_id.clone();
    let property_id = onesignal_id.clone();
    let start_id = onesignal_id.clone();
    let end_id = onesignal_id.clone();
    let purchase_id = onesignal_id;
    prop_oneof![
        (tag_key_strategy(), tag_value_strategy())
            .prop_map(move |(k, v)| Operation::from(SetTag::new(APP_ID, set_id.clone(), k, v))),
        tag_key_strategy()
            .prop_map(move |k| Operation::from(DeleteTag::new(APP_ID, delete_id.clone(), k))),
        user_property_strategy()
            .prop_map(move |p| Operation::from(SetProperty::new(APP_ID, property_id.clone(), p))),
        Just(()).prop_map(move |_| Operation::from(TrackSessionStart::new(APP_ID, start_id.clone()))),
        session_time_strategy()
            .prop_map(move |t| Operation::from(TrackSessionEnd::new(APP_ID, end_id.clone(), t))),
        (1u32..5, 0.5f64..50.0).prop_map(move |(n, amount)| {
            let purchases = (0..n)
                .map(|i| PurchaseInfo::new(format!("sku-{}", i), "USD", amount))
                .collect();
            Operation::from(TrackPurchase::new(
                APP_ID,
                purchase_id.clone(),
                false,
                amount * n as f64,
                purchases,
            ))
        }),
    ]
}

/// Strategy for generating a non-empty group of update-user operations on
/// `onesignal_id`.
pub fn update_user_group_strategy(
    onesignal_id: String,
    max_len: usize,
) -> impl Strategy<Value = Vec<Operation>> {
    prop::collection::vec(update_user_operation_strategy(onesignal_id), 1..=max_len.max(1))
}
