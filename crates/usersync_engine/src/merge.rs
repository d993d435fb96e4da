//! Folding a group of operations into one backend request.
//!
//! Four rules cover every executor:
//! - replace-by-key for aliases, tags and properties (last write wins,
//!   deletions become explicit nulls)
//! - additive sums for session counts, session time and purchase amounts
//! - list append for purchase line items
//! - last-write-wins with fallback for a subscription's create payload

use std::collections::BTreeMap;
use usersync_protocol::{
    CreateSubscription, Operation, PropertiesDeltasObject, PropertiesObject, PurchaseObject,
    SubscriptionObject, UserProperty,
};

/// Folds tag and property operations into a [`PropertiesObject`].
///
/// Other operations are ignored.
pub fn merge_properties<'a>(operations: impl IntoIterator<Item = &'a Operation>) -> PropertiesObject {
    let mut properties = PropertiesObject::default();
    for operation in operations {
        match operation {
            Operation::SetTag(op) => {
                properties
                    .tags
                    .get_or_insert_with(BTreeMap::new)
                    .insert(op.key.clone(), Some(op.value.clone()));
            }
            Operation::DeleteTag(op) => {
                properties
                    .tags
                    .get_or_insert_with(BTreeMap::new)
                    .insert(op.key.clone(), None);
            }
            Operation::SetProperty(op) => apply_property(&mut properties, &op.property),
            _ => {}
        }
    }
    properties
}

fn apply_property(properties: &mut PropertiesObject, property: &UserProperty) {
    match property {
        UserProperty::Language(v) => properties.language = Some(v.clone()),
        UserProperty::Timezone(v) => properties.timezone_id = Some(v.clone()),
        UserProperty::Country(v) => properties.country = Some(v.clone()),
        UserProperty::LocationLatitude(v) => properties.lat = Some(*v),
        UserProperty::LocationLongitude(v) => properties.long = Some(*v),
    }
}

/// Folds session and purchase operations into a [`PropertiesDeltasObject`].
///
/// Other operations are ignored.
pub fn merge_deltas<'a>(
    operations: impl IntoIterator<Item = &'a Operation>,
) -> PropertiesDeltasObject {
    let mut deltas = PropertiesDeltasObject::default();
    for operation in operations {
        match operation {
            Operation::TrackSessionStart(_) => {
                let count = deltas.session_count.get_or_insert(0);
                *count = count.saturating_add(1);
            }
            Operation::TrackSessionEnd(op) => {
                let time = deltas.session_time.get_or_insert(0);
                *time = time.saturating_add(op.session_time);
            }
            Operation::TrackPurchase(op) => {
                *deltas.amount_spent.get_or_insert(0.0) += op.amount_spent;
                deltas
                    .purchases
                    .get_or_insert_with(Vec::new)
                    .extend(op.purchases.iter().map(|p| PurchaseObject {
                        sku: p.sku.clone(),
                        iso: p.iso.clone(),
                        amount: p.amount,
                    }));
            }
            _ => {}
        }
    }
    deltas
}

/// Applies alias operations, in order, on top of `identities`.
///
/// Other operations are ignored.
pub fn merge_aliases<'a>(
    mut identities: BTreeMap<String, String>,
    operations: impl IntoIterator<Item = &'a Operation>,
) -> BTreeMap<String, String> {
    for operation in operations {
        match operation {
            Operation::SetAlias(op) => {
                identities.insert(op.label.clone(), op.value.clone());
            }
            Operation::DeleteAlias(op) => {
                identities.remove(&op.label);
            }
            _ => {}
        }
    }
    identities
}

/// Ordered subscriptions sent with a user create, keyed by local id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionList {
    entries: Vec<(String, SubscriptionObject)>,
}

impl SubscriptionList {
    /// Builds the list from subscription operations, in order.
    ///
    /// A create appends (or replaces) an entry, an update rewrites an entry
    /// already in the list and a delete removes it. Other operations are
    /// ignored.
    pub fn from_operations<'a>(operations: impl IntoIterator<Item = &'a Operation>) -> Self {
        let mut list = Self::default();
        for operation in operations {
            match operation {
                Operation::CreateSubscription(op) => {
                    let object = SubscriptionObject::new(
                        op.subscription_type,
                        op.address.clone(),
                        op.enabled,
                        op.status,
                    );
                    match list.position(&op.subscription_id) {
                        Some(index) => list.entries[index].1 = object,
                        None => list.entries.push((op.subscription_id.clone(), object)),
                    }
                }
                Operation::UpdateSubscription(op) => {
                    if let Some(index) = list.position(&op.subscription_id) {
                        list.entries[index].1 = SubscriptionObject::new(
                            op.subscription_type,
                            op.address.clone(),
                            op.enabled,
                            op.status,
                        );
                    }
                }
                Operation::DeleteSubscription(op) => {
                    list.entries.retain(|(id, _)| *id != op.subscription_id);
                }
                _ => {}
            }
        }
        list
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|(entry, _)| entry == id)
    }

    /// Local ids, in request order.
    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Request objects, in order.
    pub fn objects(&self) -> Vec<SubscriptionObject> {
        self.entries.iter().map(|(_, object)| object.clone()).collect()
    }

    /// Number of subscriptions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The payload a subscription create actually sends: the last update to the
/// same subscription in the group wins, falling back to the create itself.
pub fn effective_create<'a>(
    create: &CreateSubscription,
    operations: impl IntoIterator<Item = &'a Operation>,
) -> SubscriptionObject {
    let last_update = operations.into_iter().fold(None, |last, operation| match operation {
        Operation::UpdateSubscription(op) if op.subscription_id == create.subscription_id => {
            Some(op)
        }
        _ => last,
    });
    match last_update {
        Some(update) => SubscriptionObject::new(
            create.subscription_type,
            update.address.clone(),
            update.enabled,
            update.status,
        ),
        None => SubscriptionObject::new(
            create.subscription_type,
            create.address.clone(),
            create.enabled,
            create.status,
        ),
    }
}

/// Returns true if the group deletes the subscription it creates.
pub fn cancels_create<'a>(
    create: &CreateSubscription,
    operations: impl IntoIterator<Item = &'a Operation>,
) -> bool {
    operations.into_iter().any(|operation| {
        matches!(operation, Operation::DeleteSubscription(op) if op.subscription_id == create.subscription_id)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use usersync_protocol::{
        DeleteAlias, DeleteSubscription, DeleteTag, PurchaseInfo, SetAlias, SetProperty, SetTag,
        SubscriptionStatus, SubscriptionType, TrackPurchase, TrackSessionEnd, TrackSessionStart,
        UpdateSubscription,
    };

    fn create(id: &str, address: &str) -> CreateSubscription {
        CreateSubscription::new(
            "app",
            "u1",
            id,
            SubscriptionType::Email,
            true,
            address,
            SubscriptionStatus::Subscribed,
        )
    }

    fn update(id: &str, address: &str) -> Operation {
        UpdateSubscription::new(
            "app",
            "u1",
            id,
            SubscriptionType::Email,
            false,
            address,
            SubscriptionStatus::Unsubscribed,
        )
        .into()
    }

    #[test]
    fn properties_last_write_wins_with_explicit_nulls() {
        let ops: Vec<Operation> = vec![
            SetTag::new("app", "u1", "a", "1").into(),
            SetTag::new("app", "u1", "b", "1").into(),
            SetTag::new("app", "u1", "a", "2").into(),
            DeleteTag::new("app", "u1", "b").into(),
            SetProperty::new("app", "u1", UserProperty::Language(Some("fr".into()))).into(),
            SetProperty::new("app", "u1", UserProperty::Country(None)).into(),
        ];

        let properties = merge_properties(&ops);
        assert_eq!(
            serde_json::to_value(&properties).unwrap(),
            json!({
                "tags": { "a": "2", "b": null },
                "language": "fr",
                "country": null,
            })
        );
    }

    #[test]
    fn deltas_are_summed_and_appended() {
        let ops: Vec<Operation> = vec![
            TrackSessionStart::new("app", "u1").into(),
            TrackSessionEnd::new("app", "u1", 1111).into(),
            TrackSessionEnd::new("app", "u1", 3333).into(),
            TrackPurchase::new("app", "u1", false, 1.5, vec![PurchaseInfo::new("a", "USD", 1.5)])
                .into(),
            TrackPurchase::new("app", "u1", false, 2.0, vec![PurchaseInfo::new("b", "USD", 2.0)])
                .into(),
        ];

        let deltas = merge_deltas(&ops);
        assert_eq!(deltas.session_count, Some(1));
        assert_eq!(deltas.session_time, Some(4444));
        assert_eq!(deltas.amount_spent, Some(3.5));
        let skus: Vec<_> = deltas
            .purchases
            .unwrap()
            .into_iter()
            .map(|p| p.sku)
            .collect();
        assert_eq!(skus, vec!["a", "b"]);
    }

    #[test]
    fn empty_deltas_send_nothing() {
        let ops: Vec<Operation> = vec![SetTag::new("app", "u1", "a", "1").into()];
        assert!(!merge_deltas(&ops).has_at_least_one_property());
    }

    #[test]
    fn session_time_saturates() {
        let ops: Vec<Operation> = vec![
            TrackSessionEnd::new("app", "u1", u64::MAX - 1).into(),
            TrackSessionEnd::new("app", "u1", 5).into(),
        ];
        assert_eq!(merge_deltas(&ops).session_time, Some(u64::MAX));
    }

    #[test]
    fn aliases_apply_in_order() {
        let mut seed = BTreeMap::new();
        seed.insert("external_id".to_string(), "ext".to_string());
        let ops: Vec<Operation> = vec![
            SetAlias::new("app", "u1", "facebook", "fb").into(),
            SetAlias::new("app", "u1", "twitter", "tw").into(),
            DeleteAlias::new("app", "u1", "twitter").into(),
        ];

        let identities = merge_aliases(seed, &ops);
        assert_eq!(identities.len(), 2);
        assert_eq!(identities.get("facebook").map(String::as_str), Some("fb"));
    }

    #[test]
    fn subscription_list_follows_creates_updates_and_deletes() {
        let ops: Vec<Operation> = vec![
            update("local-0", "ignored@x.y"),
            create("local-1", "one@x.y").into(),
            create("local-2", "two@x.y").into(),
            update("local-1", "uno@x.y"),
            DeleteSubscription::new("app", "u1", "local-2").into(),
        ];

        let list = SubscriptionList::from_operations(&ops);
        assert_eq!(list.ids(), vec!["local-1"]);
        assert_eq!(list.objects()[0].token.as_deref(), Some("uno@x.y"));
        assert_eq!(list.objects()[0].enabled, Some(false));
    }

    #[test]
    fn create_takes_the_last_update() {
        let create_op = create("local-1", "first@x.y");
        let ops: Vec<Operation> = vec![
            create_op.clone().into(),
            update("local-1", "second@x.y"),
            update("local-1", "third@x.y"),
        ];

        let object = effective_create(&create_op, &ops);
        assert_eq!(object.token.as_deref(), Some("third@x.y"));
        assert_eq!(object.status(), SubscriptionStatus::Unsubscribed);

        let alone = effective_create(&create_op, &ops[..1]);
        assert_eq!(alone.token.as_deref(), Some("first@x.y"));
    }

    #[test]
    fn delete_cancels_the_create() {
        let create_op = create("local-1", "a@b.c");
        let ops: Vec<Operation> = vec![
            create_op.clone().into(),
            DeleteSubscription::new("app", "u1", "local-1").into(),
        ];
        assert!(cancels_create(&create_op, &ops));
        assert!(!cancels_create(&create_op, &ops[..1]));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn tag_value_is_the_last_write(writes in prop::collection::vec((0u8..4, prop::option::of("[a-z]{1,4}")), 1..30)) {
                let ops: Vec<Operation> = writes
                    .iter()
                    .map(|(key, value)| match value {
                        Some(v) => SetTag::new("app", "u1", key.to_string(), v.clone()).into(),
                        None => DeleteTag::new("app", "u1", key.to_string()).into(),
                    })
                    .collect();

                let tags = merge_properties(&ops).tags.unwrap();
                for (key, value) in tags {
                    let last = writes
                        .iter()
                        .rev()
                        .find(|(k, _)| k.to_string() == key)
                        .map(|(_, v)| v.clone());
                    prop_assert_eq!(Some(value), last);
                }
            }

            #[test]
            fn session_time_is_the_sum(times in prop::collection::vec(0u64..100_000, 1..20)) {
                let ops: Vec<Operation> = times
                    .iter()
                    .map(|t| TrackSessionEnd::new("app", "u1", *t).into())
                    .collect();
                prop_assert_eq!(merge_deltas(&ops).session_time, Some(times.iter().sum::<u64>()));
            }
        }
    }
}
