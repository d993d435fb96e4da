//! Subscription models, keyed by subscription id.

use super::{ChangeNotifier, ChangeTag, ModelChange, ModelChangeListener, ModelName, REPLACED};
use parking_lot::RwLock;
use std::sync::Arc;
use usersync_protocol::{SubscriptionObject, SubscriptionStatus, SubscriptionType};

/// One subscription of the current user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionModel {
    /// Local or backend id.
    pub id: String,
    /// Delivery channel.
    pub subscription_type: SubscriptionType,
    /// Push token, email address or phone number.
    pub address: String,
    /// Delivery status.
    pub status: SubscriptionStatus,
    /// Whether the user wants delivery.
    pub opted_in: bool,
}

impl SubscriptionModel {
    /// Creates a model.
    pub fn new(
        id: impl Into<String>,
        subscription_type: SubscriptionType,
        address: impl Into<String>,
        status: SubscriptionStatus,
        opted_in: bool,
    ) -> Self {
        Self {
            id: id.into(),
            subscription_type,
            address: address.into(),
            status,
            opted_in,
        }
    }

    /// Builds a model from a backend subscription. Returns `None` when the
    /// backend object carries no id.
    pub fn from_backend(subscription: &SubscriptionObject) -> Option<Self> {
        let status = subscription.status();
        Some(Self {
            id: subscription.id.clone()?,
            subscription_type: subscription.subscription_type,
            address: subscription.token.clone().unwrap_or_default(),
            status,
            opted_in: status.is_opted_in(),
        })
    }
}

/// Store for the current user's subscriptions, in insertion order.
#[derive(Default)]
pub struct SubscriptionModelStore {
    models: RwLock<Vec<SubscriptionModel>>,
    notifier: ChangeNotifier,
}

impl SubscriptionModelStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a change listener.
    pub fn subscribe(&self, listener: Arc<dyn ModelChangeListener>) {
        self.notifier.subscribe(listener);
    }

    /// Returns the subscription with `id`.
    pub fn get(&self, id: &str) -> Option<SubscriptionModel> {
        self.models.read().iter().find(|m| m.id == id).cloned()
    }

    /// Returns every subscription.
    pub fn list(&self) -> Vec<SubscriptionModel> {
        self.models.read().clone()
    }

    /// Adds a subscription, replacing any with the same id.
    pub fn add(&self, model: SubscriptionModel, tag: ChangeTag) {
        let id = model.id.clone();
        {
            let mut models = self.models.write();
            models.retain(|m| m.id != id);
            models.push(model);
        }
        self.notifier.notify(&[change(Some(id), REPLACED, tag)]);
    }

    /// Renames subscription `from` to `to`. Returns false if `from` no longer
    /// exists.
    pub fn set_id(&self, from: &str, to: &str, tag: ChangeTag) -> bool {
        {
            let mut models = self.models.write();
            match models.iter_mut().find(|m| m.id == from) {
                Some(model) => model.id = to.to_string(),
                None => return false,
            }
        }
        self.notifier.notify(&[change(Some(to.to_string()), "id", tag)]);
        true
    }

    /// Removes subscription `id`. Returns false if it was already gone.
    pub fn remove(&self, id: &str, tag: ChangeTag) -> bool {
        let removed = {
            let mut models = self.models.write();
            let before = models.len();
            models.retain(|m| m.id != id);
            models.len() != before
        };
        if removed {
            self.notifier
                .notify(&[change(Some(id.to_string()), REPLACED, tag)]);
        }
        removed
    }

    /// Replaces every subscription.
    pub fn replace_all(&self, models: Vec<SubscriptionModel>, tag: ChangeTag) {
        *self.models.write() = models;
        self.notifier.notify(&[change(None, REPLACED, tag)]);
    }
}

fn change(record_id: Option<String>, property: &str, tag: ChangeTag) -> ModelChange {
    ModelChange {
        model: ModelName::Subscription,
        record_id,
        property: property.to_string(),
        tag,
    }
}
