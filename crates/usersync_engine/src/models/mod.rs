//! Local model stores.
//!
//! The stores are simple keyed records shared between the SDK's public API
//! and the executors. Every mutation carries a [`ChangeTag`]; listeners that
//! turn local changes into outbound operations must ignore
//! [`ChangeTag::Hydrate`] changes, otherwise every backend response would be
//! echoed back to the backend.

mod identity;
mod properties;
mod subscription;

pub use identity::{IdentityModel, IdentityModelStore};
pub use properties::{PropertiesModel, PropertiesModelStore};
pub use subscription::{SubscriptionModel, SubscriptionModelStore};

use crate::hydration::{is_current, SubjectModel};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Origin of a model mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeTag {
    /// Made by the application; should be synced to the backend.
    Normal,
    /// Written from a backend response; must not be synced back.
    Hydrate,
}

/// Which store a change happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelName {
    /// [`IdentityModelStore`].
    Identity,
    /// [`PropertiesModelStore`].
    Properties,
    /// [`SubscriptionModelStore`].
    Subscription,
}

/// Property name reported when a whole model is replaced.
pub const REPLACED: &str = "*";

/// A single model mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChange {
    /// Store the change happened in.
    pub model: ModelName,
    /// Record id, for keyed stores.
    pub record_id: Option<String>,
    /// Changed property, or [`REPLACED`].
    pub property: String,
    /// Origin of the change.
    pub tag: ChangeTag,
}

/// Receives every change made to a store.
pub trait ModelChangeListener: Send + Sync {
    /// Called after the change has been applied.
    fn on_model_changed(&self, change: &ModelChange);
}

/// A listener that keeps every change it sees.
#[derive(Debug, Default)]
pub struct ChangeLog {
    changes: Mutex<Vec<ModelChange>>,
}

impl ChangeLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the changes seen so far.
    pub fn changes(&self) -> Vec<ModelChange> {
        self.changes.lock().clone()
    }

    /// Returns the changes made by the application.
    pub fn normal_changes(&self) -> Vec<ModelChange> {
        self.changes
            .lock()
            .iter()
            .filter(|c| c.tag == ChangeTag::Normal)
            .cloned()
            .collect()
    }
}

impl ModelChangeListener for ChangeLog {
    fn on_model_changed(&self, change: &ModelChange) {
        self.changes.lock().push(change.clone());
    }
}

/// Fan-out of changes to registered listeners.
#[derive(Default)]
pub(crate) struct ChangeNotifier {
    listeners: RwLock<Vec<Arc<dyn ModelChangeListener>>>,
}

impl ChangeNotifier {
    pub(crate) fn subscribe(&self, listener: Arc<dyn ModelChangeListener>) {
        self.listeners.write().push(listener);
    }

    /// Must be called without holding any store lock.
    pub(crate) fn notify(&self, changes: &[ModelChange]) {
        if changes.is_empty() {
            return;
        }
        let listeners = self.listeners.read().clone();
        for change in changes {
            for listener in &listeners {
                listener.on_model_changed(change);
            }
        }
    }
}

/// A model that is stored as a single record.
pub trait SingletonModel: SubjectModel + Clone + Default + Send + Sync {
    /// Name reported in [`ModelChange::model`].
    const NAME: ModelName;
}

/// Store for a model that exists once per device (identity, properties).
pub struct SingletonModelStore<M: SingletonModel> {
    model: RwLock<M>,
    notifier: ChangeNotifier,
}

impl<M: SingletonModel> SingletonModelStore<M> {
    /// Creates a store holding `model`.
    pub fn new(model: M) -> Self {
        Self {
            model: RwLock::new(model),
            notifier: ChangeNotifier::default(),
        }
    }

    /// Registers a change listener.
    pub fn subscribe(&self, listener: Arc<dyn ModelChangeListener>) {
        self.notifier.subscribe(listener);
    }

    /// Returns a snapshot of the model.
    pub fn model(&self) -> M {
        self.model.read().clone()
    }

    /// Returns the user the model currently describes.
    pub fn subject_id(&self) -> Option<String> {
        self.model.read().subject_id().map(str::to_string)
    }

    /// Replaces the whole model.
    pub fn replace(&self, model: M, tag: ChangeTag) {
        *self.model.write() = model;
        self.notifier.notify(&[self.change(REPLACED.to_string(), tag)]);
    }

    /// Mutates the model. `f` returns the names of the properties it changed.
    pub fn update(&self, tag: ChangeTag, f: impl FnOnce(&mut M) -> Vec<String>) {
        let properties = f(&mut self.model.write());
        self.notify_properties(properties, tag);
    }

    /// Mutates the model only if it still describes `subject`.
    ///
    /// The check and the write happen under one lock. Returns true if `f` ran.
    pub fn update_if_current(
        &self,
        subject: &str,
        tag: ChangeTag,
        f: impl FnOnce(&mut M) -> Vec<String>,
    ) -> bool {
        let properties = {
            let mut model = self.model.write();
            if !is_current(&*model, subject) {
                return false;
            }
            f(&mut model)
        };
        self.notify_properties(properties, tag);
        true
    }

    fn notify_properties(&self, properties: Vec<String>, tag: ChangeTag) {
        let changes: Vec<_> = properties
            .into_iter()
            .map(|property| self.change(property, tag))
            .collect();
        self.notifier.notify(&changes);
    }

    fn change(&self, property: String, tag: ChangeTag) -> ModelChange {
        ModelChange {
            model: M::NAME,
            record_id: None,
            property,
            tag,
        }
    }
}

impl<M: SingletonModel> Default for SingletonModelStore<M> {
    fn default() -> Self {
        Self::new(M::default())
    }
}
