//! Identity model: the user's aliases.

use super::{ChangeTag, ModelName, SingletonModel, SingletonModelStore};
use crate::hydration::SubjectModel;
use std::collections::BTreeMap;
use usersync_protocol::IdentityConstants;

/// Aliases of the current user, including the canonical `onesignal_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityModel {
    aliases: BTreeMap<String, String>,
}

impl IdentityModel {
    /// Creates a model for `onesignal_id` with no other aliases.
    pub fn with_onesignal_id(onesignal_id: impl Into<String>) -> Self {
        let mut model = Self::default();
        model.set(IdentityConstants::ONESIGNAL_ID, onesignal_id);
        model
    }

    /// Creates a model from an alias map.
    pub fn from_aliases(aliases: BTreeMap<String, String>) -> Self {
        Self { aliases }
    }

    /// The canonical user id.
    pub fn onesignal_id(&self) -> Option<&str> {
        self.get(IdentityConstants::ONESIGNAL_ID)
    }

    /// The application's id for the user.
    pub fn external_id(&self) -> Option<&str> {
        self.get(IdentityConstants::EXTERNAL_ID)
    }

    /// Value of alias `label`.
    pub fn get(&self, label: &str) -> Option<&str> {
        self.aliases.get(label).map(String::as_str)
    }

    /// All aliases.
    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }

    /// Sets alias `label`, returning the changed property name.
    pub fn set(&mut self, label: impl Into<String>, value: impl Into<String>) -> String {
        let label = label.into();
        self.aliases.insert(label.clone(), value.into());
        label
    }

    /// Removes alias `label`, returning the changed property name.
    pub fn remove(&mut self, label: &str) -> String {
        self.aliases.remove(label);
        label.to_string()
    }
}

impl SubjectModel for IdentityModel {
    fn subject_id(&self) -> Option<&str> {
        self.onesignal_id()
    }
}

impl SingletonModel for IdentityModel {
    const NAME: ModelName = ModelName::Identity;
}

/// Store for the device's [`IdentityModel`].
pub type IdentityModelStore = SingletonModelStore<IdentityModel>;

impl SingletonModelStore<IdentityModel> {
    /// The current user's canonical id.
    pub fn onesignal_id(&self) -> Option<String> {
        self.subject_id()
    }

    /// Sets alias `label`.
    pub fn set_alias(&self, label: &str, value: &str, tag: ChangeTag) {
        self.update(tag, |m| vec![m.set(label, value)]);
    }

    /// Removes alias `label`.
    pub fn remove_alias(&self, label: &str, tag: ChangeTag) {
        self.update(tag, |m| vec![m.remove(label)]);
    }
}
