//! Properties model: tags, language, location and friends.

use super::{ChangeTag, ModelName, SingletonModel, SingletonModelStore};
use crate::hydration::SubjectModel;
use std::collections::BTreeMap;
use usersync_protocol::{IdentityConstants, UserProperty};

/// Properties of the current user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertiesModel {
    /// User the properties belong to.
    pub onesignal_id: Option<String>,
    /// Language code.
    pub language: Option<String>,
    /// Timezone id.
    pub timezone: Option<String>,
    /// Country code.
    pub country: Option<String>,
    /// Latitude.
    pub location_latitude: Option<f64>,
    /// Longitude.
    pub location_longitude: Option<f64>,
    /// Tags.
    pub tags: BTreeMap<String, String>,
}

impl PropertiesModel {
    /// Creates an empty model for `onesignal_id`.
    pub fn with_onesignal_id(onesignal_id: impl Into<String>) -> Self {
        Self {
            onesignal_id: Some(onesignal_id.into()),
            ..Default::default()
        }
    }

    /// Points the model at another user, returning the changed property name.
    pub fn set_onesignal_id(&mut self, onesignal_id: impl Into<String>) -> String {
        self.onesignal_id = Some(onesignal_id.into());
        IdentityConstants::ONESIGNAL_ID.to_string()
    }

    /// Sets a tag, returning the changed property name.
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) -> String {
        let key = key.into();
        self.tags.insert(key.clone(), value.into());
        format!("tags.{}", key)
    }

    /// Removes a tag, returning the changed property name.
    pub fn remove_tag(&mut self, key: &str) -> String {
        self.tags.remove(key);
        format!("tags.{}", key)
    }

    /// Applies a property value, returning the changed property name.
    pub fn set_property(&mut self, property: &UserProperty) -> String {
        match property {
            UserProperty::Language(v) => self.language = v.clone(),
            UserProperty::Timezone(v) => self.timezone = v.clone(),
            UserProperty::Country(v) => self.country = v.clone(),
            UserProperty::LocationLatitude(v) => self.location_latitude = *v,
            UserProperty::LocationLongitude(v) => self.location_longitude = *v,
        }
        property.key().to_string()
    }
}

impl SubjectModel for PropertiesModel {
    fn subject_id(&self) -> Option<&str> {
        self.onesignal_id.as_deref()
    }
}

impl SingletonModel for PropertiesModel {
    const NAME: ModelName = ModelName::Properties;
}

/// Store for the device's [`PropertiesModel`].
pub type PropertiesModelStore = SingletonModelStore<PropertiesModel>;

impl SingletonModelStore<PropertiesModel> {
    /// Sets a tag.
    pub fn set_tag(&self, key: &str, value: &str, tag: ChangeTag) {
        self.update(tag, |m| vec![m.set_tag(key, value)]);
    }

    /// Removes a tag.
    pub fn remove_tag(&self, key: &str, tag: ChangeTag) {
        self.update(tag, |m| vec![m.remove_tag(key)]);
    }

    /// Sets a property.
    pub fn set_property(&self, property: &UserProperty, tag: ChangeTag) {
        self.update(tag, |m| vec![m.set_property(property)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_setters() {
        let mut model = PropertiesModel::with_onesignal_id("u1");
        assert_eq!(model.set_property(&UserProperty::Language(Some("fr".into()))), "language");
        model.set_property(&UserProperty::LocationLatitude(Some(48.85)));
        assert_eq!(model.language.as_deref(), Some("fr"));
        assert_eq!(model.location_latitude, Some(48.85));

        model.set_property(&UserProperty::Language(None));
        assert_eq!(model.language, None);
    }

    #[test]
    fn tag_setters() {
        let store = PropertiesModelStore::new(PropertiesModel::with_onesignal_id("u1"));
        store.set_tag("level", "3", ChangeTag::Normal);
        assert_eq!(store.model().tags.get("level").map(String::as_str), Some("3"));

        store.remove_tag("level", ChangeTag::Normal);
        assert!(store.model().tags.is_empty());
    }
}
