//! Configuration for the executors.

use parking_lot::RwLock;
use std::time::Duration;

/// Configuration the executors consult while executing.
#[derive(Debug, Clone)]
pub struct ConfigModel {
    /// Application id.
    pub app_id: String,
    /// Backend id of this device's push subscription, once known.
    pub push_subscription_id: Option<String>,
    /// How long after a create a not-found for the new record is treated as
    /// backend replication lag.
    pub missing_retry_window: Duration,
    /// How long after a create operations targeting the new record are held.
    pub post_create_delay: Duration,
    /// Whether requests are authenticated with per-user identity tokens.
    pub use_identity_verification: bool,
}

impl ConfigModel {
    /// Creates a configuration for `app_id`.
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            push_subscription_id: None,
            missing_retry_window: Duration::from_secs(60),
            post_create_delay: Duration::from_secs(5),
            use_identity_verification: false,
        }
    }

    /// Sets this device's push subscription id.
    pub fn with_push_subscription_id(mut self, id: impl Into<String>) -> Self {
        self.push_subscription_id = Some(id.into());
        self
    }

    /// Sets the missing-retry window.
    pub fn with_missing_retry_window(mut self, window: Duration) -> Self {
        self.missing_retry_window = window;
        self
    }

    /// Sets the post-create delay.
    pub fn with_post_create_delay(mut self, delay: Duration) -> Self {
        self.post_create_delay = delay;
        self
    }

    /// Enables or disables identity verification.
    pub fn with_identity_verification(mut self, enabled: bool) -> Self {
        self.use_identity_verification = enabled;
        self
    }
}

impl Default for ConfigModel {
    fn default() -> Self {
        Self::new("")
    }
}

/// Shared, updatable configuration.
///
/// Remote configuration may change the windows at any time, and executors
/// hydrate the push subscription id when the backend issues one.
#[derive(Debug, Default)]
pub struct ConfigModelStore {
    model: RwLock<ConfigModel>,
}

impl ConfigModelStore {
    /// Creates a store holding `model`.
    pub fn new(model: ConfigModel) -> Self {
        Self {
            model: RwLock::new(model),
        }
    }

    /// Returns a snapshot of the configuration.
    pub fn model(&self) -> ConfigModel {
        self.model.read().clone()
    }

    /// Applies `f` to the configuration.
    pub fn update(&self, f: impl FnOnce(&mut ConfigModel)) {
        f(&mut self.model.write());
    }

    /// Returns the missing-retry window.
    pub fn missing_retry_window(&self) -> Duration {
        self.model.read().missing_retry_window
    }

    /// Returns the post-create delay.
    pub fn post_create_delay(&self) -> Duration {
        self.model.read().post_create_delay
    }

    /// Returns this device's push subscription id.
    pub fn push_subscription_id(&self) -> Option<String> {
        self.model.read().push_subscription_id.clone()
    }

    /// Replaces the push subscription id if it is currently `from`.
    ///
    /// Returns true if the id was replaced.
    pub fn translate_push_subscription_id(&self, from: &str, to: &str) -> bool {
        let mut model = self.model.write();
        if model.push_subscription_id.as_deref() == Some(from) {
            model.push_subscription_id = Some(to.to_string());
            true
        } else {
            false
        }
    }

    /// Returns true if identity verification is enabled.
    pub fn use_identity_verification(&self) -> bool {
        self.model.read().use_identity_verification
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = ConfigModel::new("app")
            .with_push_subscription_id("push-1")
            .with_missing_retry_window(Duration::from_secs(30))
            .with_post_create_delay(Duration::from_secs(1))
            .with_identity_verification(true);

        assert_eq!(config.app_id, "app");
        assert_eq!(config.push_subscription_id.as_deref(), Some("push-1"));
        assert_eq!(config.missing_retry_window, Duration::from_secs(30));
        assert_eq!(config.post_create_delay, Duration::from_secs(1));
        assert!(config.use_identity_verification);
    }

    #[test]
    fn config_defaults() {
        let config = ConfigModel::new("app");
        assert_eq!(config.missing_retry_window, Duration::from_secs(60));
        assert_eq!(config.post_create_delay, Duration::from_secs(5));
        assert!(!config.use_identity_verification);
        assert_eq!(config.push_subscription_id, None);
    }

    #[test]
    fn remote_update() {
        let store = ConfigModelStore::new(ConfigModel::new("app"));
        store.update(|config| config.missing_retry_window = Duration::from_secs(5));
        assert_eq!(store.missing_retry_window(), Duration::from_secs(5));
    }

    #[test]
    fn push_subscription_translation() {
        let store = ConfigModelStore::new(ConfigModel::new("app").with_push_subscription_id("local-p"));

        assert!(!store.translate_push_subscription_id("local-x", "remote-x"));
        assert_eq!(store.push_subscription_id().as_deref(), Some("local-p"));

        assert!(store.translate_push_subscription_id("local-p", "remote-p"));
        assert_eq!(store.push_subscription_id().as_deref(), Some("remote-p"));
    }
}
