//! Recovery for a user the backend has lost.
//!
//! When a record is reported missing long after it was created, the user is
//! assumed to be gone on the backend and is re-created from the local
//! models.

use crate::config::ConfigModelStore;
use crate::models::{IdentityModelStore, SubscriptionModelStore};
use std::sync::Arc;
use usersync_protocol::{CreateSubscription, LoginUser, Operation, RefreshUser};

/// Produces the operations that re-create a user from local state.
pub trait RebuildUserService: Send + Sync {
    /// Returns `None` if `onesignal_id` is no longer the current user,
    /// otherwise the operations that rebuild it.
    fn get_rebuild_operations_if_current_user(
        &self,
        app_id: &str,
        onesignal_id: &str,
    ) -> Option<Vec<Operation>>;
}

/// [`RebuildUserService`] backed by the local model stores.
pub struct ModelRebuildService {
    identity: Arc<IdentityModelStore>,
    subscriptions: Arc<SubscriptionModelStore>,
    config: Arc<ConfigModelStore>,
}

impl ModelRebuildService {
    /// Creates a rebuild service reading the given stores.
    pub fn new(
        identity: Arc<IdentityModelStore>,
        subscriptions: Arc<SubscriptionModelStore>,
        config: Arc<ConfigModelStore>,
    ) -> Self {
        Self {
            identity,
            subscriptions,
            config,
        }
    }
}

impl RebuildUserService for ModelRebuildService {
    fn get_rebuild_operations_if_current_user(
        &self,
        app_id: &str,
        onesignal_id: &str,
    ) -> Option<Vec<Operation>> {
        let identity = self.identity.model();
        if identity.onesignal_id() != Some(onesignal_id) {
            return None;
        }

        let mut operations: Vec<Operation> = vec![LoginUser::new(
            app_id,
            onesignal_id,
            identity.external_id().map(str::to_string),
            None,
        )
        .into()];

        let push = self
            .config
            .push_subscription_id()
            .and_then(|id| self.subscriptions.get(&id));
        if let Some(push) = push {
            operations.push(
                CreateSubscription::new(
                    app_id,
                    onesignal_id,
                    push.id,
                    push.subscription_type,
                    push.opted_in,
                    push.address,
                    push.status,
                )
                .into(),
            );
        }

        operations.push(RefreshUser::new(app_id, onesignal_id).into());
        Some(operations)
    }
}
