//! Read-your-write consistency tracking.
//!
//! The backend is eventually consistent. A write may return a token that a
//! later read must present to see the write; readers wait on a condition
//! until either a token arrives for the id they care about or the write
//! side declares that there is nothing to wait for.
//!
//! A token and a resolution for the same id replace each other, so a
//! condition always reflects the most recent write. Callers drop a condition
//! they have consumed with [`MemoryConsistencyManager::clear`].

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tokio::sync::watch;
use usersync_protocol::RywToken;

/// What a read-your-write token was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RywPurpose {
    /// A write to the user record.
    User,
    /// A write to a subscription record.
    Subscription,
}

/// Write side of the consistency manager, as seen by the executors.
pub trait ConsistencyManager: Send + Sync {
    /// Records the token issued for a write to `id`.
    fn set_ryw_token(&self, id: &str, purpose: RywPurpose, token: RywToken);

    /// Releases everyone waiting on `id` without a token.
    fn resolve_conditions_with_id(&self, id: &str);
}

#[derive(Debug, Default)]
struct Conditions {
    tokens: HashMap<(String, RywPurpose), RywToken>,
    resolved: HashSet<String>,
}

impl Conditions {
    fn forget_tokens(&mut self, id: &str) {
        self.tokens.retain(|(token_id, _), _| token_id != id);
    }

    /// `Some(None)` once resolved without a token, `None` while pending.
    fn outcome(&self, id: &str, purpose: RywPurpose) -> Option<Option<RywToken>> {
        if let Some(token) = self.tokens.get(&(id.to_string(), purpose)) {
            return Some(Some(token.clone()));
        }
        if self.resolved.contains(id) {
            return Some(None);
        }
        None
    }
}

/// In-memory [`ConsistencyManager`] whose conditions can be awaited.
#[derive(Debug)]
pub struct MemoryConsistencyManager {
    conditions: Mutex<Conditions>,
    version: watch::Sender<u64>,
}

impl MemoryConsistencyManager {
    /// Creates a manager with no recorded writes.
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            conditions: Mutex::new(Conditions::default()),
            version,
        }
    }

    /// Returns the token recorded for `id`, if any.
    pub fn token(&self, id: &str, purpose: RywPurpose) -> Option<RywToken> {
        self.conditions
            .lock()
            .tokens
            .get(&(id.to_string(), purpose))
            .cloned()
    }

    /// Returns true once `id` was resolved without a token.
    pub fn is_resolved(&self, id: &str) -> bool {
        self.conditions.lock().resolved.contains(id)
    }

    /// Waits until a token for `id` arrives or `id` is resolved.
    ///
    /// Returns the token, or `None` if the condition was resolved without one.
    pub async fn wait_for(&self, id: &str, purpose: RywPurpose) -> Option<RywToken> {
        let mut changes = self.version.subscribe();
        loop {
            if let Some(outcome) = self.conditions.lock().outcome(id, purpose) {
                return outcome;
            }
            if changes.changed().await.is_err() {
                return None;
            }
        }
    }

    /// Forgets every token and resolution recorded for `id`. Later waiters
    /// on `id` wait for the next write.
    pub fn clear(&self, id: &str) {
        let mut conditions = self.conditions.lock();
        conditions.forget_tokens(id);
        conditions.resolved.remove(id);
    }

    /// Number of ids with a recorded token or resolution.
    pub fn tracked_ids(&self) -> usize {
        let conditions = self.conditions.lock();
        let mut ids: HashSet<&str> = conditions.resolved.iter().map(String::as_str).collect();
        ids.extend(conditions.tokens.keys().map(|(id, _)| id.as_str()));
        ids.len()
    }

    fn bump(&self) {
        self.version.send_modify(|version| *version += 1);
    }
}

impl Default for MemoryConsistencyManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsistencyManager for MemoryConsistencyManager {
    fn set_ryw_token(&self, id: &str, purpose: RywPurpose, token: RywToken) {
        {
            let mut conditions = self.conditions.lock();
            conditions.resolved.remove(id);
            conditions.tokens.insert((id.to_string(), purpose), token);
        }
        self.bump();
    }

    fn resolve_conditions_with_id(&self, id: &str) {
        {
            let mut conditions = self.conditions.lock();
            conditions.forget_tokens(id);
            conditions.resolved.insert(id.to_string());
        }
        self.bump();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn tokens_are_keyed_by_purpose() {
        let manager = MemoryConsistencyManager::new();
        manager.set_ryw_token("u1", RywPurpose::User, RywToken::new("t1"));

        assert_eq!(manager.token("u1", RywPurpose::User), Some(RywToken::new("t1")));
        assert_eq!(manager.token("u1", RywPurpose::Subscription), None);
        assert!(!manager.is_resolved("u1"));
    }

    #[tokio::test]
    async fn waiter_sees_a_later_token() {
        let manager = Arc::new(MemoryConsistencyManager::new());
        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.wait_for("u1", RywPurpose::User).await })
        };

        tokio::task::yield_now().await;
        manager.set_ryw_token("u1", RywPurpose::User, RywToken::new("t1"));

        assert_eq!(waiter.await.unwrap(), Some(RywToken::new("t1")));
    }

    #[tokio::test]
    async fn resolve_releases_waiters_without_a_token() {
        let manager = Arc::new(MemoryConsistencyManager::new());
        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.wait_for("u1", RywPurpose::User).await })
        };

        tokio::task::yield_now().await;
        manager.resolve_conditions_with_id("u2");
        manager.resolve_conditions_with_id("u1");

        assert_eq!(waiter.await.unwrap(), None);
    }

    #[test]
    fn latest_write_replaces_the_condition() {
        let manager = MemoryConsistencyManager::new();
        manager.set_ryw_token("u1", RywPurpose::User, RywToken::new("t1"));
        manager.resolve_conditions_with_id("u1");

        assert_eq!(manager.token("u1", RywPurpose::User), None);
        assert!(manager.is_resolved("u1"));

        manager.set_ryw_token("u1", RywPurpose::Subscription, RywToken::new("t2"));
        assert!(!manager.is_resolved("u1"));
        assert_eq!(
            manager.token("u1", RywPurpose::Subscription),
            Some(RywToken::new("t2"))
        );
    }

    #[tokio::test]
    async fn cleared_condition_waits_for_the_next_write() {
        let manager = Arc::new(MemoryConsistencyManager::new());
        manager.set_ryw_token("u1", RywPurpose::User, RywToken::new("t1"));
        assert_eq!(
            manager.wait_for("u1", RywPurpose::User).await,
            Some(RywToken::new("t1"))
        );
        manager.clear("u1");

        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.wait_for("u1", RywPurpose::User).await })
        };
        tokio::task::yield_now().await;
        manager.set_ryw_token("u1", RywPurpose::User, RywToken::new("t2"));

        assert_eq!(waiter.await.unwrap(), Some(RywToken::new("t2")));
    }

    #[test]
    fn cleared_ids_are_not_kept() {
        let manager = MemoryConsistencyManager::new();
        for i in 0..1000 {
            let id = format!("u{}", i);
            manager.set_ryw_token(&id, RywPurpose::User, RywToken::new("t"));
            manager.resolve_conditions_with_id(&id);
        }
        assert_eq!(manager.tracked_ids(), 1000);

        for i in 0..1000 {
            manager.clear(&format!("u{}", i));
        }
        assert_eq!(manager.tracked_ids(), 0);
    }
}
