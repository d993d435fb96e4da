//! Tolerance window for records the backend may not have replicated yet.
//!
//! Right after a create, reads and writes against the new record can land on
//! a backend replica that has not seen it and come back 404. Ids created here
//! are remembered with their creation time so executors can tell that lag
//! apart from a record that is really gone.

use crate::config::ConfigModelStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of wall-clock time in milliseconds.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a clock reading `now_millis`.
    pub fn new(now_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(now_millis),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Recently created record ids and when they were created.
pub struct NewRecordsState {
    config: Arc<ConfigModelStore>,
    clock: Arc<dyn Clock>,
    records: RwLock<HashMap<String, u64>>,
}

impl NewRecordsState {
    /// Creates an empty state using the system clock.
    pub fn new(config: Arc<ConfigModelStore>) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates an empty state reading time from `clock`.
    pub fn with_clock(config: Arc<ConfigModelStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Records `id` as created now. An id already present keeps its
    /// original creation time.
    pub fn add(&self, id: impl Into<String>) {
        let now = self.clock.now_millis();
        let mut records = self.records.write();
        self.prune(&mut records, now);
        records.entry(id.into()).or_insert(now);
    }

    /// Returns true if a not-found for `id` is still inside the window in
    /// which it is attributed to replication lag.
    pub fn is_in_missing_retry_window(&self, id: &str) -> bool {
        let window = self.config.missing_retry_window();
        self.age_of(id).is_some_and(|age| age < window.as_millis() as u64)
    }

    /// Returns true once `id` is older than the post-create delay, or was
    /// never created here.
    pub fn can_access(&self, id: &str) -> bool {
        let delay = self.config.post_create_delay();
        self.age_of(id)
            .map_or(true, |age| age >= delay.as_millis() as u64)
    }

    /// Number of ids currently remembered.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if no ids are remembered.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn age_of(&self, id: &str) -> Option<u64> {
        let created_at = *self.records.read().get(id)?;
        Some(self.clock.now_millis().saturating_sub(created_at))
    }

    fn prune(&self, records: &mut HashMap<String, u64>, now: u64) {
        let keep_for = self
            .config
            .missing_retry_window()
            .max(self.config.post_create_delay())
            .as_millis() as u64;
        records.retain(|_, created_at| now.saturating_sub(*created_at) < keep_for);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigModel;

    fn state(window: Duration) -> (NewRecordsState, Arc<ManualClock>, Arc<ConfigModelStore>) {
        let config = Arc::new(ConfigModelStore::new(
            ConfigModel::new("app")
                .with_missing_retry_window(window)
                .with_post_create_delay(Duration::from_secs(5)),
        ));
        let clock = Arc::new(ManualClock::new(1_000_000));
        let state = NewRecordsState::with_clock(Arc::clone(&config), clock.clone());
        (state, clock, config)
    }

    #[test]
    fn unknown_ids_are_outside_the_window() {
        let (state, _, _) = state(Duration::from_secs(60));
        assert!(!state.is_in_missing_retry_window("u1"));
        assert!(state.can_access("u1"));
    }

    #[test]
    fn window_expires() {
        let (state, clock, _) = state(Duration::from_secs(60));
        state.add("u1");
        assert!(state.is_in_missing_retry_window("u1"));

        clock.advance(Duration::from_millis(59_999));
        assert!(state.is_in_missing_retry_window("u1"));

        clock.advance(Duration::from_millis(1));
        assert!(!state.is_in_missing_retry_window("u1"));
    }

    #[test]
    fn window_follows_remote_config() {
        let (state, clock, config) = state(Duration::from_secs(60));
        state.add("u1");
        clock.advance(Duration::from_secs(20));
        assert!(state.is_in_missing_retry_window("u1"));

        config.update(|c| c.missing_retry_window = Duration::from_secs(10));
        assert!(!state.is_in_missing_retry_window("u1"));
    }

    #[test]
    fn post_create_delay() {
        let (state, clock, _) = state(Duration::from_secs(60));
        state.add("u1");
        assert!(!state.can_access("u1"));
        clock.advance(Duration::from_secs(5));
        assert!(state.can_access("u1"));
    }

    #[test]
    fn re_adding_keeps_creation_time() {
        let (state, clock, _) = state(Duration::from_secs(60));
        state.add("u1");
        clock.advance(Duration::from_secs(50));
        state.add("u1");
        clock.advance(Duration::from_secs(10));
        assert!(!state.is_in_missing_retry_window("u1"));
    }

    #[test]
    fn expired_entries_are_pruned_on_add() {
        let (state, clock, _) = state(Duration::from_secs(60));
        state.add("u1");
        clock.advance(Duration::from_secs(61));
        state.add("u2");
        assert_eq!(state.len(), 1);
        assert!(state.is_in_missing_retry_window("u2"));
    }
}
