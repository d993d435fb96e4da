//! # usersync engine
//!
//! Operation executors for the usersync local-to-remote user sync.
//!
//! This crate provides:
//! - One executor per operation family (aliases, login, subscriptions,
//!   user updates, refresh, custom events)
//! - The merge engine that folds a group into one backend request
//! - Backend failure classification into the retry taxonomy
//! - The missing-retry window for freshly created records
//! - The rebuild advisor for users the backend has lost
//! - Local model stores with hydration-tagged change notification
//! - Backend traits and a scripted in-memory backend
//!
//! ## Architecture
//!
//! An external dispatcher groups queued operations and hands each group to
//! the executor that declares its kinds:
//! 1. The executor merges the group (last write wins, sums, appends)
//! 2. It issues at most one backend request
//! 3. On success it hydrates the local models and reports id translations
//! 4. On failure it classifies the error and decides retry, drop or rebuild
//!
//! ## Key Invariants
//!
//! - At most one network request per group
//! - Hydration only writes into models that still describe the same user
//! - Hydration writes are tagged so they are never synced back
//! - A malformed group is an error, never an execution result

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod config;
mod consistency;
mod error;
mod executor;
mod hydration;
mod merge;
mod mock;
pub mod models;
mod new_records;
mod rebuild;

pub use backend::{CustomEventBackend, IdentityBackend, SubscriptionBackend, UserBackend};
pub use config::{ConfigModel, ConfigModelStore};
pub use consistency::{ConsistencyManager, MemoryConsistencyManager, RywPurpose};
pub use error::{
    BackendError, BackendResult, ExecutorError, ExecutorResult, ResponseStatusType,
};
pub use executor::{
    CustomEventOperationExecutor, DeviceInfo, ExecutorContext, IdentityOperationExecutor,
    LoginUserFromSubscriptionOperationExecutor, LoginUserOperationExecutor, OperationExecutor,
    OperationGroup, RefreshUserOperationExecutor, SubscriptionOperationExecutor,
    UpdateUserOperationExecutor,
};
pub use hydration::{is_current, SubjectModel};
pub use merge::{
    cancels_create, effective_create, merge_aliases, merge_deltas, merge_properties,
    SubscriptionList,
};
pub use mock::{BackendCall, BackendMethod, MockBackend};
pub use new_records::{Clock, ManualClock, NewRecordsState, SystemClock};
pub use rebuild::{ModelRebuildService, RebuildUserService};
