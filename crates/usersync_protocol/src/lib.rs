//! # usersync protocol
//!
//! Operation and payload types shared by the usersync executors.
//!
//! This crate provides:
//! - `Operation`, the closed set of queued local mutations
//! - Grouping metadata the dispatcher uses to batch operations
//! - `ExecutionResult` / `ExecutionResponse` returned by executors
//! - Backend request and response objects (serde)
//! - Local id helpers
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod ids;
mod objects;
mod operation;
mod response;
mod subscription;

pub use ids::{create_local_id, is_local_id, IdentityConstants, LOCAL_ID_PREFIX};
pub use objects::{
    EventMetadata, PropertiesDeltasObject, PropertiesObject, PurchaseObject, RywToken,
    SubscriptionObject, UserProperties, UserResponse,
};
pub use operation::{
    CreateSubscription, DeleteAlias, DeleteSubscription, DeleteTag, GroupComparisonType,
    LoginUser, LoginUserFromSubscription, Operation, OperationKind, PurchaseInfo, RefreshUser,
    SetAlias, SetProperty, SetTag, TrackEvent, TrackPurchase, TrackSessionEnd, TrackSessionStart,
    UnknownOperationKind, UpdateSubscription, UserProperty,
};
pub use response::{ExecutionResponse, ExecutionResult};
pub use subscription::{SubscriptionStatus, SubscriptionType};
