//! # usersync testkit
//!
//! Test utilities for usersync.
//!
//! This crate provides:
//! - Operation builders with fixed app and user ids
//! - A harness wiring model stores, a scripted backend and every executor
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use usersync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn tag_is_synced() {
//!     let harness = Harness::new(USER_ID);
//!     let response = harness.execute(vec![set_tag(USER_ID, "level", "3")]).await;
//!     assert_eq!(response.result, ExecutionResult::Success);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use usersync_protocol::{ExecutionResponse, ExecutionResult, Operation, OperationKind};
}

pub use fixtures::*;
pub use generators::*;
