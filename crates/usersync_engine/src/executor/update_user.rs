//! Property, tag and telemetry executor.

use super::{
    ensure_single_subject, ensure_supported, failure, ExecutorContext, OperationExecutor,
    OperationGroup,
};
use crate::backend::UserBackend;
use crate::consistency::RywPurpose;
use crate::error::{ExecutorResult, ResponseStatusType};
use crate::merge::{merge_deltas, merge_properties};
use crate::models::ChangeTag;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use usersync_protocol::{ExecutionResponse, ExecutionResult, Operation, OperationKind};

const NAME: &str = "UpdateUserOperationExecutor";
const OPERATIONS: &[OperationKind] = &[
    OperationKind::SetTag,
    OperationKind::DeleteTag,
    OperationKind::SetProperty,
    OperationKind::TrackSessionStart,
    OperationKind::TrackSessionEnd,
    OperationKind::TrackPurchase,
];

/// Sends a user's tag, property, session and purchase changes as one update.
pub struct UpdateUserOperationExecutor {
    backend: Arc<dyn UserBackend>,
    context: Arc<ExecutorContext>,
}

impl UpdateUserOperationExecutor {
    /// Creates the executor.
    pub fn new(backend: Arc<dyn UserBackend>, context: Arc<ExecutorContext>) -> Self {
        Self { backend, context }
    }

    /// Re-applies each tag and property operation to the local model; the
    /// backend does not echo the merged values.
    fn hydrate(&self, onesignal_id: &str, group: &OperationGroup) {
        let applied = self
            .context
            .properties
            .update_if_current(onesignal_id, ChangeTag::Hydrate, |m| {
                group
                    .iter()
                    .filter_map(|op| match op {
                        Operation::SetTag(op) => Some(m.set_tag(op.key.clone(), op.value.clone())),
                        Operation::DeleteTag(op) => Some(m.remove_tag(&op.key)),
                        Operation::SetProperty(op) => Some(m.set_property(&op.property)),
                        _ => None,
                    })
                    .collect()
            });
        if !applied {
            debug!("user {} is no longer current, properties not hydrated", onesignal_id);
        }
    }
}

#[async_trait]
impl OperationExecutor for UpdateUserOperationExecutor {
    fn operations(&self) -> &'static [OperationKind] {
        OPERATIONS
    }

    async fn execute(&self, group: &OperationGroup) -> ExecutorResult<ExecutionResponse> {
        ensure_supported(NAME, OPERATIONS, group)?;
        ensure_single_subject(group)?;

        let app_id = group.first().app_id();
        let onesignal_id = group.first().onesignal_id();
        debug!("{}: executing {} operations for {}", NAME, group.len(), onesignal_id);

        let properties = merge_properties(group);
        let deltas = merge_deltas(group);
        let refresh_device_metadata = group
            .iter()
            .any(|op| matches!(op, Operation::TrackSessionStart(_)));

        let result = self
            .backend
            .update_user(app_id, onesignal_id, properties, refresh_device_metadata, deltas)
            .await;

        match result {
            Ok(token) => {
                match token {
                    Some(token) => {
                        self.context
                            .consistency
                            .set_ryw_token(onesignal_id, RywPurpose::User, token)
                    }
                    None => self.context.consistency.resolve_conditions_with_id(onesignal_id),
                }
                self.hydrate(onesignal_id, group);
                Ok(ExecutionResponse::success())
            }
            Err(error) => {
                let status = error.status_type();
                warn!("update user {} failed: {} ({:?})", onesignal_id, error, status);
                Ok(match status {
                    ResponseStatusType::Retryable => failure(ExecutionResult::FailRetry, &error),
                    ResponseStatusType::Unauthorized => {
                        failure(ExecutionResult::FailUnauthorized, &error)
                    }
                    ResponseStatusType::Missing => self.context.missing_response(
                        app_id,
                        onesignal_id,
                        onesignal_id,
                        &error,
                    ),
                    _ => failure(ExecutionResult::FailNoRetry, &error),
                })
            }
        }
    }
}
