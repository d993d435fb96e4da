//! Custom event executor.

use super::{ensure_single, ensure_supported, failure, OperationExecutor, OperationGroup};
use crate::backend::CustomEventBackend;
use crate::error::{ExecutorError, ExecutorResult, ResponseStatusType};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use usersync_protocol::{
    EventMetadata, ExecutionResponse, ExecutionResult, Operation, OperationKind, TrackEvent,
};

const NAME: &str = "CustomEventOperationExecutor";
const OPERATIONS: &[OperationKind] = &[OperationKind::TrackEvent];

/// Describes the device and host app, for event metadata.
pub trait DeviceInfo: Send + Sync {
    /// Platform family, e.g. `"android"`.
    fn device_type(&self) -> String;
    /// Version of this SDK.
    fn sdk_version(&self) -> String;
    /// Version of the host app, if known.
    fn app_version(&self) -> Option<String>;
    /// Device model.
    fn device_model(&self) -> String;
    /// Operating system version.
    fn device_os(&self) -> String;
}

/// Sends one [`TrackEvent`] per group.
pub struct CustomEventOperationExecutor {
    backend: Arc<dyn CustomEventBackend>,
    metadata: EventMetadata,
}

impl CustomEventOperationExecutor {
    /// Creates the executor. Device metadata is read once, here.
    pub fn new(backend: Arc<dyn CustomEventBackend>, device: &dyn DeviceInfo) -> Self {
        Self {
            backend,
            metadata: EventMetadata {
                device_type: device.device_type(),
                sdk: device.sdk_version(),
                app_version: device.app_version(),
                device_model: device.device_model(),
                device_os: device.device_os(),
            },
        }
    }

    /// Metadata attached to every event.
    pub fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    async fn send(&self, op: &TrackEvent) -> ExecutionResponse {
        let result = self
            .backend
            .send_custom_event(
                &op.app_id,
                &op.onesignal_id,
                op.external_id.as_deref(),
                op.timestamp_millis,
                &op.name,
                op.properties.as_ref(),
                &self.metadata,
            )
            .await;

        match result {
            Ok(()) => ExecutionResponse::success(),
            Err(error) => {
                let status = error.status_type();
                warn!("custom event {} failed: {} ({:?})", op.name, error, status);
                match status {
                    ResponseStatusType::Retryable => failure(ExecutionResult::FailRetry, &error),
                    _ => failure(ExecutionResult::FailNoRetry, &error),
                }
            }
        }
    }
}

#[async_trait]
impl OperationExecutor for CustomEventOperationExecutor {
    fn operations(&self) -> &'static [OperationKind] {
        OPERATIONS
    }

    async fn execute(&self, group: &OperationGroup) -> ExecutorResult<ExecutionResponse> {
        ensure_supported(NAME, OPERATIONS, group)?;
        // TODO: batch events once the backend accepts more than one per request.
        ensure_single(NAME, group)?;
        debug!("{}: executing", NAME);

        match group.first() {
            Operation::TrackEvent(op) => Ok(self.send(op).await),
            other => Err(ExecutorError::UnsupportedOperation {
                executor: NAME,
                kind: other.kind(),
            }),
        }
    }
}
