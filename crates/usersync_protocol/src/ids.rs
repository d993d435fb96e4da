//! Local id generation and well-known alias labels.

use uuid::Uuid;

/// Prefix carried by every id generated on the device.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Well-known alias labels.
pub struct IdentityConstants;

impl IdentityConstants {
    /// Alias label holding the backend-issued user id.
    pub const ONESIGNAL_ID: &'static str = "onesignal_id";
    /// Alias label holding the application's own user id.
    pub const EXTERNAL_ID: &'static str = "external_id";
}

/// Generates a new local id.
///
/// Local ids stand in for backend-issued ids until the create that owns them
/// has been executed and an id translation is available.
pub fn create_local_id() -> String {
    format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4())
}

/// Returns true if the id was generated on the device.
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}
