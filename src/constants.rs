//! # Orchestration Constants
//!
//! Defaults, on-disk names and identifier rules shared across the crate.
//! [`crate::config::OrchestratorConfig`] starts from these values; nothing
//! here is read at runtime as global state.

// =============================================================================
// Storage Driver Defaults
// =============================================================================

/// Default home directory of the Windows filter storage driver.
///
/// Every layer, base or sandbox, lives in `<home>/<layer-id>`.
pub const DEFAULT_HOME_DIR: &str = r"C:\ProgramData\docker\windowsfilter";

/// File holding a layer's persisted ancestor chain.
///
/// Format: JSON array of absolute ancestor paths, nearest parent first.
/// Base layers have no such file.
pub const LAYER_CHAIN_FILE: &str = "layerchain.json";

/// File holding the directory driver's per-layer lifecycle state.
pub const LAYER_STATE_FILE: &str = "hcsrun-layer.json";

/// Subdirectory that becomes the writable volume of a prepared layer.
pub const LAYER_MOUNT_DIR: &str = "mount";

// =============================================================================
// Container Defaults
// =============================================================================

/// Host system type for process-isolated containers.
pub const DEFAULT_SYSTEM_TYPE: &str = "Container";

/// Owner label recorded with every container.
pub const DEFAULT_OWNER: &str = "Garden";

/// Virtual network new endpoints attach to.
pub const DEFAULT_NETWORK: &str = "nat";

/// Command run inside the container.
pub const DEFAULT_COMMAND_LINE: &str = "ping 127.0.0.1";

/// Working directory of the command inside the container.
pub const DEFAULT_WORKING_DIRECTORY: &str = r"C:\";

// =============================================================================
// Content Identifiers
// =============================================================================

/// Namespace mixed into every derived layer GUID.
///
/// Changing this value changes every layer's content identifier and
/// invalidates host-side layer caches.
pub const LAYER_GUID_NAMESPACE: &[u8] = b"hcsrun/layer-guid";

/// Length of a generated container ID in hex characters.
pub const CONTAINER_ID_LEN: usize = 64;

/// Length of the short form of a container ID used in logs.
pub const SHORT_ID_LEN: usize = 12;

// =============================================================================
// Validation Patterns
// =============================================================================

/// Valid characters for container and layer IDs.
///
/// Excludes path separators and `.` so an ID is always a single path
/// component under the driver home directory.
pub const ID_VALID_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_";

/// Maximum container or layer ID length.
pub const MAX_ID_LEN: usize = 128;

/// Validates a container ID.
///
/// # Returns
///
/// `Ok(())` if valid, `Err(reason)` with a description of the failure.
#[inline]
#[must_use = "validation result must be checked to ensure container ID is safe"]
pub fn validate_container_id(id: &str) -> std::result::Result<(), &'static str> {
    validate_id(id, "container ID cannot be empty")
}

/// Validates a layer ID (the final path component of a layer folder).
#[inline]
#[must_use = "validation result must be checked to ensure layer ID is safe"]
pub fn validate_layer_id(id: &str) -> std::result::Result<(), &'static str> {
    validate_id(id, "layer ID cannot be empty")
}

fn validate_id(id: &str, empty: &'static str) -> std::result::Result<(), &'static str> {
    if id.is_empty() {
        return Err(empty);
    }
    if id.len() > MAX_ID_LEN {
        return Err("ID exceeds maximum length");
    }
    if !id.chars().all(|c| ID_VALID_CHARS.contains(c)) {
        return Err("ID contains invalid characters");
    }
    Ok(())
}
