//! Tests for constants and identifier handling.
//!
//! Validates ID validation, generated container IDs, and deterministic
//! layer GUIDs.

use hcsrun::{
    CONTAINER_ID_LEN, MAX_ID_LEN, SHORT_ID_LEN, generate_container_id, layer_guid, short_id,
    validate_container_id, validate_layer_id,
};
use std::collections::HashSet;

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_valid_ids() {
    assert!(validate_layer_id("windowsservercore").is_ok());
    assert!(validate_layer_id("a1b2_c3-d4").is_ok());
    assert!(validate_container_id(&generate_container_id()).is_ok());
    assert!(validate_layer_id(&"x".repeat(MAX_ID_LEN)).is_ok());
}

#[test]
fn test_invalid_ids() {
    for id in ["", ".", "..", "a/b", r"a\b", "a b", "C:"] {
        assert!(validate_layer_id(id).is_err(), "{id:?} should be rejected");
    }
    assert!(validate_layer_id(&"x".repeat(MAX_ID_LEN + 1)).is_err());
}

// =============================================================================
// Container ID Tests
// =============================================================================

#[test]
fn test_generated_ids_are_unique_hex() {
    let ids: HashSet<String> = (0..64).map(|_| generate_container_id()).collect();

    assert_eq!(ids.len(), 64);
    for id in &ids {
        assert_eq!(id.len(), CONTAINER_ID_LEN);
        assert!(id.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        assert_eq!(short_id(id).len(), SHORT_ID_LEN);
        assert!(!short_id(id).chars().all(|c| c.is_ascii_digit()));
    }
}

// =============================================================================
// Layer GUID Tests
// =============================================================================

#[test]
fn test_layer_guid_deterministic() {
    assert_eq!(layer_guid("base"), layer_guid("base"));
    assert_ne!(layer_guid("base"), layer_guid("Base"));
}

#[test]
fn test_layer_guid_version_and_variant() {
    let guid = layer_guid("nanoserver");
    assert_eq!(guid.get_version_num(), 5);
    assert_eq!(guid.get_variant(), uuid::Variant::RFC4122);
}
