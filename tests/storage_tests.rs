//! Tests for the directory-backed storage driver.
//!
//! Validates layer metadata reads, sandbox lifecycle transitions, mount path
//! resolution, and cleanup of vanished layers.

use hcsrun::{
    DirectoryDriver, Error, LAYER_CHAIN_FILE, LAYER_MOUNT_DIR, StorageDriver, resolve_chain,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn driver() -> (TempDir, DirectoryDriver) {
    let temp_dir = TempDir::new().unwrap();
    let driver = DirectoryDriver::with_path(temp_dir.path().join("layers")).unwrap();
    (temp_dir, driver)
}

fn base_layer(driver: &DirectoryDriver, id: &str) -> PathBuf {
    let path = driver.layer_path(id);
    fs::create_dir_all(&path).unwrap();
    path
}

fn write_chain(layer: &Path, ancestors: &[&Path]) {
    fs::write(
        layer.join(LAYER_CHAIN_FILE),
        serde_json::to_vec(&ancestors).unwrap(),
    )
    .unwrap();
}

// =============================================================================
// Driver Creation Tests
// =============================================================================

#[test]
fn test_driver_creates_home_dir() {
    let temp_dir = TempDir::new().unwrap();
    let home = temp_dir.path().join("deeply").join("nested").join("layers");

    let driver = DirectoryDriver::with_path(home.clone()).unwrap();

    assert!(home.is_dir(), "home directory should be created");
    assert_eq!(driver.home_dir(), home);
    assert_eq!(driver.layer_path("abc"), home.join("abc"));
}

// =============================================================================
// Layer Metadata Tests
// =============================================================================

#[test]
fn test_missing_chain_file_is_base_layer() {
    let (_temp, driver) = driver();
    let base = base_layer(&driver, "base");

    assert_eq!(driver.read_layer_metadata(&base).unwrap(), None);
}

#[test]
fn test_chain_file_read_in_order() {
    let (_temp, driver) = driver();
    let base = base_layer(&driver, "base");
    let mid = base_layer(&driver, "mid");
    let top = base_layer(&driver, "top");
    write_chain(&mid, &[&base]);
    write_chain(&top, &[&mid, &base]);

    assert_eq!(
        driver.read_layer_metadata(&top).unwrap(),
        Some(vec![mid.clone(), base.clone()])
    );

    let chain = resolve_chain(&driver, &top).unwrap();
    assert_eq!(chain.ids(), vec!["top", "mid", "base"]);
    assert_eq!(chain.head(), top);
}

#[test]
fn test_corrupt_chain_file() {
    let (_temp, driver) = driver();
    let layer = base_layer(&driver, "broken");
    fs::write(layer.join(LAYER_CHAIN_FILE), b"{not json").unwrap();

    let err = driver.read_layer_metadata(&layer).unwrap_err();
    assert!(matches!(err, Error::StorageMetadataCorrupt { .. }));
}

#[test]
fn test_unreadable_chain_file_is_corrupt() {
    let (_temp, driver) = driver();
    let layer = base_layer(&driver, "odd");
    // A directory where the chain file should be cannot be read as a file.
    fs::create_dir(layer.join(LAYER_CHAIN_FILE)).unwrap();

    let err = driver.read_layer_metadata(&layer).unwrap_err();
    assert!(matches!(err, Error::StorageMetadataCorrupt { .. }));
}

// =============================================================================
// Sandbox Lifecycle Tests
// =============================================================================

#[test]
fn test_full_sandbox_lifecycle() {
    let (_temp, driver) = driver();
    let base = base_layer(&driver, "base");
    let chain = vec![base.clone()];

    driver.create_layer("sbx", &base, &chain).unwrap();
    let sandbox = driver.layer_path("sbx");
    assert!(sandbox.is_dir());
    assert_eq!(driver.read_layer_metadata(&sandbox).unwrap(), Some(chain.clone()));
    assert_eq!(driver.mount_path("sbx").unwrap(), sandbox);

    driver.activate_layer("sbx").unwrap();
    driver.prepare_layer("sbx", &chain).unwrap();
    assert_eq!(driver.mount_path("sbx").unwrap(), sandbox.join(LAYER_MOUNT_DIR));
    assert!(sandbox.join(LAYER_MOUNT_DIR).is_dir());

    driver.unprepare_layer("sbx").unwrap();
    assert!(!sandbox.join(LAYER_MOUNT_DIR).exists());
    assert_eq!(driver.mount_path("sbx").unwrap(), sandbox);

    driver.deactivate_layer("sbx").unwrap();
    driver.destroy_layer("sbx").unwrap();
    assert!(!sandbox.exists());
    assert!(base.is_dir(), "base layer must survive");
}

#[test]
fn test_create_requires_parent() {
    let (_temp, driver) = driver();
    let missing = driver.layer_path("missing");

    let err = driver
        .create_layer("sbx", &missing, &[missing.clone()])
        .unwrap_err();
    assert!(matches!(err, Error::LayerNotFound(ref id) if id == "missing"));
    assert!(!driver.layer_path("sbx").exists());
}

#[test]
fn test_create_requires_parent_at_chain_head() {
    let (_temp, driver) = driver();
    let base = base_layer(&driver, "base");
    let other = base_layer(&driver, "other");

    assert!(driver.create_layer("sbx", &base, &[other]).is_err());
    assert!(driver.create_layer("sbx", &base, &[]).is_err());
}

#[test]
fn test_create_rejects_existing_layer() {
    let (_temp, driver) = driver();
    let base = base_layer(&driver, "base");
    driver.create_layer("sbx", &base, &[base.clone()]).unwrap();

    assert!(driver.create_layer("sbx", &base, &[base.clone()]).is_err());
}

#[test]
fn test_create_rejects_invalid_id() {
    let (_temp, driver) = driver();
    let base = base_layer(&driver, "base");

    let err = driver
        .create_layer("../escape", &base, &[base.clone()])
        .unwrap_err();
    assert!(matches!(err, Error::InvalidLayerId { .. }));
}

#[test]
fn test_prepare_requires_activation() {
    let (_temp, driver) = driver();
    let base = base_layer(&driver, "base");
    driver.create_layer("sbx", &base, &[base.clone()]).unwrap();

    assert!(driver.prepare_layer("sbx", &[base.clone()]).is_err());
}

#[test]
fn test_prepare_requires_chain_on_disk() {
    let (_temp, driver) = driver();
    let base = base_layer(&driver, "base");
    driver.create_layer("sbx", &base, &[base.clone()]).unwrap();
    driver.activate_layer("sbx").unwrap();
    fs::remove_dir_all(&base).unwrap();

    let err = driver.prepare_layer("sbx", &[base]).unwrap_err();
    assert!(matches!(err, Error::LayerNotFound(_)));
}

// =============================================================================
// Cleanup Tests
// =============================================================================

#[test]
fn test_operations_on_vanished_layer_report_not_found() {
    let (_temp, driver) = driver();

    for err in [
        driver.unprepare_layer("gone").unwrap_err(),
        driver.deactivate_layer("gone").unwrap_err(),
        driver.destroy_layer("gone").unwrap_err(),
        driver.mount_path("gone").unwrap_err(),
    ] {
        assert!(err.is_not_found(), "unexpected error: {err}");
    }
}

#[test]
fn test_destroy_twice_reports_not_found() {
    let (_temp, driver) = driver();
    let base = base_layer(&driver, "base");
    driver.create_layer("sbx", &base, &[base.clone()]).unwrap();

    driver.destroy_layer("sbx").unwrap();
    assert!(driver.destroy_layer("sbx").unwrap_err().is_not_found());
}

// =============================================================================
// Base Image Tests
// =============================================================================

#[test]
fn test_base_images_exclude_sandboxes() {
    let (_temp, driver) = driver();
    let base = base_layer(&driver, "base");
    base_layer(&driver, "another");
    driver.create_layer("sbx", &base, &[base.clone()]).unwrap();

    let ids: Vec<String> = driver
        .base_images()
        .unwrap()
        .into_iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(ids, vec!["another", "base"]);
}
