//! Tests for orchestrator configuration.
//!
//! Validates defaults, JSON file loading, environment overrides, and
//! validation of required values.

use hcsrun::config::{COMMAND_ENV, HOME_ENV, NETWORK_ENV};
use hcsrun::{
    DEFAULT_COMMAND_LINE, DEFAULT_HOME_DIR, DriverFlavour, Error, ErrorClass, OrchestratorConfig,
};
use std::collections::HashMap;
use std::path::PathBuf;
use tempfile::TempDir;

// =============================================================================
// Default Tests
// =============================================================================

#[test]
fn test_defaults() {
    let config = OrchestratorConfig::default();

    assert_eq!(config.driver.home_dir, PathBuf::from(DEFAULT_HOME_DIR));
    assert_eq!(config.driver.flavour, DriverFlavour::Filter);
    assert_eq!(config.network, "nat");
    assert_eq!(config.owner, "Garden");
    assert_eq!(config.system_type, "Container");
    assert!(config.ignore_flushes_during_boot);
    assert_eq!(config.process.command_line, DEFAULT_COMMAND_LINE);
    assert_eq!(config.process.working_directory, r"C:\");
    assert!(config.collect_statistics);
    assert_eq!(config.simulation.networks, vec!["nat"]);
    assert!(config.validate().is_ok());
}

// =============================================================================
// File Loading Tests
// =============================================================================

#[test]
fn test_partial_file_keeps_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{
            "network": "transparent",
            "driver": { "flavour": "vfs" },
            "process": { "command_line": "cmd /c exit 3" },
            "simulation": { "exit_code": 3 }
        }"#,
    )
    .unwrap();

    let config = OrchestratorConfig::from_file(&path).unwrap();

    assert_eq!(config.network, "transparent");
    assert_eq!(config.driver.flavour, DriverFlavour::Vfs);
    assert_eq!(config.driver.home_dir, PathBuf::from(DEFAULT_HOME_DIR));
    assert_eq!(config.process.command_line, "cmd /c exit 3");
    assert_eq!(config.process.working_directory, r"C:\");
    assert_eq!(config.simulation.exit_code, 3);
    assert_eq!(config.owner, "Garden");
}

#[test]
fn test_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("absent.json");

    let err = OrchestratorConfig::from_file(&path).unwrap_err();
    assert!(matches!(err, Error::ConfigLoad { path: ref p, .. } if *p == path));
    assert_eq!(err.class(), ErrorClass::Configuration);
}

#[test]
fn test_malformed_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    std::fs::write(&path, "{ network: nat }").unwrap();

    assert!(matches!(
        OrchestratorConfig::from_file(&path),
        Err(Error::ConfigLoad { .. })
    ));
}

// =============================================================================
// Override Tests
// =============================================================================

#[test]
fn test_environment_overrides() {
    let env: HashMap<&str, &str> = [
        (HOME_ENV, "/srv/layers"),
        (NETWORK_ENV, "l2bridge"),
        (COMMAND_ENV, "cmd /c echo hi"),
    ]
    .into();
    let mut config = OrchestratorConfig::default();

    config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

    assert_eq!(config.driver.home_dir, PathBuf::from("/srv/layers"));
    assert_eq!(config.network, "l2bridge");
    assert_eq!(config.process.command_line, "cmd /c echo hi");
}

#[test]
fn test_no_overrides() {
    let mut config = OrchestratorConfig::default();
    config.apply_overrides(|_| None);
    assert_eq!(config, OrchestratorConfig::default());
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_validation_rejects_empty_values() {
    type Mutation = fn(&mut OrchestratorConfig);
    let cases: [(&str, Mutation); 6] = [
        ("driver home", |c: &mut OrchestratorConfig| c.driver.home_dir = PathBuf::new()),
        ("network", |c: &mut OrchestratorConfig| c.network.clear()),
        ("owner", |c: &mut OrchestratorConfig| c.owner = "  ".to_string()),
        ("system type", |c: &mut OrchestratorConfig| c.system_type.clear()),
        ("command line", |c: &mut OrchestratorConfig| {
            c.process.command_line.clear()
        }),
        ("working directory", |c: &mut OrchestratorConfig| {
            c.process.working_directory.clear()
        }),
    ];

    for (name, mutate) in cases {
        let mut config = OrchestratorConfig::default();
        mutate(&mut config);
        match config.validate() {
            Err(Error::InvalidConfig(msg)) => assert!(msg.contains(name), "{msg}"),
            other => panic!("{name}: unexpected {other:?}"),
        }
    }
}

#[test]
fn test_orchestrator_rejects_invalid_config() {
    let host = hcsrun::SimulatedHost::new("/layers");
    let config = OrchestratorConfig {
        network: String::new(),
        ..OrchestratorConfig::default()
    };

    assert!(matches!(
        host.orchestrator(config),
        Err(Error::InvalidConfig(_))
    ));
}
