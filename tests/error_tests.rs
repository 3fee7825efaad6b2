//! Tests for error types.
//!
//! Validates display formatting, class mapping, and teardown report
//! accumulation.

use hcsrun::{Error, ErrorClass, TeardownReport, TeardownStep};
use std::path::PathBuf;

// =============================================================================
// Display Tests
// =============================================================================

#[test]
fn test_network_not_found_display() {
    let err = Error::NetworkNotFound("nat".to_string());
    let msg = format!("{}", err);

    assert!(msg.contains("nat"), "should include network name");
    assert!(msg.contains("not found"), "should indicate not found");
}

#[test]
fn test_metadata_corrupt_display() {
    let err = Error::StorageMetadataCorrupt {
        path: PathBuf::from("/layers/top"),
        reason: "expected array".to_string(),
    };
    let msg = err.to_string();

    assert!(msg.contains("/layers/top"));
    assert!(msg.contains("expected array"));
}

#[test]
fn test_teardown_display() {
    let err = Error::TeardownFailed {
        step: TeardownStep::DeleteEndpoint,
        resource: "ep-1".to_string(),
        reason: "endpoint not found: ep-1".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "delete endpoint failed for 'ep-1': endpoint not found: ep-1"
    );
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err: Error = io.into();

    assert!(matches!(err, Error::Io(_)));
    assert!(err.to_string().contains("denied"));
}

#[test]
fn test_json_error_conversion() {
    let json = serde_json::from_str::<Vec<String>>("{").unwrap_err();
    let err: Error = json.into();
    assert!(matches!(err, Error::Serialization(_)));
}

// =============================================================================
// Class Tests
// =============================================================================

#[test]
fn test_error_classes() {
    let s = || "x".to_string();
    let cases = [
        (Error::Usage(s()), ErrorClass::Configuration),
        (Error::InvalidConfig(s()), ErrorClass::Configuration),
        (
            Error::InvalidLayerId { id: s(), reason: s() },
            ErrorClass::Configuration,
        ),
        (
            Error::BaseLayerUnavailable { id: s(), reason: s() },
            ErrorClass::Resolution,
        ),
        (Error::NetworkNotFound(s()), ErrorClass::Resolution),
        (
            Error::LayerPrepareFailed { id: s(), reason: s() },
            ErrorClass::Acquisition,
        ),
        (
            Error::EndpointCreateFailed { network: s(), reason: s() },
            ErrorClass::Acquisition,
        ),
        (
            Error::ProcessLaunchFailed { container: s(), reason: s() },
            ErrorClass::Acquisition,
        ),
        (
            Error::WaitFailed { container: s(), pid: 4, reason: s() },
            ErrorClass::Runtime,
        ),
        (
            Error::TeardownFailed {
                step: TeardownStep::DestroyLayer,
                resource: s(),
                reason: s(),
            },
            ErrorClass::Teardown,
        ),
        (Error::LayerNotFound(s()), ErrorClass::Service),
        (Error::Internal(s()), ErrorClass::Service),
    ];

    for (err, class) in cases {
        assert_eq!(err.class(), class, "{err}");
        assert_eq!(err.is_fatal(), class != ErrorClass::Teardown, "{err}");
    }
}

#[test]
fn test_not_found_errors() {
    assert!(Error::LayerNotFound("l".to_string()).is_not_found());
    assert!(Error::EndpointNotFound("e".to_string()).is_not_found());
    assert!(Error::ContainerNotFound("c".to_string()).is_not_found());
    assert!(!Error::NetworkNotFound("n".to_string()).is_not_found());
}

// =============================================================================
// Teardown Report Tests
// =============================================================================

#[test]
fn test_empty_report_is_clean() {
    let report = TeardownReport::new();
    assert!(report.is_clean());
    assert!(report.is_empty());
    assert_eq!(report.len(), 0);
}

#[test]
fn test_merge_preserves_order() {
    let cause = Error::ContainerNotFound("c1".to_string());
    let mut first = TeardownReport::new();
    first.record(TeardownStep::Shutdown, "c1", &cause);
    let mut second = TeardownReport::new();
    second.record(TeardownStep::Terminate, "c1", &cause);
    second.record(TeardownStep::DeleteEndpoint, "ep", &cause);

    first.merge(second);

    assert_eq!(
        first.steps(),
        vec![
            TeardownStep::Shutdown,
            TeardownStep::Terminate,
            TeardownStep::DeleteEndpoint
        ]
    );
    assert!(first.warnings().iter().all(|w| !w.is_fatal()));
}
