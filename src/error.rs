//! Error types for layer and container orchestration.
//!
//! Every failure in the crate is an [`Error`]. The orchestration pipeline
//! cares less about the exact variant than about its [`ErrorClass`], which
//! decides whether a run aborts and whether acquired resources are unwound.

use std::fmt;
use std::path::PathBuf;

/// Result type alias for orchestration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure classification used by the orchestration driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Bad arguments or configuration. Raised before anything is acquired.
    Configuration,
    /// Missing network or unreadable layer metadata. Raised before any
    /// layer or container exists.
    Resolution,
    /// A layer, endpoint, container or process could not be acquired.
    Acquisition,
    /// The host failed while the workload was running.
    Runtime,
    /// An unwind step failed. Never fatal.
    Teardown,
    /// Raw collaborator failure, wrapped by the core before it escapes.
    Service,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Resolution => write!(f, "resolution"),
            Self::Acquisition => write!(f, "acquisition"),
            Self::Runtime => write!(f, "runtime"),
            Self::Teardown => write!(f, "teardown"),
            Self::Service => write!(f, "service"),
        }
    }
}

/// Unwind step that produced a [`Error::TeardownFailed`] warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeardownStep {
    /// Graceful container shutdown.
    Shutdown,
    /// Forceful container terminate.
    Terminate,
    /// Network endpoint deletion.
    DeleteEndpoint,
    /// Sandbox layer unprepare.
    UnprepareLayer,
    /// Sandbox layer deactivate.
    DeactivateLayer,
    /// Sandbox layer destroy.
    DestroyLayer,
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shutdown => write!(f, "shutdown"),
            Self::Terminate => write!(f, "terminate"),
            Self::DeleteEndpoint => write!(f, "delete endpoint"),
            Self::UnprepareLayer => write!(f, "unprepare layer"),
            Self::DeactivateLayer => write!(f, "deactivate layer"),
            Self::DestroyLayer => write!(f, "destroy layer"),
        }
    }
}

/// Errors that can occur while orchestrating a container.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Command line could not be parsed.
    #[error("usage: {0}")]
    Usage(String),

    /// Configuration or container descriptor is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Container ID failed validation.
    #[error("invalid container ID '{id}': {reason}")]
    InvalidContainerId { id: String, reason: String },

    /// Layer ID failed validation.
    #[error("invalid layer ID '{id}': {reason}")]
    InvalidLayerId { id: String, reason: String },

    /// Configuration file could not be read or parsed.
    #[error("failed to load configuration from {path}: {reason}")]
    ConfigLoad { path: PathBuf, reason: String },

    // =========================================================================
    // Resolution Errors
    // =========================================================================
    /// Base layer is unknown to the storage driver.
    #[error("base layer '{id}' unavailable: {reason}")]
    BaseLayerUnavailable { id: String, reason: String },

    /// Persisted layer chain exists but cannot be used.
    #[error("layer metadata at {path} is corrupt: {reason}")]
    StorageMetadataCorrupt { path: PathBuf, reason: String },

    /// No virtual network with the requested name is registered.
    #[error("virtual network not found: {0}")]
    NetworkNotFound(String),

    // =========================================================================
    // Acquisition Errors
    // =========================================================================
    /// Sandbox layer creation failed.
    #[error("failed to create layer '{id}': {reason}")]
    LayerCreateFailed { id: String, reason: String },

    /// Sandbox layer activation failed.
    #[error("failed to activate layer '{id}': {reason}")]
    LayerActivateFailed { id: String, reason: String },

    /// Sandbox layer preparation failed.
    #[error("failed to prepare layer '{id}': {reason}")]
    LayerPrepareFailed { id: String, reason: String },

    /// Sandbox layer mount path could not be resolved.
    #[error("failed to resolve mount path of layer '{id}': {reason}")]
    MountResolutionFailed { id: String, reason: String },

    /// Endpoint creation on a virtual network failed.
    #[error("failed to create endpoint on network '{network}': {reason}")]
    EndpointCreateFailed { network: String, reason: String },

    /// Container create failed.
    #[error("failed to create container '{id}': {reason}")]
    CreateFailed { id: String, reason: String },

    /// Container start failed.
    #[error("failed to start container '{id}': {reason}")]
    StartFailed { id: String, reason: String },

    /// Process launch inside the container failed.
    #[error("failed to launch process in container '{container}': {reason}")]
    ProcessLaunchFailed { container: String, reason: String },

    /// Container is in wrong state for operation.
    #[error("container '{id}' is in state '{state}', expected '{expected}'")]
    InvalidState {
        id: String,
        state: String,
        expected: String,
    },

    // =========================================================================
    // Runtime Errors
    // =========================================================================
    /// Waiting for the process failed on the host side.
    #[error("failed to wait for process {pid} in container '{container}': {reason}")]
    WaitFailed {
        container: String,
        pid: u32,
        reason: String,
    },

    // =========================================================================
    // Teardown Errors
    // =========================================================================
    /// An unwind step failed.
    #[error("{step} failed for '{resource}': {reason}")]
    TeardownFailed {
        step: TeardownStep,
        resource: String,
        reason: String,
    },

    // =========================================================================
    // Service Errors
    // =========================================================================
    /// Layer unknown to the storage driver.
    #[error("layer not found: {0}")]
    LayerNotFound(String),

    /// Endpoint unknown to the network service.
    #[error("endpoint not found: {0}")]
    EndpointNotFound(String),

    /// Container unknown to the compute service.
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// Host service call failed.
    #[error("{operation} failed: {reason}")]
    Host { operation: String, reason: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the class that drives the pipeline's response to this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Usage(_)
            | Self::InvalidConfig(_)
            | Self::InvalidContainerId { .. }
            | Self::InvalidLayerId { .. }
            | Self::ConfigLoad { .. } => ErrorClass::Configuration,

            Self::BaseLayerUnavailable { .. }
            | Self::StorageMetadataCorrupt { .. }
            | Self::NetworkNotFound(_) => ErrorClass::Resolution,

            Self::LayerCreateFailed { .. }
            | Self::LayerActivateFailed { .. }
            | Self::LayerPrepareFailed { .. }
            | Self::MountResolutionFailed { .. }
            | Self::EndpointCreateFailed { .. }
            | Self::CreateFailed { .. }
            | Self::StartFailed { .. }
            | Self::ProcessLaunchFailed { .. }
            | Self::InvalidState { .. } => ErrorClass::Acquisition,

            Self::WaitFailed { .. } => ErrorClass::Runtime,

            Self::TeardownFailed { .. } => ErrorClass::Teardown,

            Self::LayerNotFound(_)
            | Self::EndpointNotFound(_)
            | Self::ContainerNotFound(_)
            | Self::Host { .. }
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Internal(_) => ErrorClass::Service,
        }
    }

    /// Returns true if this error must abort the run.
    pub fn is_fatal(&self) -> bool {
        self.class() != ErrorClass::Teardown
    }

    /// Returns true if the collaborator reported the resource as already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::LayerNotFound(_) | Self::EndpointNotFound(_) | Self::ContainerNotFound(_)
        )
    }

    /// Shorthand for a failed host call.
    pub(crate) fn host(operation: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Host {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

// =============================================================================
// Teardown Report
// =============================================================================

/// Warnings collected while unwinding.
///
/// Each entry is an [`Error::TeardownFailed`]. Recording a warning also logs
/// it, so a report never needs to be printed for the operator to see it.
#[derive(Debug, Default)]
pub struct TeardownReport {
    warnings: Vec<Error>,
}

impl TeardownReport {
    /// Creates an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failed unwind step.
    pub fn record(&mut self, step: TeardownStep, resource: impl Into<String>, cause: &Error) {
        let resource = resource.into();
        tracing::warn!(%step, resource = %resource, error = %cause, "Teardown step failed");
        self.warnings.push(Error::TeardownFailed {
            step,
            resource,
            reason: cause.to_string(),
        });
    }

    /// Appends every warning of another report.
    pub fn merge(&mut self, other: TeardownReport) {
        self.warnings.extend(other.warnings);
    }

    /// Returns true if no unwind step failed.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Number of failed unwind steps.
    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    /// Returns true if the report holds no warnings.
    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Returns the recorded warnings in the order they occurred.
    pub fn warnings(&self) -> &[Error] {
        &self.warnings
    }

    /// Returns the steps that failed, in order.
    pub fn steps(&self) -> Vec<TeardownStep> {
        self.warnings
            .iter()
            .filter_map(|w| match w {
                Error::TeardownFailed { step, .. } => Some(*step),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teardown_is_not_fatal() {
        let err = Error::TeardownFailed {
            step: TeardownStep::Terminate,
            resource: "abc".to_string(),
            reason: "gone".to_string(),
        };
        assert!(!err.is_fatal());
        assert_eq!(err.class(), ErrorClass::Teardown);
        assert_eq!(err.to_string(), "terminate failed for 'abc': gone");
    }

    #[test]
    fn test_report_records_steps_in_order() {
        let mut report = TeardownReport::new();
        let cause = Error::LayerNotFound("l1".to_string());
        report.record(TeardownStep::UnprepareLayer, "l1", &cause);
        report.record(TeardownStep::DestroyLayer, "l1", &cause);

        assert_eq!(report.len(), 2);
        assert_eq!(
            report.steps(),
            vec![TeardownStep::UnprepareLayer, TeardownStep::DestroyLayer]
        );
        assert!(report.warnings()[0].to_string().contains("layer not found: l1"));
    }
}
