//! # Sandbox Layer Management
//!
//! A sandbox is the per-container writable layer stacked on a resolved base
//! chain. Bringing one up is four strictly ordered steps, and tearing it
//! down is their inverse:
//!
//! ```text
//!   create ──► activate ──► prepare ──► resolve mount
//!     ▲           ▲            ▲
//!  destroy ◄── deactivate ◄── unprepare
//! ```
//!
//! Bring-up stops at the first failing step. Teardown never stops: every
//! inverse step is attempted, and failures are collected in a
//! [`TeardownReport`].

use crate::error::{Error, TeardownReport, TeardownStep};
use crate::host::StorageDriver;
use crate::layer::LayerChain;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Furthest bring-up step a sandbox layer reached.
///
/// Ordered: a layer in `Prepared` has also been created and activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SandboxPhase {
    /// Layer folder exists.
    Created,
    /// Registered as live with the driver.
    Activated,
    /// Mountable.
    Prepared,
    /// Mount path resolved and checked.
    Mounted,
}

impl std::fmt::Display for SandboxPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Activated => write!(f, "activated"),
            Self::Prepared => write!(f, "prepared"),
            Self::Mounted => write!(f, "mounted"),
        }
    }
}

/// Writable layer owned by one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxLayer {
    id: String,
    path: PathBuf,
    mount_path: Option<PathBuf>,
    chain: LayerChain,
    phase: SandboxPhase,
}

impl SandboxLayer {
    /// Layer ID (equal to the container ID).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Layer folder.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writable volume; `None` until the layer is mounted.
    pub fn mount_path(&self) -> Option<&Path> {
        self.mount_path.as_deref()
    }

    /// Parent chain the layer was created on.
    pub fn parent_chain(&self) -> &LayerChain {
        &self.chain
    }

    /// Furthest bring-up step reached.
    pub fn phase(&self) -> SandboxPhase {
        self.phase
    }
}

/// Sandbox bring-up failure.
///
/// `partial` holds the layer as far as it got, if the create step itself
/// succeeded, so the caller can register it for unwind.
#[derive(Debug)]
pub struct SandboxFailure {
    /// The step failure.
    pub error: Error,
    /// The partially built layer.
    pub partial: Option<SandboxLayer>,
}

/// Creates and tears down sandbox layers through a [`StorageDriver`].
pub struct SandboxManager {
    storage: Arc<dyn StorageDriver>,
}

impl SandboxManager {
    /// Creates a manager over `storage`.
    pub fn new(storage: Arc<dyn StorageDriver>) -> Self {
        Self { storage }
    }

    /// Brings up a sandbox layer for `container_id` on `parent_chain`.
    ///
    /// The returned layer is in phase [`SandboxPhase::Mounted`] with a mount
    /// path that is non-empty and distinct from every parent layer.
    pub fn create_sandbox(
        &self,
        container_id: &str,
        parent_chain: &LayerChain,
    ) -> std::result::Result<SandboxLayer, SandboxFailure> {
        let fail = |error: Error, partial: Option<&SandboxLayer>| SandboxFailure {
            error,
            partial: partial.cloned(),
        };
        let id = container_id.to_string();

        self.storage
            .create_layer(container_id, parent_chain.head(), parent_chain.paths())
            .map_err(|e| {
                fail(
                    Error::LayerCreateFailed {
                        id: id.clone(),
                        reason: e.to_string(),
                    },
                    None,
                )
            })?;

        let mut layer = SandboxLayer {
            id: id.clone(),
            path: self.storage.layer_path(container_id),
            mount_path: None,
            chain: parent_chain.clone(),
            phase: SandboxPhase::Created,
        };
        debug!(layer = %id, parent = %parent_chain.head().display(), "Sandbox layer created");

        if let Err(e) = self.storage.activate_layer(container_id) {
            return Err(fail(
                Error::LayerActivateFailed {
                    id,
                    reason: e.to_string(),
                },
                Some(&layer),
            ));
        }
        layer.phase = SandboxPhase::Activated;

        if let Err(e) = self
            .storage
            .prepare_layer(container_id, parent_chain.paths())
        {
            return Err(fail(
                Error::LayerPrepareFailed {
                    id,
                    reason: e.to_string(),
                },
                Some(&layer),
            ));
        }
        layer.phase = SandboxPhase::Prepared;

        let mount_path = match self.storage.mount_path(container_id) {
            Ok(path) => path,
            Err(e) => {
                return Err(fail(
                    Error::MountResolutionFailed {
                        id,
                        reason: e.to_string(),
                    },
                    Some(&layer),
                ));
            }
        };
        if mount_path.as_os_str().is_empty() {
            return Err(fail(
                Error::MountResolutionFailed {
                    id,
                    reason: "driver returned an empty mount path".to_string(),
                },
                Some(&layer),
            ));
        }
        if parent_chain.contains(&mount_path) {
            return Err(fail(
                Error::MountResolutionFailed {
                    id,
                    reason: format!(
                        "mount path {} is a parent layer",
                        mount_path.display()
                    ),
                },
                Some(&layer),
            ));
        }

        layer.mount_path = Some(mount_path);
        layer.phase = SandboxPhase::Mounted;
        info!(
            layer = %layer.id,
            volume = %layer.mount_path().unwrap_or(Path::new("")).display(),
            "Sandbox layer ready"
        );
        Ok(layer)
    }

    /// Tears down a fully built sandbox layer by ID.
    ///
    /// Unprepare, deactivate and destroy are each attempted regardless of
    /// earlier failures.
    pub fn destroy_sandbox(&self, container_id: &str) -> TeardownReport {
        self.unwind(container_id, SandboxPhase::Mounted)
    }

    /// Tears down `layer`, running only the inverse of steps it reached.
    pub fn teardown(&self, layer: &SandboxLayer) -> TeardownReport {
        self.unwind(&layer.id, layer.phase)
    }

    fn unwind(&self, id: &str, reached: SandboxPhase) -> TeardownReport {
        let mut report = TeardownReport::new();

        if reached >= SandboxPhase::Prepared
            && let Err(e) = self.storage.unprepare_layer(id)
        {
            report.record(TeardownStep::UnprepareLayer, id, &e);
        }
        if reached >= SandboxPhase::Activated
            && let Err(e) = self.storage.deactivate_layer(id)
        {
            report.record(TeardownStep::DeactivateLayer, id, &e);
        }
        if let Err(e) = self.storage.destroy_layer(id) {
            report.record(TeardownStep::DestroyLayer, id, &e);
        }

        if report.is_clean() {
            debug!(layer = %id, "Sandbox layer destroyed");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_ordering() {
        assert!(SandboxPhase::Created < SandboxPhase::Activated);
        assert!(SandboxPhase::Activated < SandboxPhase::Prepared);
        assert!(SandboxPhase::Prepared < SandboxPhase::Mounted);
        assert_eq!(SandboxPhase::Prepared.to_string(), "prepared");
    }
}
