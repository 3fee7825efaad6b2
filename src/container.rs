//! # Container Lifecycle
//!
//! Builds the container descriptor handed to the compute host and drives one
//! container through its lifecycle:
//!
//! ```text
//!                 build        start                run_process
//! Unconfigured ─────────► Created ─────► Started ──────────────► Running
//!                                           ▲                       │
//!                                           │        wait           │
//!                                           └──── Exited(code) ◄────┘
//!
//!   stop: shutdown ──► terminate          (from any phase after build)
//! ```
//!
//! A failed `start` leaves the container in `Created`. A non-zero exit code
//! is a result of `wait`, not an error.

use crate::config::{OrchestratorConfig, ProcessConfig};
use crate::constants::{CONTAINER_ID_LEN, LAYER_GUID_NAMESPACE, SHORT_ID_LEN};
use crate::error::{Error, Result, TeardownReport, TeardownStep};
use crate::host::{ComputeService, ContainerHandle, ContainerStatistics, Endpoint, ProcessHandle};
use crate::layer::{LayerChain, layer_id};
use crate::sandbox::SandboxLayer;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

// =============================================================================
// Identifiers
// =============================================================================

/// Generates a fresh container ID: 64 lowercase hex characters.
///
/// IDs whose short form is all digits are skipped so a short ID is never
/// mistaken for a number.
pub fn generate_container_id() -> String {
    loop {
        let seed = Uuid::new_v4();
        let id = hex::encode(Sha256::digest(seed.as_bytes()));
        debug_assert_eq!(id.len(), CONTAINER_ID_LEN);
        if !short_id(&id).chars().all(|c| c.is_ascii_digit()) {
            return id;
        }
    }
}

/// Returns the short form of an ID used in log lines.
pub fn short_id(id: &str) -> &str {
    id.get(..SHORT_ID_LEN).unwrap_or(id)
}

/// Derives the content identifier of a layer from its layer ID.
///
/// The GUID is name-based: the first 16 bytes of
/// `SHA-256(namespace || layer_id)` with RFC 4122 version 5 and variant bits.
/// The same layer ID always yields the same GUID.
pub fn layer_guid(layer_id: &str) -> Uuid {
    let mut hasher = Sha256::new();
    hasher.update(LAYER_GUID_NAMESPACE);
    hasher.update(layer_id.as_bytes());
    let hash = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);
    bytes[6] = (bytes[6] & 0x0F) | 0x50;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;

    Uuid::from_bytes(bytes)
}

// =============================================================================
// Container Config
// =============================================================================

/// One entry of a container's layer list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRef {
    /// Content identifier derived from the layer ID.
    #[serde(rename = "ID")]
    pub id: String,
    /// Layer folder.
    #[serde(rename = "Path")]
    pub path: PathBuf,
}

impl LayerRef {
    /// Entry for the layer at `path`.
    pub fn for_path(path: &Path) -> Self {
        Self {
            id: layer_guid(&layer_id(path)).to_string(),
            path: path.to_path_buf(),
        }
    }
}

/// Container descriptor registered with the compute host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    /// Host system type.
    pub system_type: String,
    /// Container ID.
    pub name: String,
    /// Owner label.
    pub owner: String,
    /// Sandbox layer folder.
    pub layer_folder_path: PathBuf,
    /// Sandbox writable volume.
    pub volume_path: PathBuf,
    /// Skip guest flushes during boot.
    pub ignore_flushes_during_boot: bool,
    /// Parent layers, in chain order.
    pub layers: Vec<LayerRef>,
    /// Attached endpoint IDs.
    pub endpoint_list: Vec<String>,
}

impl ContainerConfig {
    /// Builds the descriptor of a container running on `sandbox`.
    ///
    /// The layer list mirrors the chain the sandbox was prepared against,
    /// entry for entry.
    pub fn for_sandbox(
        config: &OrchestratorConfig,
        sandbox: &SandboxLayer,
        endpoints: &[Endpoint],
    ) -> Self {
        Self {
            system_type: config.system_type.clone(),
            name: sandbox.id().to_string(),
            owner: config.owner.clone(),
            layer_folder_path: sandbox.path().to_path_buf(),
            volume_path: sandbox
                .mount_path()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
            ignore_flushes_during_boot: config.ignore_flushes_during_boot,
            layers: layer_refs(sandbox.parent_chain()),
            endpoint_list: endpoints.iter().map(|e| e.id.clone()).collect(),
        }
    }

    /// Checks the descriptor before it reaches the host.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidConfig("container name is empty".to_string()));
        }
        if self.owner.is_empty() {
            return Err(Error::InvalidConfig("owner is empty".to_string()));
        }
        if self.layers.is_empty() {
            return Err(Error::InvalidConfig("layer list is empty".to_string()));
        }
        if self.layer_folder_path.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("layer folder path is empty".to_string()));
        }
        if self.volume_path.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("volume path is empty".to_string()));
        }
        if let Some(bad) = self
            .layers
            .iter()
            .find(|l| l.id.is_empty() || l.path.as_os_str().is_empty())
        {
            return Err(Error::InvalidConfig(format!(
                "layer entry '{}' is incomplete",
                bad.path.display()
            )));
        }
        Ok(())
    }
}

/// Layer list entries for every layer of `chain`, in order.
pub fn layer_refs(chain: &LayerChain) -> Vec<LayerRef> {
    chain.iter().map(|p| LayerRef::for_path(p)).collect()
}

// =============================================================================
// Container State
// =============================================================================

/// Lifecycle phase of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerPhase {
    /// Registered with the host, not started.
    Created,
    /// Started, no process running.
    Started,
    /// Running the process with this PID.
    Running(u32),
    /// Last process exited with this code.
    Exited(i32),
    /// Shut down gracefully.
    Shutdown,
    /// Terminated forcefully.
    Terminated,
}

impl std::fmt::Display for ContainerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Started => write!(f, "started"),
            Self::Running(pid) => write!(f, "running({pid})"),
            Self::Exited(code) => write!(f, "exited({code})"),
            Self::Shutdown => write!(f, "shutdown"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// A container registered with the compute host.
#[derive(Debug, Clone)]
pub struct Container {
    handle: ContainerHandle,
    config: ContainerConfig,
    phase: ContainerPhase,
}

impl Container {
    /// Container ID.
    pub fn id(&self) -> &str {
        &self.handle.id
    }

    /// Host handle.
    pub fn handle(&self) -> &ContainerHandle {
        &self.handle
    }

    /// Descriptor the container was built from.
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Current phase.
    pub fn phase(&self) -> ContainerPhase {
        self.phase
    }

    fn invalid_state(&self, expected: &str) -> Error {
        Error::InvalidState {
            id: self.id().to_string(),
            state: self.phase.to_string(),
            expected: expected.to_string(),
        }
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Drives containers through a [`ComputeService`].
pub struct ContainerController {
    compute: Arc<dyn ComputeService>,
}

impl ContainerController {
    /// Creates a controller over `compute`.
    pub fn new(compute: Arc<dyn ComputeService>) -> Self {
        Self { compute }
    }

    /// Validates `config` and registers the container.
    pub async fn build(&self, config: ContainerConfig) -> Result<Container> {
        config.validate()?;
        let id = config.name.clone();
        let handle = self
            .compute
            .create_container(&id, &config)
            .await
            .map_err(|e| Error::CreateFailed {
                id: id.clone(),
                reason: e.to_string(),
            })?;
        info!(
            container = %short_id(&id),
            layers = config.layers.len(),
            endpoints = config.endpoint_list.len(),
            "Container created"
        );
        Ok(Container {
            handle,
            config,
            phase: ContainerPhase::Created,
        })
    }

    /// Starts a created container.
    pub async fn start(&self, container: &mut Container) -> Result<()> {
        if container.phase != ContainerPhase::Created {
            return Err(container.invalid_state("created"));
        }
        self.compute
            .start(&container.handle)
            .await
            .map_err(|e| Error::StartFailed {
                id: container.id().to_string(),
                reason: e.to_string(),
            })?;
        container.phase = ContainerPhase::Started;
        info!(container = %short_id(container.id()), "Container started");
        Ok(())
    }

    /// Reads resource counters of a started container.
    pub async fn statistics(&self, container: &Container) -> Result<ContainerStatistics> {
        self.compute.statistics(&container.handle).await
    }

    /// Launches `process` inside the container.
    ///
    /// Only one process may be in flight; the container must be started or
    /// have finished its previous process.
    pub async fn run_process(
        &self,
        container: &mut Container,
        process: &ProcessConfig,
    ) -> Result<ProcessHandle> {
        if !matches!(
            container.phase,
            ContainerPhase::Started | ContainerPhase::Exited(_)
        ) {
            return Err(container.invalid_state("started"));
        }
        let handle = self
            .compute
            .create_process(&container.handle, process)
            .await
            .map_err(|e| Error::ProcessLaunchFailed {
                container: container.id().to_string(),
                reason: e.to_string(),
            })?;
        container.phase = ContainerPhase::Running(handle.pid);
        info!(
            container = %short_id(container.id()),
            pid = handle.pid,
            command = %process.command_line,
            "Process launched"
        );
        Ok(handle)
    }

    /// Blocks until `process` exits and returns its exit code.
    pub async fn wait(&self, container: &mut Container, process: &ProcessHandle) -> Result<i32> {
        if container.phase != ContainerPhase::Running(process.pid) {
            return Err(container.invalid_state(&format!("running({})", process.pid)));
        }
        let code = self
            .compute
            .wait(process)
            .await
            .map_err(|e| Error::WaitFailed {
                container: container.id().to_string(),
                pid: process.pid,
                reason: e.to_string(),
            })?;
        container.phase = ContainerPhase::Exited(code);
        info!(
            container = %short_id(container.id()),
            pid = process.pid,
            exit_code = code,
            "Process exited"
        );
        Ok(code)
    }

    /// Stops the container: graceful shutdown, then terminate.
    ///
    /// Terminate runs even when shutdown succeeds, since a shutdown that
    /// returned may still be in flight in the guest. Both failures are
    /// warnings.
    pub async fn stop(&self, container: &mut Container) -> TeardownReport {
        let mut report = TeardownReport::new();
        let id = container.id().to_string();

        match self.compute.shutdown(&container.handle).await {
            Ok(()) => {
                container.phase = ContainerPhase::Shutdown;
                debug!(container = %short_id(&id), "Container shut down");
            }
            Err(e) => report.record(TeardownStep::Shutdown, &id, &e),
        }

        match self.compute.terminate(&container.handle).await {
            Ok(()) => {
                container.phase = ContainerPhase::Terminated;
                debug!(container = %short_id(&id), "Container terminated");
            }
            Err(e) => report.record(TeardownStep::Terminate, &id, &e),
        }

        report
    }
}
