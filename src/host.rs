//! Host collaborator contracts.
//!
//! The orchestration core never talks to the compute host, the network
//! service or the storage driver directly. It consumes them through the
//! three traits below:
//!
//! | Trait              | Backing service                          | Calls   |
//! |--------------------|------------------------------------------|---------|
//! | [`StorageDriver`]  | copy-on-write graph driver               | sync    |
//! | [`ComputeService`] | compute host (containers, processes)     | async   |
//! | [`NetworkService`] | host network service (virtual networks)  | async   |
//!
//! Implementations report collaborator-level failures with the service
//! variants of [`Error`] (`LayerNotFound`, `Host`, `Io`, ...). The core wraps
//! those into pipeline errors.
//!
//! [`Error`]: crate::error::Error

use crate::config::{DriverInfo, ProcessConfig};
use crate::container::ContainerConfig;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// =============================================================================
// Storage
// =============================================================================

/// A read-only layer the storage driver can stack sandboxes on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseImage {
    /// Layer ID.
    pub id: String,
    /// Layer folder.
    pub path: PathBuf,
}

/// Copy-on-write storage driver.
///
/// Layer operations are keyed by layer ID; the driver maps IDs to folders
/// under its home directory.
pub trait StorageDriver: Send + Sync {
    /// Returns the driver location and flavour.
    fn info(&self) -> &DriverInfo;

    /// Reads the persisted ancestor chain of the layer at `layer_path`.
    ///
    /// Returns `Ok(None)` for a base layer with no chain metadata.
    fn read_layer_metadata(&self, layer_path: &Path) -> Result<Option<Vec<PathBuf>>>;

    /// Creates a writable layer on top of `parent`, using `chain` for
    /// copy-on-write resolution.
    fn create_layer(&self, id: &str, parent: &Path, chain: &[PathBuf]) -> Result<()>;

    /// Registers the layer as live.
    fn activate_layer(&self, id: &str) -> Result<()>;

    /// Makes an activated layer mountable.
    fn prepare_layer(&self, id: &str, chain: &[PathBuf]) -> Result<()>;

    /// Reverses [`StorageDriver::prepare_layer`].
    fn unprepare_layer(&self, id: &str) -> Result<()>;

    /// Reverses [`StorageDriver::activate_layer`].
    fn deactivate_layer(&self, id: &str) -> Result<()>;

    /// Removes the layer and its folder.
    fn destroy_layer(&self, id: &str) -> Result<()>;

    /// Resolves where the layer is visible.
    ///
    /// Prepared layers resolve to their mounted volume, other layers to
    /// their folder.
    fn mount_path(&self, id: &str) -> Result<PathBuf>;

    /// Lists base layers known to the driver.
    fn base_images(&self) -> Result<Vec<BaseImage>>;

    /// Folder of the layer with the given ID.
    fn layer_path(&self, id: &str) -> PathBuf {
        self.info().home_dir.join(id)
    }
}

// =============================================================================
// Compute
// =============================================================================

/// Handle to a container registered with the compute host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerHandle {
    /// Container ID.
    pub id: String,
}

/// Handle to a process running inside a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessHandle {
    /// Owning container ID.
    pub container_id: String,
    /// Process ID inside the container.
    pub pid: u32,
}

/// Resource counters reported by the compute host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatistics {
    /// When the counters were read.
    pub read: DateTime<Utc>,
    /// When the container started.
    pub container_start_time: DateTime<Utc>,
    /// Uptime in 100ns units.
    pub uptime_100ns: u64,
    /// Committed memory in bytes.
    pub memory_commit_bytes: u64,
    /// Total processor runtime in 100ns units.
    pub processor_total_runtime_100ns: u64,
}

/// Compute host service.
#[async_trait]
pub trait ComputeService: Send + Sync {
    /// Registers a container described by `config`.
    async fn create_container(&self, id: &str, config: &ContainerConfig)
    -> Result<ContainerHandle>;

    /// Starts a created container.
    async fn start(&self, container: &ContainerHandle) -> Result<()>;

    /// Launches a process inside a started container.
    async fn create_process(
        &self,
        container: &ContainerHandle,
        process: &ProcessConfig,
    ) -> Result<ProcessHandle>;

    /// Blocks until the process exits and returns its exit code.
    async fn wait(&self, process: &ProcessHandle) -> Result<i32>;

    /// Asks the guest to shut down.
    async fn shutdown(&self, container: &ContainerHandle) -> Result<()>;

    /// Forcefully stops the container.
    async fn terminate(&self, container: &ContainerHandle) -> Result<()>;

    /// Reads resource counters.
    async fn statistics(&self, container: &ContainerHandle) -> Result<ContainerStatistics>;
}

// =============================================================================
// Network
// =============================================================================

/// A virtual network registered with the host network service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VirtualNetwork {
    /// Network ID.
    pub id: String,
    /// Network name, e.g. `nat`.
    pub name: String,
}

/// Endpoint creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EndpointRequest {
    /// Network the endpoint attaches to.
    pub virtual_network: String,
    /// Optional endpoint name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// An endpoint returned by the network service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Endpoint {
    /// Endpoint ID assigned by the service.
    pub id: String,
    /// Network the endpoint is attached to.
    pub virtual_network: String,
    /// Endpoint name, if one was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Host network service.
#[async_trait]
pub trait NetworkService: Send + Sync {
    /// Lists registered virtual networks.
    async fn list_networks(&self) -> Result<Vec<VirtualNetwork>>;

    /// Creates an endpoint.
    async fn create_endpoint(&self, request: &EndpointRequest) -> Result<Endpoint>;

    /// Deletes an endpoint.
    async fn delete_endpoint(&self, id: &str) -> Result<()>;
}
