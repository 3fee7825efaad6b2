//! # Simulated Host
//!
//! In-process implementations of the three host contracts, sharing one call
//! [`Journal`] and one [`FaultPlan`]:
//!
//! - [`SimulatedStorage`]: layers held in memory, keyed by ID
//! - [`SimulatedCompute`]: containers and processes that exit immediately
//! - [`SimulatedNetwork`]: a fixed set of virtual networks and their endpoints
//!
//! The CLI runs against these when no native host binding is linked. Tests
//! use the journal to assert call order and the fault plan to fail any
//! operation on demand.
//!
//! ```rust,ignore
//! let host = SimulatedHost::new("/layers")
//!     .with_network("nat")
//!     .with_base_layer("base", &[]);
//! host.faults().fail(Op::PrepareLayer);
//!
//! let report = host.orchestrator(OrchestratorConfig::default())?.run("base").await;
//! assert_eq!(host.journal().count(Op::DestroyLayer), 1);
//! ```

use crate::config::{DriverInfo, OrchestratorConfig, ProcessConfig};
use crate::constants::LAYER_MOUNT_DIR;
use crate::container::ContainerConfig;
use crate::error::{Error, Result};
use crate::host::{
    BaseImage, ComputeService, ContainerHandle, ContainerStatistics, Endpoint, EndpointRequest,
    NetworkService, ProcessHandle, StorageDriver, VirtualNetwork,
};
use crate::layer::{layer_id, parse_layer_chain};
use crate::orchestrator::Orchestrator;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Locks a mutex, mapping poisoning to an internal error.
fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::Internal("lock poisoned".to_string()))
}

// =============================================================================
// Journal and Faults
// =============================================================================

/// Host operation, as recorded in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Chain metadata read.
    ReadLayerMetadata,
    /// Writable layer created.
    CreateLayer,
    /// Layer activated.
    ActivateLayer,
    /// Layer prepared for mounting.
    PrepareLayer,
    /// Layer unprepared.
    UnprepareLayer,
    /// Layer deactivated.
    DeactivateLayer,
    /// Layer destroyed.
    DestroyLayer,
    /// Mount path resolved.
    MountPath,
    /// Base images listed.
    BaseImages,
    /// Compute system created.
    CreateContainer,
    /// Compute system started.
    Start,
    /// Process launched in the container.
    CreateProcess,
    /// Process waited on.
    Wait,
    /// Graceful shutdown requested.
    Shutdown,
    /// Forced termination.
    Terminate,
    /// Statistics queried.
    Statistics,
    /// Networks listed.
    ListNetworks,
    /// Endpoint created.
    CreateEndpoint,
    /// Endpoint deleted.
    DeleteEndpoint,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One recorded host call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Operation.
    pub op: Op,
    /// Layer, container, endpoint or network the call targeted.
    pub subject: String,
}

/// Ordered record of every host call, shared by the simulated services.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Journal {
    fn record(&self, op: Op, subject: &str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(Call {
                op,
                subject: subject.to_string(),
            });
        }
    }

    /// All calls in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// All operations in order.
    pub fn ops(&self) -> Vec<Op> {
        self.calls().into_iter().map(|c| c.op).collect()
    }

    /// Operations in order, restricted to `filter`.
    pub fn ops_among(&self, filter: &[Op]) -> Vec<Op> {
        self.ops().into_iter().filter(|op| filter.contains(op)).collect()
    }

    /// Number of calls of `op`.
    pub fn count(&self, op: Op) -> usize {
        self.calls().iter().filter(|c| c.op == op).count()
    }

    /// Returns true if `op` was ever called.
    pub fn contains(&self, op: Op) -> bool {
        self.count(op) > 0
    }

    /// Forgets every recorded call.
    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }
}

/// How often an injected fault fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Always,
    Times(u32),
}

/// Operations that should fail, shared by the simulated services.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    faults: Arc<Mutex<HashMap<Op, Fault>>>,
}

impl FaultPlan {
    /// Makes every call of `op` fail.
    pub fn fail(&self, op: Op) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert(op, Fault::Always);
        }
    }

    /// Makes the next `times` calls of `op` fail.
    pub fn fail_times(&self, op: Op, times: u32) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert(op, Fault::Times(times));
        }
    }

    /// Removes every injected fault.
    pub fn clear(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.clear();
        }
    }

    fn check(&self, op: Op, subject: &str) -> Result<()> {
        let mut faults = lock(&self.faults)?;
        let fire = match faults.get_mut(&op) {
            Some(Fault::Always) => true,
            Some(Fault::Times(0)) | None => false,
            Some(Fault::Times(n)) => {
                *n -= 1;
                true
            }
        };
        if fire {
            debug!(%op, subject, "Injected fault");
            Err(Error::host(op.to_string(), format!("injected fault for '{subject}'")))
        } else {
            Ok(())
        }
    }
}

/// Records the call, then applies the fault plan.
#[derive(Debug, Clone, Default)]
struct Tracker {
    journal: Journal,
    faults: FaultPlan,
}

impl Tracker {
    fn enter(&self, op: Op, subject: &str) -> Result<()> {
        self.journal.record(op, subject);
        self.faults.check(op, subject)
    }
}

// =============================================================================
// Storage
// =============================================================================

#[derive(Debug, Clone, Default)]
struct SimLayer {
    /// Raw persisted chain, if any.
    metadata: Option<Vec<u8>>,
    sandbox: bool,
    active: bool,
    prepared: bool,
}

/// In-memory storage driver.
pub struct SimulatedStorage {
    info: DriverInfo,
    layers: Mutex<HashMap<String, SimLayer>>,
    tracker: Tracker,
}

impl SimulatedStorage {
    fn new(info: DriverInfo, tracker: Tracker) -> Self {
        Self {
            info,
            layers: Mutex::new(HashMap::new()),
            tracker,
        }
    }

    /// Adds a base layer with persisted chain `metadata` (raw JSON).
    pub fn insert_layer(&self, id: &str, metadata: Option<Vec<u8>>) {
        if let Ok(mut layers) = self.layers.lock() {
            layers.insert(
                id.to_string(),
                SimLayer {
                    metadata,
                    ..SimLayer::default()
                },
            );
        }
    }

    /// Returns true if a layer with this ID exists.
    pub fn has_layer(&self, id: &str) -> bool {
        self.layers
            .lock()
            .map(|l| l.contains_key(id))
            .unwrap_or(false)
    }

    /// IDs of sandbox layers that still exist.
    pub fn sandbox_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .layers
            .lock()
            .map(|l| {
                l.iter()
                    .filter(|(_, layer)| layer.sandbox)
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default();
        ids.sort();
        ids
    }

    fn with_sandbox<T>(&self, id: &str, f: impl FnOnce(&mut SimLayer) -> Result<T>) -> Result<T> {
        let mut layers = lock(&self.layers)?;
        match layers.get_mut(id) {
            Some(layer) if layer.sandbox => f(layer),
            Some(_) => Err(Error::host(
                format!("modify layer {id}"),
                "layer is a read-only base layer",
            )),
            None => Err(Error::LayerNotFound(id.to_string())),
        }
    }
}

impl StorageDriver for SimulatedStorage {
    fn info(&self) -> &DriverInfo {
        &self.info
    }

    fn read_layer_metadata(&self, layer_path: &Path) -> Result<Option<Vec<PathBuf>>> {
        let id = layer_id(layer_path);
        self.tracker.enter(Op::ReadLayerMetadata, &id)?;
        let metadata = lock(&self.layers)?.get(&id).and_then(|l| l.metadata.clone());
        match metadata {
            Some(content) => parse_layer_chain(layer_path, &content),
            None => Ok(None),
        }
    }

    fn create_layer(&self, id: &str, parent: &Path, chain: &[PathBuf]) -> Result<()> {
        self.tracker.enter(Op::CreateLayer, id)?;
        let mut layers = lock(&self.layers)?;
        if layers.contains_key(id) {
            return Err(Error::host(
                format!("create layer {id}"),
                "layer already exists",
            ));
        }
        if !layers.contains_key(&layer_id(parent)) {
            return Err(Error::LayerNotFound(layer_id(parent)));
        }
        layers.insert(
            id.to_string(),
            SimLayer {
                metadata: Some(serde_json::to_vec(chain)?),
                sandbox: true,
                ..SimLayer::default()
            },
        );
        Ok(())
    }

    fn activate_layer(&self, id: &str) -> Result<()> {
        self.tracker.enter(Op::ActivateLayer, id)?;
        self.with_sandbox(id, |layer| {
            layer.active = true;
            Ok(())
        })
    }

    fn prepare_layer(&self, id: &str, _chain: &[PathBuf]) -> Result<()> {
        self.tracker.enter(Op::PrepareLayer, id)?;
        self.with_sandbox(id, |layer| {
            if !layer.active {
                return Err(Error::host(format!("prepare layer {id}"), "layer is not active"));
            }
            layer.prepared = true;
            Ok(())
        })
    }

    fn unprepare_layer(&self, id: &str) -> Result<()> {
        self.tracker.enter(Op::UnprepareLayer, id)?;
        self.with_sandbox(id, |layer| {
            layer.prepared = false;
            Ok(())
        })
    }

    fn deactivate_layer(&self, id: &str) -> Result<()> {
        self.tracker.enter(Op::DeactivateLayer, id)?;
        self.with_sandbox(id, |layer| {
            layer.active = false;
            Ok(())
        })
    }

    fn destroy_layer(&self, id: &str) -> Result<()> {
        self.tracker.enter(Op::DestroyLayer, id)?;
        self.with_sandbox(id, |_| Ok(()))?;
        lock(&self.layers)?.remove(id);
        Ok(())
    }

    fn mount_path(&self, id: &str) -> Result<PathBuf> {
        self.tracker.enter(Op::MountPath, id)?;
        let layers = lock(&self.layers)?;
        let layer = layers
            .get(id)
            .ok_or_else(|| Error::LayerNotFound(id.to_string()))?;
        if layer.prepared {
            Ok(self.layer_path(id).join(LAYER_MOUNT_DIR))
        } else {
            Ok(self.layer_path(id))
        }
    }

    fn base_images(&self) -> Result<Vec<BaseImage>> {
        self.tracker.enter(Op::BaseImages, "")?;
        let mut images: Vec<BaseImage> = lock(&self.layers)?
            .iter()
            .filter(|(_, layer)| !layer.sandbox)
            .map(|(id, _)| BaseImage {
                id: id.clone(),
                path: self.layer_path(id),
            })
            .collect();
        images.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(images)
    }
}

// =============================================================================
// Compute
// =============================================================================

#[derive(Debug, Clone)]
struct SimContainer {
    config: ContainerConfig,
    created: DateTime<Utc>,
    started: Option<DateTime<Utc>>,
    stopped: bool,
}

/// In-memory compute service. Every process exits with the configured code.
pub struct SimulatedCompute {
    containers: Mutex<HashMap<String, SimContainer>>,
    next_pid: Mutex<u32>,
    exit_code: Mutex<i32>,
    tracker: Tracker,
}

impl SimulatedCompute {
    fn new(tracker: Tracker) -> Self {
        Self {
            containers: Mutex::new(HashMap::new()),
            next_pid: Mutex::new(1000),
            exit_code: Mutex::new(0),
            tracker,
        }
    }

    /// Sets the exit code reported by `wait`.
    pub fn set_exit_code(&self, code: i32) {
        if let Ok(mut exit_code) = self.exit_code.lock() {
            *exit_code = code;
        }
    }

    /// Descriptor a container was created with.
    pub fn config_of(&self, id: &str) -> Option<ContainerConfig> {
        self.containers
            .lock()
            .ok()
            .and_then(|c| c.get(id).map(|c| c.config.clone()))
    }

    /// Returns true if the container exists and has not been stopped.
    pub fn is_live(&self, id: &str) -> bool {
        self.containers
            .lock()
            .map(|c| c.get(id).is_some_and(|c| !c.stopped))
            .unwrap_or(false)
    }

    fn with_container<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut SimContainer) -> Result<T>,
    ) -> Result<T> {
        let mut containers = lock(&self.containers)?;
        let container = containers
            .get_mut(id)
            .ok_or_else(|| Error::ContainerNotFound(id.to_string()))?;
        f(container)
    }
}

#[async_trait]
impl ComputeService for SimulatedCompute {
    async fn create_container(
        &self,
        id: &str,
        config: &ContainerConfig,
    ) -> Result<ContainerHandle> {
        self.tracker.enter(Op::CreateContainer, id)?;
        let mut containers = lock(&self.containers)?;
        if containers.contains_key(id) {
            return Err(Error::host(
                format!("create container {id}"),
                "container already exists",
            ));
        }
        containers.insert(
            id.to_string(),
            SimContainer {
                config: config.clone(),
                created: Utc::now(),
                started: None,
                stopped: false,
            },
        );
        Ok(ContainerHandle { id: id.to_string() })
    }

    async fn start(&self, container: &ContainerHandle) -> Result<()> {
        self.tracker.enter(Op::Start, &container.id)?;
        self.with_container(&container.id, |c| {
            c.started = Some(Utc::now());
            Ok(())
        })
    }

    async fn create_process(
        &self,
        container: &ContainerHandle,
        process: &ProcessConfig,
    ) -> Result<ProcessHandle> {
        self.tracker.enter(Op::CreateProcess, &container.id)?;
        self.with_container(&container.id, |c| {
            if c.started.is_none() || c.stopped {
                return Err(Error::host("create process", "container is not running"));
            }
            Ok(())
        })?;
        debug!(container = %container.id, command = %process.command_line, "Simulated process");
        let mut pid = lock(&self.next_pid)?;
        *pid += 4;
        Ok(ProcessHandle {
            container_id: container.id.clone(),
            pid: *pid,
        })
    }

    async fn wait(&self, process: &ProcessHandle) -> Result<i32> {
        self.tracker.enter(Op::Wait, &process.container_id)?;
        self.with_container(&process.container_id, |_| Ok(()))?;
        Ok(*lock(&self.exit_code)?)
    }

    async fn shutdown(&self, container: &ContainerHandle) -> Result<()> {
        self.tracker.enter(Op::Shutdown, &container.id)?;
        self.with_container(&container.id, |c| {
            c.stopped = true;
            Ok(())
        })
    }

    async fn terminate(&self, container: &ContainerHandle) -> Result<()> {
        self.tracker.enter(Op::Terminate, &container.id)?;
        self.with_container(&container.id, |c| {
            c.stopped = true;
            Ok(())
        })
    }

    async fn statistics(&self, container: &ContainerHandle) -> Result<ContainerStatistics> {
        self.tracker.enter(Op::Statistics, &container.id)?;
        self.with_container(&container.id, |c| {
            let now = Utc::now();
            let start = c.started.unwrap_or(c.created);
            let uptime = (now - start).num_microseconds().unwrap_or(0).max(0) as u64 * 10;
            Ok(ContainerStatistics {
                read: now,
                container_start_time: start,
                uptime_100ns: uptime,
                memory_commit_bytes: 64 * 1024 * 1024,
                processor_total_runtime_100ns: uptime / 2,
            })
        })
    }
}

// =============================================================================
// Network
// =============================================================================

/// In-memory network service.
pub struct SimulatedNetwork {
    networks: Mutex<Vec<VirtualNetwork>>,
    endpoints: Mutex<HashMap<String, Endpoint>>,
    tracker: Tracker,
}

impl SimulatedNetwork {
    fn new(tracker: Tracker) -> Self {
        Self {
            networks: Mutex::new(Vec::new()),
            endpoints: Mutex::new(HashMap::new()),
            tracker,
        }
    }

    /// Registers a virtual network and returns it.
    pub fn add_network(&self, name: &str) -> VirtualNetwork {
        let network = VirtualNetwork {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
        };
        if let Ok(mut networks) = self.networks.lock() {
            networks.push(network.clone());
        }
        network
    }

    /// IDs of endpoints that still exist.
    pub fn endpoint_ids(&self) -> Vec<String> {
        self.endpoints
            .lock()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NetworkService for SimulatedNetwork {
    async fn list_networks(&self) -> Result<Vec<VirtualNetwork>> {
        self.tracker.enter(Op::ListNetworks, "")?;
        Ok(lock(&self.networks)?.clone())
    }

    async fn create_endpoint(&self, request: &EndpointRequest) -> Result<Endpoint> {
        self.tracker
            .enter(Op::CreateEndpoint, &request.virtual_network)?;
        if !lock(&self.networks)?
            .iter()
            .any(|n| n.id == request.virtual_network)
        {
            return Err(Error::host(
                "create endpoint",
                format!("unknown network {}", request.virtual_network),
            ));
        }
        let endpoint = Endpoint {
            id: uuid::Uuid::new_v4().to_string(),
            virtual_network: request.virtual_network.clone(),
            name: request.name.clone(),
        };
        lock(&self.endpoints)?.insert(endpoint.id.clone(), endpoint.clone());
        Ok(endpoint)
    }

    async fn delete_endpoint(&self, id: &str) -> Result<()> {
        self.tracker.enter(Op::DeleteEndpoint, id)?;
        lock(&self.endpoints)?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::EndpointNotFound(id.to_string()))
    }
}

// =============================================================================
// Host
// =============================================================================

/// The three simulated services wired to one journal and fault plan.
#[derive(Clone)]
pub struct SimulatedHost {
    storage: Arc<SimulatedStorage>,
    compute: Arc<SimulatedCompute>,
    network: Arc<SimulatedNetwork>,
    tracker: Tracker,
}

impl SimulatedHost {
    /// Creates a host whose layers live under `home_dir`.
    pub fn new(home_dir: impl Into<PathBuf>) -> Self {
        Self::with_driver(DriverInfo::new(home_dir))
    }

    /// Creates a host for the given driver location.
    pub fn with_driver(info: DriverInfo) -> Self {
        let tracker = Tracker::default();
        Self {
            storage: Arc::new(SimulatedStorage::new(info, tracker.clone())),
            compute: Arc::new(SimulatedCompute::new(tracker.clone())),
            network: Arc::new(SimulatedNetwork::new(tracker.clone())),
            tracker,
        }
    }

    /// Creates a host from the `driver` and `simulation` sections of a config.
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        let host = Self::with_driver(config.driver.clone());
        for name in &config.simulation.networks {
            host.network.add_network(name);
        }
        host.compute.set_exit_code(config.simulation.exit_code);
        host
    }

    /// Registers a virtual network.
    pub fn with_network(self, name: &str) -> Self {
        self.network.add_network(name);
        self
    }

    /// Adds a base layer whose ancestors are the given layer IDs, nearest
    /// parent first.
    pub fn with_base_layer(self, id: &str, ancestors: &[&str]) -> Self {
        let metadata = if ancestors.is_empty() {
            None
        } else {
            let paths: Vec<PathBuf> = ancestors
                .iter()
                .map(|a| self.storage.layer_path(a))
                .collect();
            serde_json::to_vec(&paths).ok()
        };
        self.storage.insert_layer(id, metadata);
        self
    }

    /// Adds a base layer with raw persisted chain content.
    pub fn with_raw_layer(self, id: &str, metadata: &[u8]) -> Self {
        self.storage.insert_layer(id, Some(metadata.to_vec()));
        self
    }

    /// Sets the exit code of every simulated process.
    pub fn with_exit_code(self, code: i32) -> Self {
        self.compute.set_exit_code(code);
        self
    }

    /// Storage service.
    pub fn storage(&self) -> &Arc<SimulatedStorage> {
        &self.storage
    }

    /// Compute service.
    pub fn compute(&self) -> &Arc<SimulatedCompute> {
        &self.compute
    }

    /// Network service.
    pub fn network(&self) -> &Arc<SimulatedNetwork> {
        &self.network
    }

    /// Shared call journal.
    pub fn journal(&self) -> &Journal {
        &self.tracker.journal
    }

    /// Shared fault plan.
    pub fn faults(&self) -> &FaultPlan {
        &self.tracker.faults
    }

    /// Builds an orchestrator over all three simulated services.
    pub fn orchestrator(&self, config: OrchestratorConfig) -> Result<Orchestrator> {
        Orchestrator::new(
            config,
            self.storage.clone(),
            self.compute.clone(),
            self.network.clone(),
        )
    }

    /// Builds an orchestrator using `storage` instead of the simulated one.
    pub fn orchestrator_with_storage(
        &self,
        config: OrchestratorConfig,
        storage: Arc<dyn StorageDriver>,
    ) -> Result<Orchestrator> {
        Orchestrator::new(config, storage, self.compute.clone(), self.network.clone())
    }
}
