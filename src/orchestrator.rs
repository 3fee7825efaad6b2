//! # Orchestration Driver
//!
//! Runs one container end to end on top of a base layer:
//!
//! ```text
//!  1. resolve base      mount path + layer chain
//!  2. find network      abort here if missing: nothing acquired yet
//!  3. sandbox layer     create → activate → prepare → mount      [push]
//!  4. endpoint          on the network from step 2              [push]
//!  5. container         build config, create                    [push]
//!                       start → statistics → run → wait
//!  6. unwind            stop container → delete endpoint → destroy sandbox
//! ```
//!
//! Step 6 always runs, whether the pipeline succeeded or stopped at any
//! earlier step, and only for what was actually acquired. The first fatal
//! error is the run's outcome; unwind failures are reported next to it,
//! never instead of it.

use crate::config::OrchestratorConfig;
use crate::constants::{validate_container_id, validate_layer_id};
use crate::container::{
    ContainerConfig, ContainerController, generate_container_id, short_id,
};
use crate::error::{Error, Result, TeardownReport};
use crate::host::{ComputeService, ContainerStatistics, NetworkService, StorageDriver};
use crate::layer::{LayerChain, resolve_chain};
use crate::network::EndpointProvisioner;
use crate::sandbox::SandboxManager;
use crate::unwind::{Acquired, UnwindStack};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Successful pipeline result.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Exit code of the process run inside the container.
    pub exit_code: i32,
    /// Counters read after start, if collected.
    pub statistics: Option<ContainerStatistics>,
}

/// Everything a run produced.
#[derive(Debug)]
pub struct RunReport {
    /// ID of the container (and its sandbox layer).
    pub container_id: String,
    /// Pipeline outcome, or the first fatal error.
    pub outcome: Result<RunOutcome>,
    /// Unwind warnings.
    pub teardown: TeardownReport,
}

impl RunReport {
    /// Returns true if the pipeline succeeded, whatever the exit code.
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Exit code of the workload, if it ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        self.outcome.as_ref().ok().map(|o| o.exit_code)
    }

    /// Converts into the exit code or the primary error.
    pub fn into_result(self) -> Result<i32> {
        self.outcome.map(|o| o.exit_code)
    }
}

/// Single-container orchestrator.
pub struct Orchestrator {
    config: OrchestratorConfig,
    storage: Arc<dyn StorageDriver>,
    sandboxes: SandboxManager,
    endpoints: EndpointProvisioner,
    containers: ContainerController,
}

impl Orchestrator {
    /// Creates an orchestrator. Fails if `config` is invalid.
    pub fn new(
        config: OrchestratorConfig,
        storage: Arc<dyn StorageDriver>,
        compute: Arc<dyn ComputeService>,
        network: Arc<dyn NetworkService>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            sandboxes: SandboxManager::new(Arc::clone(&storage)),
            storage,
            endpoints: EndpointProvisioner::new(network),
            containers: ContainerController::new(compute),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Runs a new container on the base layer `base_layer_id`.
    pub async fn run(&self, base_layer_id: &str) -> RunReport {
        self.run_with_id(generate_container_id(), base_layer_id).await
    }

    /// Runs with a caller-chosen container ID.
    pub async fn run_with_id(&self, container_id: String, base_layer_id: &str) -> RunReport {
        let span = info_span!("run", container = %short_id(&container_id), base = %base_layer_id);
        async {
            let mut unwind = UnwindStack::new();
            let outcome = self
                .pipeline(&container_id, base_layer_id, &mut unwind)
                .await;

            match &outcome {
                Ok(o) => info!(exit_code = o.exit_code, "Pipeline complete"),
                Err(e) => error!(class = %e.class(), error = %e, "Pipeline failed"),
            }

            debug!(resources = unwind.len(), "Unwinding run");
            let teardown = unwind
                .drain(&self.containers, &self.endpoints, &self.sandboxes)
                .await;
            if !teardown.is_clean() {
                warn!(warnings = teardown.len(), "Unwind finished with warnings");
            }

            RunReport {
                container_id: container_id.clone(),
                outcome,
                teardown,
            }
        }
        .instrument(span)
        .await
    }

    async fn pipeline(
        &self,
        container_id: &str,
        base_layer_id: &str,
        unwind: &mut UnwindStack,
    ) -> Result<RunOutcome> {
        // Configuration: nothing is touched before the inputs are known good.
        validate_container_id(container_id).map_err(|reason| Error::InvalidContainerId {
            id: container_id.to_string(),
            reason: reason.to_string(),
        })?;
        validate_layer_id(base_layer_id).map_err(|reason| Error::InvalidLayerId {
            id: base_layer_id.to_string(),
            reason: reason.to_string(),
        })?;

        // 1. Base layer.
        let chain = self.resolve_base(base_layer_id)?;

        // 2. Network lookup.
        let network = self.endpoints.find_network(&self.config.network).await?;

        // 3. Sandbox layer.
        let sandbox = match self.sandboxes.create_sandbox(container_id, &chain) {
            Ok(layer) => layer,
            Err(failure) => {
                if let Some(partial) = failure.partial {
                    unwind.push(Acquired::Sandbox(partial));
                }
                return Err(failure.error);
            }
        };
        unwind.push(Acquired::Sandbox(sandbox.clone()));

        // 4. Endpoint.
        let endpoint = self.endpoints.create_endpoint(&network).await?;
        unwind.push(Acquired::Endpoint(endpoint.clone()));

        // 5. Container.
        let config = ContainerConfig::for_sandbox(&self.config, &sandbox, &[endpoint]);
        let container = self.containers.build(config).await?;
        let container = unwind.push_container(container);

        self.containers.start(container).await?;

        let statistics = if self.config.collect_statistics {
            match self.containers.statistics(container).await {
                Ok(stats) => {
                    debug!(
                        memory_commit_bytes = stats.memory_commit_bytes,
                        uptime_100ns = stats.uptime_100ns,
                        "Container statistics"
                    );
                    Some(stats)
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read container statistics");
                    None
                }
            }
        } else {
            None
        };

        let process = self
            .containers
            .run_process(container, &self.config.process)
            .await?;
        let exit_code = self.containers.wait(container, &process).await?;

        Ok(RunOutcome {
            exit_code,
            statistics,
        })
    }

    /// Resolves the base layer's mount path and chain.
    fn resolve_base(&self, base_layer_id: &str) -> Result<LayerChain> {
        let base_path: PathBuf =
            self.storage
                .mount_path(base_layer_id)
                .map_err(|e| Error::BaseLayerUnavailable {
                    id: base_layer_id.to_string(),
                    reason: e.to_string(),
                })?;

        match self.storage.base_images() {
            Ok(images) => debug!(
                count = images.len(),
                ids = ?images.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(),
                "Known base images"
            ),
            Err(e) => warn!(error = %e, "Failed to list base images"),
        }

        let chain = resolve_chain(self.storage.as_ref(), &base_path)?;
        info!(
            base = %base_path.display(),
            depth = chain.len(),
            "Resolved layer chain"
        );
        Ok(chain)
    }
}
