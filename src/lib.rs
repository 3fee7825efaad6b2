//! # hcsrun
//!
//! **Layered Container Orchestration for Host Compute Services**
//!
//! This crate runs a single container on top of a read-only base layer. It
//! resolves the base layer's ancestry, builds a writable sandbox layer over
//! it, attaches the container to a virtual network through a fresh endpoint,
//! and drives the container through create, start, run and wait. Whatever
//! happens, every acquired resource is released in reverse order.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                             hcsrun                                  │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────────┐    │
//! │  │                      Orchestrator                           │    │
//! │  │   resolve → network → sandbox → endpoint → container        │    │
//! │  │                 UnwindStack (LIFO release)                  │    │
//! │  └─────────────────────────────────────────────────────────────┘    │
//! │        │                 │                    │                     │
//! │  ┌─────┴──────┐   ┌──────┴───────┐   ┌────────┴──────────┐          │
//! │  │ layer      │   │ network      │   │ container         │          │
//! │  │ sandbox    │   │ Endpoint     │   │ Container         │          │
//! │  │ chain +    │   │ Provisioner  │   │ Controller        │          │
//! │  │ SandboxMgr │   │              │   │                   │          │
//! │  └─────┬──────┘   └──────┬───────┘   └────────┬──────────┘          │
//! ├────────┼─────────────────┼────────────────────┼─────────────────────┤
//! │  StorageDriver     NetworkService       ComputeService   (host.rs)  │
//! │  ┌──────────────┐  ┌──────────────────────────────────────────┐     │
//! │  │DirectoryDriver│  │ SimulatedHost (journal + fault plan)     │     │
//! │  └──────────────┘  └──────────────────────────────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Resource Ordering
//!
//! | Acquired        | Released by                         |
//! |-----------------|-------------------------------------|
//! | sandbox layer   | unprepare → deactivate → destroy    |
//! | endpoint        | delete                              |
//! | container       | shutdown → terminate                |
//!
//! Release failures are collected in a [`TeardownReport`] and never replace
//! the error that stopped the run.
//!
//! # Example
//!
//! ```rust,ignore
//! use hcsrun::{OrchestratorConfig, SimulatedHost};
//!
//! #[tokio::main]
//! async fn main() -> hcsrun::Result<()> {
//!     let host = SimulatedHost::new(r"C:\layers")
//!         .with_network("nat")
//!         .with_base_layer("windowsservercore", &[]);
//!     let report = host
//!         .orchestrator(OrchestratorConfig::default())?
//!         .run("windowsservercore")
//!         .await;
//!     println!("exit code: {:?}", report.exit_code());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod constants;
pub mod container;
pub mod error;
pub mod host;
pub mod layer;
pub mod network;
pub mod orchestrator;
pub mod sandbox;
pub mod simulated;
pub mod storage;
pub mod unwind;

// Re-exports
pub use config::{DriverFlavour, DriverInfo, OrchestratorConfig, ProcessConfig, SimulationConfig};
pub use constants::*;
pub use container::{
    Container, ContainerConfig, ContainerController, ContainerPhase, LayerRef,
    generate_container_id, layer_guid, short_id,
};
pub use error::{Error, ErrorClass, Result, TeardownReport, TeardownStep};
pub use host::{
    BaseImage, ComputeService, ContainerHandle, ContainerStatistics, Endpoint, EndpointRequest,
    NetworkService, ProcessHandle, StorageDriver, VirtualNetwork,
};
pub use layer::{LayerChain, LayerDescriptor, describe_layer, resolve_chain};
pub use network::EndpointProvisioner;
pub use orchestrator::{Orchestrator, RunOutcome, RunReport};
pub use sandbox::{SandboxFailure, SandboxLayer, SandboxManager, SandboxPhase};
pub use simulated::{Call, FaultPlan, Journal, Op, SimulatedHost};
pub use storage::DirectoryDriver;
pub use unwind::{Acquired, UnwindStack};
