//! Unwind stack for a single orchestration run.
//!
//! Every resource is pushed the moment it is acquired. Draining pops them in
//! reverse order and releases each one, whatever happened before: a failed
//! release is recorded and the drain moves on.

use crate::container::{Container, ContainerController};
use crate::error::TeardownReport;
use crate::host::Endpoint;
use crate::network::EndpointProvisioner;
use crate::sandbox::{SandboxLayer, SandboxManager};
use tracing::debug;

/// A resource acquired during a run.
#[derive(Debug, Clone)]
pub enum Acquired {
    /// Sandbox layer, possibly partially built.
    Sandbox(SandboxLayer),
    /// Network endpoint.
    Endpoint(Endpoint),
    /// Container registered with the host.
    Container(Container),
}

impl Acquired {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sandbox(_) => "sandbox layer",
            Self::Endpoint(_) => "endpoint",
            Self::Container(_) => "container",
        }
    }
}

/// LIFO stack of acquired resources.
#[derive(Debug, Default)]
pub struct UnwindStack {
    acquired: Vec<Acquired>,
}

impl UnwindStack {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an acquired resource.
    pub fn push(&mut self, resource: Acquired) {
        debug!(kind = resource.kind(), depth = self.acquired.len() + 1, "Registered for unwind");
        self.acquired.push(resource);
    }

    /// Registers a container and hands back a mutable borrow of it, so the
    /// caller can keep driving the container the stack now owns.
    pub fn push_container(&mut self, container: Container) -> &mut Container {
        self.push(Acquired::Container(container));
        match self.acquired.last_mut() {
            Some(Acquired::Container(container)) => container,
            _ => unreachable!("container was pushed last"),
        }
    }

    /// Number of registered resources.
    pub fn len(&self) -> usize {
        self.acquired.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.acquired.is_empty()
    }

    /// Releases every registered resource, most recent first.
    pub async fn drain(
        mut self,
        containers: &ContainerController,
        endpoints: &EndpointProvisioner,
        sandboxes: &SandboxManager,
    ) -> TeardownReport {
        let mut report = TeardownReport::new();
        while let Some(resource) = self.acquired.pop() {
            debug!(kind = resource.kind(), "Unwinding");
            match resource {
                Acquired::Container(mut container) => {
                    report.merge(containers.stop(&mut container).await);
                }
                Acquired::Endpoint(endpoint) => {
                    report.merge(endpoints.delete_endpoint(&endpoint.id).await);
                }
                Acquired::Sandbox(layer) => {
                    report.merge(sandboxes.teardown(&layer));
                }
            }
        }
        report
    }
}
