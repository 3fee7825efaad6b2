//! Network endpoint provisioning.
//!
//! A container joins a virtual network through one endpoint created for it
//! and deleted when the run unwinds. The network itself must already exist.

use crate::error::{Error, Result, TeardownReport, TeardownStep};
use crate::host::{Endpoint, EndpointRequest, NetworkService, VirtualNetwork};
use std::sync::Arc;
use tracing::{debug, info};

/// Finds networks and manages endpoints through a [`NetworkService`].
pub struct EndpointProvisioner {
    service: Arc<dyn NetworkService>,
}

impl EndpointProvisioner {
    /// Creates a provisioner over `service`.
    pub fn new(service: Arc<dyn NetworkService>) -> Self {
        Self { service }
    }

    /// Finds the registered network called `name`.
    ///
    /// Names are matched exactly. If several networks share the name, the
    /// first one listed wins.
    pub async fn find_network(&self, name: &str) -> Result<VirtualNetwork> {
        let networks = self.service.list_networks().await.map_err(|e| {
            Error::NetworkNotFound(format!("{name} (listing networks failed: {e})"))
        })?;
        debug!(count = networks.len(), "Listed virtual networks");

        networks
            .into_iter()
            .find(|n| n.name == name)
            .inspect(|n| info!(network = %n.name, id = %n.id, "Found virtual network"))
            .ok_or_else(|| Error::NetworkNotFound(name.to_string()))
    }

    /// Creates an endpoint attached to `network`.
    pub async fn create_endpoint(&self, network: &VirtualNetwork) -> Result<Endpoint> {
        let request = EndpointRequest {
            virtual_network: network.id.clone(),
            name: None,
        };
        let endpoint = self
            .service
            .create_endpoint(&request)
            .await
            .map_err(|e| Error::EndpointCreateFailed {
                network: network.name.clone(),
                reason: e.to_string(),
            })?;
        info!(endpoint = %endpoint.id, network = %network.name, "Created endpoint");
        Ok(endpoint)
    }

    /// Deletes an endpoint.
    ///
    /// Failure, including an endpoint that is already gone, is reported as a
    /// warning and never retried.
    pub async fn delete_endpoint(&self, id: &str) -> TeardownReport {
        let mut report = TeardownReport::new();
        match self.service.delete_endpoint(id).await {
            Ok(()) => debug!(endpoint = %id, "Deleted endpoint"),
            Err(e) => report.record(TeardownStep::DeleteEndpoint, id, &e),
        }
        report
    }
}
