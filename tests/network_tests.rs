//! Tests for network endpoint provisioning.
//!
//! Validates network lookup by name, endpoint creation, and idempotent
//! endpoint deletion.

use hcsrun::{EndpointProvisioner, Error, Op, SimulatedHost, TeardownStep};

fn provisioner(host: &SimulatedHost) -> EndpointProvisioner {
    EndpointProvisioner::new(host.network().clone())
}

// =============================================================================
// Network Lookup Tests
// =============================================================================

#[tokio::test]
async fn test_find_network_by_exact_name() {
    let host = SimulatedHost::new("/layers")
        .with_network("nat")
        .with_network("transparent");

    let network = provisioner(&host).find_network("transparent").await.unwrap();
    assert_eq!(network.name, "transparent");

    let err = provisioner(&host).find_network("NAT").await.unwrap_err();
    assert!(matches!(err, Error::NetworkNotFound(ref name) if name == "NAT"));
}

#[tokio::test]
async fn test_duplicate_names_first_wins() {
    let host = SimulatedHost::new("/layers");
    let first = host.network().add_network("nat");
    host.network().add_network("nat");

    let network = provisioner(&host).find_network("nat").await.unwrap();
    assert_eq!(network.id, first.id);
}

#[tokio::test]
async fn test_no_networks_registered() {
    let host = SimulatedHost::new("/layers");

    let err = provisioner(&host).find_network("nat").await.unwrap_err();
    assert!(matches!(err, Error::NetworkNotFound(_)));
    assert_eq!(err.class(), hcsrun::ErrorClass::Resolution);
}

#[tokio::test]
async fn test_listing_failure_is_not_found() {
    let host = SimulatedHost::new("/layers").with_network("nat");
    host.faults().fail(Op::ListNetworks);

    let err = provisioner(&host).find_network("nat").await.unwrap_err();
    assert!(matches!(err, Error::NetworkNotFound(_)));
    assert!(err.to_string().contains("listing networks failed"));
}

// =============================================================================
// Endpoint Tests
// =============================================================================

#[tokio::test]
async fn test_create_and_delete_endpoint() {
    let host = SimulatedHost::new("/layers").with_network("nat");
    let endpoints = provisioner(&host);
    let network = endpoints.find_network("nat").await.unwrap();

    let endpoint = endpoints.create_endpoint(&network).await.unwrap();
    assert_eq!(endpoint.virtual_network, network.id);
    assert_eq!(host.network().endpoint_ids(), vec![endpoint.id.clone()]);

    let report = endpoints.delete_endpoint(&endpoint.id).await;
    assert!(report.is_clean());
    assert!(host.network().endpoint_ids().is_empty());
}

#[tokio::test]
async fn test_create_endpoint_failure() {
    let host = SimulatedHost::new("/layers").with_network("nat");
    let endpoints = provisioner(&host);
    let network = endpoints.find_network("nat").await.unwrap();
    host.faults().fail(Op::CreateEndpoint);

    let err = endpoints.create_endpoint(&network).await.unwrap_err();
    assert!(matches!(err, Error::EndpointCreateFailed { ref network, .. } if network == "nat"));
    assert!(host.network().endpoint_ids().is_empty());
}

#[tokio::test]
async fn test_delete_twice_is_warning_not_error() {
    let host = SimulatedHost::new("/layers").with_network("nat");
    let endpoints = provisioner(&host);
    let network = endpoints.find_network("nat").await.unwrap();
    let endpoint = endpoints.create_endpoint(&network).await.unwrap();

    assert!(endpoints.delete_endpoint(&endpoint.id).await.is_clean());
    let second = endpoints.delete_endpoint(&endpoint.id).await;

    assert_eq!(second.steps(), vec![TeardownStep::DeleteEndpoint]);
    assert!(second.warnings()[0].to_string().contains(&endpoint.id));
    assert_eq!(host.journal().count(Op::DeleteEndpoint), 2);
}

#[test]
fn test_endpoint_wire_names() {
    let request = hcsrun::EndpointRequest {
        virtual_network: "net-1".to_string(),
        name: None,
    };
    let json = serde_json::to_value(&request).unwrap();
    assert_eq!(json["VirtualNetwork"], "net-1");
}
