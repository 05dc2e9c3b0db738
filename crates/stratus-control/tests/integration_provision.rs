//! Integration tests for provisioning and the chained install.

mod common;

use std::time::Duration;

use common::{fixtures, TestControlPlane, DISCOVERED_NODES};
use stratus_control::bus::InfrastructureEvent;
use stratus_control::operation::OperationProgress;
use stratus_control::registry::{ClusterRegistry, NodeRegistry};
use stratus_control::requests::ClusterRef;
use stratus_control::types::{AzureOptions, ClusterState, ClusterStatus, NodeState, Platform};
use stratus_control::{ControlError, ErrorKind, OperationKind};

fn cluster_of(response: &stratus_control::operation::ProvisionResponse) -> ClusterRef {
    ClusterRef::new(
        response.operation.organization_id.clone(),
        response.operation.cluster_id.clone(),
    )
}

#[tokio::test]
async fn provision_chains_install_to_installed() {
    let plane = TestControlPlane::new();

    let started = plane
        .manager
        .provision_and_install(fixtures::provision_request())
        .await
        .unwrap();
    assert_eq!(started.operation.progress, OperationProgress::InProgress);
    let cluster = cluster_of(&started);

    plane.settle().await;

    assert_eq!(
        plane.history(&cluster.cluster_id),
        vec![
            ClusterState::Provisioning,
            ClusterState::Provisioned,
            ClusterState::InstallInProgress,
            ClusterState::Installed,
        ]
    );

    let record = plane.registry.get_cluster(&cluster).await.unwrap();
    assert_eq!(record.hostname, "cluster.stratus.local");
    assert_eq!(record.control_plane_hostname, "api.cluster.stratus.local");
    assert_eq!(record.name, "edge");

    let nodes = plane.registry.list_nodes(&cluster).await.unwrap();
    let ips: Vec<_> = nodes.iter().map(|n| n.ip.as_str()).collect();
    assert_eq!(ips, DISCOVERED_NODES);
    assert!(nodes.iter().all(|n| n.state == NodeState::Installed));
}

#[tokio::test]
async fn completed_workflow_reads_are_stable() {
    let plane = TestControlPlane::new();

    let started = plane
        .manager
        .provision_and_install(fixtures::provision_request())
        .await
        .unwrap();
    plane.settle().await;
    let cluster = cluster_of(&started);

    let first = plane.manager.get_cluster(&cluster).await.unwrap();
    let first_nodes = plane.manager.list_nodes(&cluster).await.unwrap();
    for _ in 0..3 {
        assert_eq!(plane.manager.get_cluster(&cluster).await.unwrap(), first);
        assert_eq!(plane.manager.list_nodes(&cluster).await.unwrap(), first_nodes);
    }

    assert_eq!(first.state, ClusterState::Installed);
    assert_eq!(first_nodes.len(), DISCOVERED_NODES.len());
    assert!(first_nodes.iter().all(|n| n.state == NodeState::Installed));
    assert_eq!(plane.history(&cluster.cluster_id).len(), 4);
}

#[tokio::test]
async fn cluster_stays_claimed_between_provision_and_install() {
    let plane = TestControlPlane::new();
    plane.discovery.set_delay(Duration::from_millis(300)).unwrap();

    let started = plane
        .manager
        .provision_and_install(fixtures::provision_request())
        .await
        .unwrap();
    let cluster = cluster_of(&started);

    // Discovery runs inside the provision completion, before install starts.
    plane
        .wait_for(|plane| !plane.discovery.calls().unwrap().is_empty())
        .await;
    plane
        .registry
        .set_status(&cluster, ClusterStatus::Online)
        .unwrap();
    plane.manager.cordon(&cluster).await.unwrap();

    let err = plane
        .manager
        .uninstall_cluster(fixtures::uninstall_request(&cluster))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);
    assert!(matches!(err, ControlError::OperationInFlight { .. }));
    assert!(plane.manager.supervisor().is_in_flight(&cluster.cluster_id));

    plane.settle().await;

    assert_eq!(
        plane.history(&cluster.cluster_id),
        vec![
            ClusterState::Provisioning,
            ClusterState::Provisioned,
            ClusterState::InstallInProgress,
            ClusterState::Installed,
        ]
    );
    assert!(plane.installer.uninstalls().unwrap().is_empty());
    assert_eq!(plane.installer.installs().unwrap().len(), 1);
    assert!(!plane.manager.supervisor().is_in_flight(&cluster.cluster_id));
    assert!(plane
        .manager
        .supervisor()
        .in_flight_by_kind()
        .get(&OperationKind::Install)
        .is_none());
}

#[tokio::test]
async fn chained_install_reuses_provision_request() {
    let plane = TestControlPlane::new();

    let started = plane
        .manager
        .provision_and_install(fixtures::provision_request())
        .await
        .unwrap();
    plane.settle().await;

    let provisions = plane.provisioner.provisions().unwrap();
    assert_eq!(provisions.len(), 1);
    assert_eq!(
        provisions[0].request_id.as_ref(),
        Some(&started.operation.request_id)
    );
    assert_eq!(
        provisions[0].cluster_id.as_ref(),
        Some(&started.operation.cluster_id)
    );

    let installs = plane.installer.installs().unwrap();
    assert_eq!(installs.len(), 1);
    let install = &installs[0];
    assert_eq!(install.request_id.as_ref(), Some(&started.operation.request_id));
    assert_eq!(install.cluster_id.as_ref(), Some(&started.operation.cluster_id));
    assert_eq!(install.hostname, "cluster.stratus.local");
    assert_eq!(install.target_platform, Platform::BareMetal);
    assert!(install.kube_config_raw.is_some());
    assert!(install.static_ip_addresses.is_some());

    assert_eq!(
        plane.discovery.calls().unwrap(),
        vec![started.operation.request_id.clone()]
    );
}

#[tokio::test]
async fn every_state_change_is_published() {
    let plane = TestControlPlane::new();

    let started = plane
        .manager
        .provision_and_install(fixtures::provision_request())
        .await
        .unwrap();
    plane.settle().await;

    let published: Vec<_> = plane
        .bus
        .events()
        .unwrap()
        .into_iter()
        .filter_map(|event| match event {
            InfrastructureEvent::ClusterUpdated(update)
                if update.cluster_id == started.operation.cluster_id =>
            {
                update.state
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        published,
        plane.history(&started.operation.cluster_id)
    );
}

#[tokio::test]
async fn failed_provision_does_not_install() {
    let plane = TestControlPlane::new();
    plane
        .provisioner
        .set_provision_outcome(OperationProgress::Failed)
        .unwrap();

    let started = plane
        .manager
        .provision_and_install(fixtures::provision_request())
        .await
        .unwrap();
    plane.settle().await;

    assert_eq!(
        plane.history(&started.operation.cluster_id),
        vec![ClusterState::Provisioning, ClusterState::Failure]
    );
    assert!(plane.installer.installs().unwrap().is_empty());
    assert!(plane.discovery.calls().unwrap().is_empty());
}

#[tokio::test]
async fn rejected_provision_records_failure() {
    let plane = TestControlPlane::new();
    plane.provisioner.reject_provisions(true).unwrap();

    let err = plane
        .manager
        .provision_and_install(fixtures::provision_request())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Upstream);

    let clusters = plane
        .registry
        .list_clusters(&fixtures::org())
        .await
        .unwrap();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].state, ClusterState::Failure);
    assert_eq!(plane.manager.supervisor().active(), 0);
}

#[tokio::test]
async fn discovery_failure_after_provision_fails_cluster() {
    let plane = TestControlPlane::new();
    plane.discovery.set_failing(true).unwrap();

    let started = plane
        .manager
        .provision_and_install(fixtures::provision_request())
        .await
        .unwrap();
    plane.settle().await;

    assert_eq!(
        plane.history(&started.operation.cluster_id),
        vec![ClusterState::Provisioning, ClusterState::Failure]
    );
    assert!(plane.installer.installs().unwrap().is_empty());
}

#[tokio::test]
async fn missing_kubeconfig_fails_cluster() {
    let plane = TestControlPlane::new();
    plane.provisioner.set_kube_config(None).unwrap();

    let started = plane
        .manager
        .provision_and_install(fixtures::provision_request())
        .await
        .unwrap();
    plane.settle().await;

    assert_eq!(
        plane.history(&started.operation.cluster_id),
        vec![ClusterState::Provisioning, ClusterState::Failure]
    );
    assert!(plane.discovery.calls().unwrap().is_empty());
}

#[tokio::test]
async fn node_attach_failure_keeps_attached_nodes() {
    let plane = TestControlPlane::new();
    plane.registry.reject_node(DISCOVERED_NODES[1]).unwrap();

    let started = plane
        .manager
        .provision_and_install(fixtures::provision_request())
        .await
        .unwrap();
    plane.settle().await;

    let cluster = cluster_of(&started);
    assert_eq!(
        plane.history(&cluster.cluster_id),
        vec![ClusterState::Provisioning, ClusterState::Failure]
    );
    let nodes = plane.registry.list_nodes(&cluster).await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].ip, DISCOVERED_NODES[0]);
    assert!(plane.installer.installs().unwrap().is_empty());
}

#[tokio::test]
async fn azure_provision_requires_credentials() {
    let plane = TestControlPlane::new();
    let request = stratus_control::requests::ProvisionClusterRequest {
        target_platform: Platform::Azure,
        azure_options: Some(AzureOptions::default()),
        ..fixtures::provision_request()
    };

    let err = plane.manager.provision_and_install(request).await.unwrap_err();
    assert!(matches!(err, ControlError::InvalidArgument(_)));
    assert_eq!(plane.registry.cluster_count().unwrap(), 0);
    assert!(plane.provisioner.provisions().unwrap().is_empty());
}

#[tokio::test]
async fn caller_request_id_is_rejected() {
    let plane = TestControlPlane::new();
    let request = stratus_control::requests::ProvisionClusterRequest {
        request_id: Some(stratus_control::types::RequestId::new("mine")),
        ..fixtures::provision_request()
    };

    let err = plane.manager.provision_and_install(request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(plane.registry.cluster_count().unwrap(), 0);
}
