//! Integration tests for releasing cluster infrastructure.

mod common;

use common::{fixtures, fixtures::ClusterBuilder, TestControlPlane};
use stratus_control::operation::OperationProgress;
use stratus_control::registry::ClusterRegistry;
use stratus_control::types::ClusterState;
use stratus_control::{ControlError, ErrorKind, OperationKind};

#[tokio::test]
async fn uninstall_then_decommission_removes_cluster() {
    let plane = TestControlPlane::new();
    let cluster = ClusterBuilder::new(ClusterState::Installed)
        .cordoned()
        .with_node("10.3.0.1")
        .with_node("10.3.0.2")
        .create(&plane.registry)
        .await;

    let started = plane
        .manager
        .uninstall_and_decommission(fixtures::decommission_request(&cluster))
        .await
        .unwrap();
    plane.settle().await;

    assert_eq!(plane.provisioner.kube_config_requests().unwrap(), 1);
    let uninstalls = plane.installer.uninstalls().unwrap();
    assert_eq!(uninstalls.len(), 1);
    assert_eq!(uninstalls[0].kube_config_raw, "apiVersion: v1\nkind: Config\n");
    assert_eq!(uninstalls[0].request_id.as_ref(), Some(&started.request_id));

    let decommissions = plane.provisioner.decommissions().unwrap();
    assert_eq!(decommissions.len(), 1);
    assert_eq!(decommissions[0].request_id.as_ref(), Some(&started.request_id));

    assert_eq!(
        plane.history(&cluster.cluster_id),
        vec![
            ClusterState::Installed,
            ClusterState::Uninstalling,
            ClusterState::Provisioned,
        ]
    );
    assert_eq!(plane.registry.cluster_count().unwrap(), 0);
    assert_eq!(plane.registry.node_count().unwrap(), 0);
}

#[tokio::test]
async fn cluster_stays_claimed_between_uninstall_and_decommission() {
    let plane = TestControlPlane::new();
    plane.provisioner.set_polls_until_done(10_000).unwrap();
    let cluster = ClusterBuilder::new(ClusterState::Installed)
        .cordoned()
        .create(&plane.registry)
        .await;

    plane
        .manager
        .uninstall_and_decommission(fixtures::decommission_request(&cluster))
        .await
        .unwrap();
    plane
        .wait_for(|plane| !plane.provisioner.decommissions().unwrap().is_empty())
        .await;

    let in_flight = plane.manager.supervisor().in_flight_by_kind();
    assert_eq!(in_flight.get(&OperationKind::Decommission), Some(&1));
    assert_eq!(in_flight.get(&OperationKind::Uninstall), None);

    let err = plane
        .manager
        .install_cluster(fixtures::existing_cluster_install(&cluster))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ControlError::OperationInFlight { kind: "decommission", .. }
    ));
    assert!(plane.installer.installs().unwrap().is_empty());

    plane
        .manager
        .supervisor()
        .shutdown(std::time::Duration::ZERO)
        .await;
}

#[tokio::test]
async fn failed_uninstall_skips_decommission() {
    let plane = TestControlPlane::new();
    plane.installer.set_outcome(OperationProgress::Failed).unwrap();
    let cluster = ClusterBuilder::new(ClusterState::Installed)
        .cordoned()
        .create(&plane.registry)
        .await;

    plane
        .manager
        .uninstall_and_decommission(fixtures::decommission_request(&cluster))
        .await
        .unwrap();
    plane.settle().await;

    assert!(plane.provisioner.decommissions().unwrap().is_empty());
    let record = plane.registry.get_cluster(&cluster).await.unwrap();
    assert_eq!(record.state, ClusterState::Failure);
}

#[tokio::test]
async fn missing_kubeconfig_stops_before_uninstall() {
    let plane = TestControlPlane::new();
    plane.provisioner.set_kube_config(None).unwrap();
    let cluster = ClusterBuilder::new(ClusterState::Installed)
        .cordoned()
        .create(&plane.registry)
        .await;

    let err = plane
        .manager
        .uninstall_and_decommission(fixtures::decommission_request(&cluster))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(plane.installer.uninstalls().unwrap().is_empty());
    assert_eq!(
        plane.history(&cluster.cluster_id),
        vec![ClusterState::Installed]
    );
}

#[tokio::test]
async fn decommission_alone_removes_cluster_and_nodes() {
    let plane = TestControlPlane::new();
    let cluster = ClusterBuilder::new(ClusterState::Provisioned)
        .with_node("10.3.0.1")
        .create(&plane.registry)
        .await;

    plane
        .manager
        .decommission(fixtures::decommission_request(&cluster))
        .await
        .unwrap();
    plane.settle().await;

    assert!(plane.installer.uninstalls().unwrap().is_empty());
    assert_eq!(plane.registry.cluster_count().unwrap(), 0);
    assert_eq!(plane.registry.node_count().unwrap(), 0);
}

#[tokio::test]
async fn failed_decommission_keeps_cluster_as_failure() {
    let plane = TestControlPlane::new();
    plane
        .provisioner
        .set_decommission_outcome(OperationProgress::Failed)
        .unwrap();
    let cluster = ClusterBuilder::new(ClusterState::Provisioned)
        .with_node("10.3.0.1")
        .create(&plane.registry)
        .await;

    plane
        .manager
        .decommission(fixtures::decommission_request(&cluster))
        .await
        .unwrap();
    plane.settle().await;

    let record = plane.registry.get_cluster(&cluster).await.unwrap();
    assert_eq!(record.state, ClusterState::Failure);
    assert_eq!(plane.registry.node_count().unwrap(), 1);
}

#[tokio::test]
async fn rejected_decommission_changes_nothing() {
    let plane = TestControlPlane::new();
    plane.provisioner.reject_decommissions(true).unwrap();
    let cluster = ClusterBuilder::new(ClusterState::Provisioned)
        .create(&plane.registry)
        .await;

    let err = plane
        .manager
        .decommission(fixtures::decommission_request(&cluster))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert_eq!(
        plane.history(&cluster.cluster_id),
        vec![ClusterState::Provisioned]
    );
    assert!(!plane.manager.supervisor().is_in_flight(&cluster.cluster_id));
}

#[tokio::test]
async fn management_clusters_are_not_decommissioned() {
    let plane = TestControlPlane::new();
    let cluster = ClusterBuilder::new(ClusterState::Provisioned)
        .create(&plane.registry)
        .await;
    let request = stratus_control::requests::DecommissionClusterRequest {
        is_management_cluster: true,
        ..fixtures::decommission_request(&cluster)
    };

    let err = plane.manager.decommission(request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(plane.provisioner.decommissions().unwrap().is_empty());
}
